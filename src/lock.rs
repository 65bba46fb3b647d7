// Distributed lock: one time-bounded lease on a well-known object in shared storage.
// No backend configured => locking disabled, every instance proceeds.
// Lease held elsewhere (or backend error) => caller skips the cycle.
// Release failures are logged only; a stuck lease expires after its duration.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::LeaseError;

/// Proof of a held lease, handed back on release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseToken(String);

impl LeaseToken {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Create the lock object if missing. Losing a creation race is not an error.
    async fn ensure_lock_object(&self) -> Result<(), LeaseError>;

    /// `Ok(None)` when another holder has the lease.
    async fn acquire(&self, duration: Duration) -> Result<Option<LeaseToken>, LeaseError>;

    async fn release(&self, token: &LeaseToken) -> Result<(), LeaseError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAcquisition {
    /// No backend: proceed without coordination.
    Disabled,
    Acquired(LeaseToken),
    /// Held by another instance or the backend failed: skip this cycle.
    NotAcquired,
}

pub struct DistributedLock {
    store: Option<Arc<dyn LeaseStore>>,
    lease_duration: Duration,
}

impl DistributedLock {
    pub fn new(store: Option<Arc<dyn LeaseStore>>, lease_duration: Duration) -> Self {
        Self {
            store,
            lease_duration,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, Duration::from_secs(60))
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub async fn acquire(&self) -> LockAcquisition {
        let Some(store) = &self.store else {
            tracing::debug!("distributed locking disabled (no shared storage backend)");
            return LockAcquisition::Disabled;
        };
        if let Err(e) = store.ensure_lock_object().await {
            tracing::warn!(error = %e, "could not ensure lock object; attempting lease anyway");
        }
        match store.acquire(self.lease_duration).await {
            Ok(Some(token)) => {
                tracing::info!(lease_id = token.as_str(), "distributed lock acquired");
                LockAcquisition::Acquired(token)
            }
            Ok(None) => {
                tracing::info!("distributed lock held by another instance");
                LockAcquisition::NotAcquired
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to acquire distributed lock");
                LockAcquisition::NotAcquired
            }
        }
    }

    pub async fn release(&self, token: LeaseToken) {
        let Some(store) = &self.store else {
            return;
        };
        match store.release(&token).await {
            Ok(()) => tracing::info!(lease_id = token.as_str(), "distributed lock released"),
            Err(e) => tracing::warn!(
                lease_id = token.as_str(),
                error = %e,
                "failed to release distributed lock; it expires with the lease"
            ),
        }
    }
}
