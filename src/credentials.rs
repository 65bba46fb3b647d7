// Credential resolver: live lookup of a tenant's client secret in the secret store.
// No caching, so a secret rotated externally is picked up on the next cycle.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::error::{CollectionError, SecretError};
use crate::models::Tenant;

/// A client secret value. Debug output is redacted so it cannot reach logs, and the
/// buffer is wiped when the last copy is dropped.
#[derive(Clone)]
pub struct ClientSecret(Zeroizing<String>);

impl ClientSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl ZeroizeOnDrop for ClientSecret {}

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClientSecret(<redacted>)")
    }
}

/// Secret store seam: `get(reference) -> secret value`.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, reference: &str) -> Result<ClientSecret, SecretError>;
}

pub struct CredentialResolver {
    store: Arc<dyn SecretStore>,
    timeout: Duration,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn SecretStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Fetch the tenant's client secret. Every failure (missing, denied, unreachable,
    /// timed out) is `SecretUnavailable`.
    pub async fn resolve(&self, tenant: &Tenant) -> Result<ClientSecret, CollectionError> {
        match tokio::time::timeout(
            self.timeout,
            self.store.get_secret(&tenant.client_secret_ref),
        )
        .await
        {
            Ok(Ok(secret)) => Ok(secret),
            Ok(Err(e)) => Err(CollectionError::SecretUnavailable(e.to_string())),
            Err(_) => Err(CollectionError::SecretUnavailable(format!(
                "secret {} lookup timed out after {:?}",
                tenant.client_secret_ref, self.timeout
            ))),
        }
    }
}
