// Collection engine: one cycle = acquire lease, enumerate active tenants, fan out per-tenant
// tasks under a semaphore, join them all, release the lease, report.
// The lease is released on every exit path, including enumeration errors and panics.

pub mod scheduler;
mod task;

pub use task::TenantResult;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, instrument};

use crate::config::CollectorConfig;
use crate::credentials::CredentialResolver;
use crate::error::{CollectionError, EngineError};
use crate::health::HealthTracker;
use crate::lock::{DistributedLock, LockAcquisition};
use crate::models::{CollectionOutcome, Tenant};
use crate::resource_client::ResourceApi;
use crate::store::{CapacityStore, TenantStore};

/// Knobs the engine reads each cycle.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_concurrency: usize,
    pub call_timeout: Duration,
    pub collect_metrics: bool,
    /// ISO-8601 granularity for metric pulls.
    pub metrics_interval: String,
    /// Cycle period; also the look-back window for metric pulls.
    pub interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            call_timeout: Duration::from_secs(30),
            collect_metrics: false,
            metrics_interval: "PT5M".to_string(),
            interval: Duration::from_secs(15 * 60),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &CollectorConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency.max(1),
            call_timeout: config.call_timeout(),
            collect_metrics: config.collect_metrics,
            metrics_interval: config.metrics_interval.clone(),
            interval: config.interval(),
        }
    }
}

/// Everything a cycle needs, built once at startup.
pub struct EngineContext {
    pub tenants: Arc<dyn TenantStore>,
    pub capacities: Arc<dyn CapacityStore>,
    pub credentials: CredentialResolver,
    pub resources: Arc<dyn ResourceApi>,
    pub lock: DistributedLock,
    pub health: HealthTracker,
    pub settings: EngineSettings,
}

/// Summary of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// True when the lease was not obtained and nothing ran.
    pub skipped: bool,
    pub tenants: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures_by_kind: BTreeMap<String, usize>,
}

impl CycleReport {
    fn skipped(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: Utc::now(),
            skipped: true,
            tenants: 0,
            succeeded: 0,
            failed: 0,
            failures_by_kind: BTreeMap::new(),
        }
    }

    fn from_results(
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        results: &[TenantResult],
    ) -> Self {
        let mut failures_by_kind = BTreeMap::new();
        let mut succeeded = 0;
        for result in results {
            match &result.outcome {
                Ok(_) => succeeded += 1,
                Err(e) => *failures_by_kind.entry(e.kind().to_string()).or_insert(0) += 1,
            }
        }
        Self {
            started_at,
            finished_at,
            skipped: false,
            tenants: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            failures_by_kind,
        }
    }
}

/// Shared handle to the most recent cycle report.
pub type ReportHandle = Arc<RwLock<Option<CycleReport>>>;

#[derive(Clone)]
pub struct CollectionEngine {
    ctx: Arc<EngineContext>,
    last_report: ReportHandle,
}

impl CollectionEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            last_report: Arc::new(RwLock::new(None)),
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn report_handle(&self) -> ReportHandle {
        self.last_report.clone()
    }

    pub async fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().await.clone()
    }

    /// Run one full cycle. Per-tenant failures are folded into the report; only tenant
    /// enumeration failure or a panicking cycle body is returned as an error.
    #[instrument(skip(self), fields(operation = "run_cycle"))]
    pub async fn run_cycle(&self) -> Result<CycleReport, EngineError> {
        let started_at = Utc::now();
        let lease = match self.ctx.lock.acquire().await {
            LockAcquisition::Disabled => None,
            LockAcquisition::Acquired(token) => Some(token),
            LockAcquisition::NotAcquired => {
                info!("collection cycle skipped: lease not obtained");
                let report = CycleReport::skipped(started_at);
                *self.last_report.write().await = Some(report.clone());
                return Ok(report);
            }
        };

        let outcome = AssertUnwindSafe(collect_all(&self.ctx))
            .catch_unwind()
            .await;

        if let Some(token) = lease {
            self.ctx.lock.release(token).await;
        }

        let results = match outcome {
            Ok(Ok(results)) => results,
            Ok(Err(e)) => {
                error!(error = %e, "collection cycle aborted");
                return Err(e);
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(error = %message, "collection cycle panicked");
                return Err(EngineError::Panicked(message));
            }
        };

        let report = CycleReport::from_results(started_at, Utc::now(), &results);
        info!(
            tenants = report.tenants,
            succeeded = report.succeeded,
            failed = report.failed,
            failures_by_kind = ?report.failures_by_kind,
            "collection cycle complete"
        );
        *self.last_report.write().await = Some(report.clone());
        Ok(report)
    }
}

async fn collect_all(ctx: &Arc<EngineContext>) -> Result<Vec<TenantResult>, EngineError> {
    let tenants = ctx
        .tenants
        .list_active_tenants()
        .await
        .map_err(EngineError::TenantEnumeration)?;
    info!(tenants = tenants.len(), "starting collection for active tenants");

    let semaphore = Arc::new(Semaphore::new(ctx.settings.max_concurrency.max(1)));
    let mut set = JoinSet::new();
    let mut spawned: HashMap<tokio::task::Id, Tenant> = HashMap::new();
    for tenant in tenants {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            // Only closed semaphores fail; this one is never closed.
            break;
        };
        let handle = set.spawn(task::run_tenant_task(ctx.clone(), tenant.clone(), permit));
        spawned.insert(handle.id(), tenant);
    }

    let mut results = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => {
                let tenant = spawned.remove(&e.id());
                let result = unjoined_result(tenant.as_ref(), &e);
                error!(tenant_id = %result.tenant_id, error = %e, "tenant task did not complete");
                if let (Some(tenant), Err(failure)) = (&tenant, &result.outcome) {
                    ctx.health
                        .record(tenant, &CollectionOutcome::Failure(failure.to_string()))
                        .await;
                }
                results.push(result);
            }
        }
    }
    Ok(results)
}

/// A task that never reported back still counts as a failed tenant.
fn unjoined_result(tenant: Option<&Tenant>, e: &JoinError) -> TenantResult {
    TenantResult {
        tenant_id: tenant.map(|t| t.id).unwrap_or_default(),
        tenant_name: tenant.map(|t| t.name.clone()).unwrap_or_default(),
        outcome: Err(CollectionError::CollectionFailed(format!(
            "tenant task did not complete: {e}"
        ))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
