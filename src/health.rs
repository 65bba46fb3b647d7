// Tenant health tracker: applies one collection outcome to the persisted health fields.
// Reads the current record first so the counter advances from what is stored, not from the
// copy enumerated at cycle start. Write failures are logged and never propagate.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::{CollectionOutcome, HealthThresholds, Tenant, TenantHealth};
use crate::store::TenantStore;

pub struct HealthTracker {
    tenants: Arc<dyn TenantStore>,
    thresholds: HealthThresholds,
}

impl HealthTracker {
    pub fn new(tenants: Arc<dyn TenantStore>, thresholds: HealthThresholds) -> Self {
        Self {
            tenants,
            thresholds,
        }
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Persist the health that follows `outcome`; returns the computed value even if the
    /// write failed.
    pub async fn record(&self, tenant: &Tenant, outcome: &CollectionOutcome) -> TenantHealth {
        let current = match self.tenants.get_tenant(tenant.id).await {
            Ok(Some(stored)) => stored.health,
            Ok(None) => tenant.health.clone(),
            Err(e) => {
                warn!(
                    tenant_id = %tenant.id,
                    error = %e,
                    operation = "get_tenant",
                    "could not re-read tenant health; using enumerated record"
                );
                tenant.health.clone()
            }
        };
        let next = current.apply(outcome, &self.thresholds, Utc::now());
        match self.tenants.write_health(tenant.id, &next).await {
            Ok(()) => debug!(
                tenant_id = %tenant.id,
                status = %next.status,
                consecutive_failures = next.consecutive_failures,
                "tenant health updated"
            ),
            Err(e) => warn!(
                tenant_id = %tenant.id,
                error = %e,
                operation = "write_health",
                "failed to persist tenant health"
            ),
        }
        next
    }
}
