// Per-tenant collection task: resolve secret -> authenticate -> list resources ->
// upsert + snapshot each resource -> optional metric pull -> record health.
// Nothing escapes: every error and panic becomes a CollectionError for this tenant only.

use chrono::{SecondsFormat, Utc};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::timeout;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use super::{EngineContext, panic_message};
use crate::error::CollectionError;
use crate::models::{Capacity, CapacityUpsert, CollectionOutcome, Tenant};
use crate::resource_client::AccessToken;

/// Metrics API caps the number of names per request.
const METRICS_PER_REQUEST: usize = 20;

/// Outcome of one tenant's task; `Ok` carries the number of resources collected.
#[derive(Debug, Clone)]
pub struct TenantResult {
    pub tenant_id: Uuid,
    pub tenant_name: String,
    pub outcome: Result<usize, CollectionError>,
}

/// Holds `_permit` until health is recorded, so the concurrency cap covers the whole task.
pub(super) async fn run_tenant_task(
    ctx: Arc<EngineContext>,
    tenant: Tenant,
    _permit: OwnedSemaphorePermit,
) -> TenantResult {
    let span = info_span!("tenant", tenant_id = %tenant.id, tenant_name = %tenant.name);
    async move {
        let outcome = AssertUnwindSafe(collect_tenant(&ctx, &tenant))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(CollectionError::CollectionFailed(format!(
                    "tenant task panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });

        let health_outcome = match &outcome {
            Ok(resources) => {
                info!(resources = *resources, "tenant collection succeeded");
                CollectionOutcome::Success
            }
            Err(e) => {
                warn!(error_kind = e.kind(), error = %e, "tenant collection failed");
                CollectionOutcome::Failure(e.to_string())
            }
        };
        ctx.health.record(&tenant, &health_outcome).await;

        TenantResult {
            tenant_id: tenant.id,
            tenant_name: tenant.name.clone(),
            outcome,
        }
    }
    .instrument(span)
    .await
}

async fn collect_tenant(ctx: &EngineContext, tenant: &Tenant) -> Result<usize, CollectionError> {
    let call_timeout = ctx.settings.call_timeout;

    let secret = ctx.credentials.resolve(tenant).await?;

    let token = match timeout(
        call_timeout,
        ctx.resources
            .authenticate(&tenant.cloud_tenant_id, &tenant.client_id, &secret),
    )
    .await
    {
        Ok(Ok(token)) => token,
        Ok(Err(e)) => return Err(CollectionError::AuthenticationFailed(e.to_string())),
        Err(_) => {
            return Err(CollectionError::AuthenticationFailed(format!(
                "token request timed out after {call_timeout:?}"
            )));
        }
    };
    drop(secret);

    let resources = match timeout(
        call_timeout,
        ctx.resources.list_resources(
            &token,
            &tenant.subscription_id,
            tenant.resource_group.as_deref(),
        ),
    )
    .await
    {
        Ok(Ok(resources)) => resources,
        Ok(Err(e)) => return Err(CollectionError::from_listing(e)),
        Err(_) => {
            return Err(CollectionError::CollectionFailed(format!(
                "resource listing timed out after {call_timeout:?}"
            )));
        }
    };
    debug!(resources = resources.len(), "resources listed");

    for resource in &resources {
        let capacity = ctx
            .capacities
            .upsert_capacity(tenant.id, &CapacityUpsert::from(resource))
            .await?;
        ctx.capacities.append_snapshot(tenant.id, &capacity).await?;
        if ctx.settings.collect_metrics {
            pull_metrics(ctx, &token, tenant, &capacity).await;
        }
    }
    Ok(resources.len())
}

/// Best effort: failures are logged and dropped, never reach tenant health.
async fn pull_metrics(ctx: &EngineContext, token: &AccessToken, tenant: &Tenant, capacity: &Capacity) {
    let call_timeout = ctx.settings.call_timeout;
    let resource_id = capacity.external_id.as_str();

    let Ok(definitions) = timeout(
        call_timeout,
        ctx.resources.get_metric_definitions(token, resource_id),
    )
    .await
    else {
        debug!(resource_id, "metric definitions timed out");
        return;
    };
    let names: Vec<String> = definitions
        .into_iter()
        .map(|d| d.name.value)
        .filter(|n| !n.is_empty())
        .collect();
    if names.is_empty() {
        debug!(resource_id, "no metric definitions");
        return;
    }

    let end = Utc::now();
    let lookback = chrono::Duration::from_std(ctx.settings.interval)
        .unwrap_or_else(|_| chrono::Duration::minutes(15));
    let timespan = format!(
        "{}/{}",
        (end - lookback).to_rfc3339_opts(SecondsFormat::Secs, true),
        end.to_rfc3339_opts(SecondsFormat::Secs, true)
    );

    let mut samples = Vec::new();
    for chunk in names.chunks(METRICS_PER_REQUEST) {
        match timeout(
            call_timeout,
            ctx.resources.get_metrics(
                token,
                resource_id,
                chunk,
                &timespan,
                &ctx.settings.metrics_interval,
            ),
        )
        .await
        {
            Ok(series) => samples.extend(series.into_samples(tenant.id, capacity.id)),
            Err(_) => debug!(resource_id, "metric values timed out"),
        }
    }
    if samples.is_empty() {
        return;
    }
    match ctx.capacities.append_metric_samples(&samples).await {
        Ok(n) => debug!(resource_id, samples = n, "metric samples stored"),
        Err(e) => warn!(
            resource_id,
            error = %e,
            operation = "append_metric_samples",
            "failed to store metric samples"
        ),
    }
}
