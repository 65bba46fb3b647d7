// Domain models: tenants, capacities, snapshots, metric samples, health

mod capacity;
mod health;
mod metric;
mod tenant;

pub use capacity::{
    Capacity, CapacitySnapshot, CapacityUpsert, ResourceDescriptor, ResourceProperties,
    ResourceSku, UNKNOWN,
};
pub use health::{
    CollectionOutcome, HealthStatus, HealthThresholds, MAX_ERROR_CHARS, TenantHealth,
    truncate_chars,
};
pub use metric::{
    IngestPayload, LocalizableName, MAX_METRIC_NAME_CHARS, MetricDataPoint, MetricDefinition,
    MetricEntry, MetricSample, MetricSeries, MetricValue, TimeSeries,
};
pub use tenant::{NewTenant, Tenant, TenantHealthSummary};
