// SQLite persistence for tenants, capacities, snapshots and metric samples.
// Uses sqlx for async + connection pooling. Timestamps are INTEGER ms since epoch, ids are TEXT uuids.
// The engine sees persistence only through the TenantStore / CapacityStore traits.

mod capacities;
mod metrics;
mod schema;
mod tenants;

pub use metrics::MAX_METRIC_ROWS;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    Capacity, CapacitySnapshot, CapacityUpsert, MetricSample, Tenant, TenantHealth,
};

/// Tenant reads and health writes needed by the collection engine.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Tenants with `is_active = true`, in no particular order.
    async fn list_active_tenants(&self) -> Result<Vec<Tenant>, StoreError>;

    async fn get_tenant(&self, id: Uuid) -> Result<Option<Tenant>, StoreError>;

    /// Overwrite the health fields of one tenant.
    async fn write_health(&self, id: Uuid, health: &TenantHealth) -> Result<(), StoreError>;
}

/// Capacity writes needed by the collection engine; all scoped to a tenant.
#[async_trait]
pub trait CapacityStore: Send + Sync {
    /// Insert on first sight, update mutable fields in place afterwards.
    /// Fails with `OwnershipConflict` when the external id belongs to another tenant.
    async fn upsert_capacity(
        &self,
        tenant_id: Uuid,
        upsert: &CapacityUpsert,
    ) -> Result<Capacity, StoreError>;

    /// Append one snapshot of the capacity's current state and SKU.
    async fn append_snapshot(
        &self,
        tenant_id: Uuid,
        capacity: &Capacity,
    ) -> Result<CapacitySnapshot, StoreError>;

    async fn append_metric_samples(&self, samples: &[MetricSample]) -> Result<u64, StoreError>;
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to SQLite at `path`, create parent dir and DB if missing, enable WAL + pragmas.
    pub async fn connect(path: &str, max_pool_size: u32) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    /// Create tables if they don't exist.
    pub async fn init(&self) -> anyhow::Result<()> {
        schema::init(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

pub(crate) fn to_ms(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub(crate) fn from_ms(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Invalid(format!("timestamp out of range: {ms}")))
}

pub(crate) fn parse_id(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Invalid(format!("bad uuid {s}: {e}")))
}
