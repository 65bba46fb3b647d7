// Capacity rows and their append-only snapshots.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::instrument;
use uuid::Uuid;

use super::{CapacityStore, SqliteStore, from_ms, parse_id, to_ms};
use crate::error::StoreError;
use crate::models::{Capacity, CapacitySnapshot, CapacityUpsert, MetricSample};

const CAPACITY_COLUMNS: &str =
    "id, tenant_id, external_id, display_name, sku_name, sku_tier, location, state, last_synced_at";

fn capacity_from_row(row: &SqliteRow) -> Result<Capacity, StoreError> {
    let id: String = row.try_get("id")?;
    let tenant_id: String = row.try_get("tenant_id")?;
    let synced: Option<i64> = row.try_get("last_synced_at")?;
    Ok(Capacity {
        id: parse_id(&id)?,
        tenant_id: parse_id(&tenant_id)?,
        external_id: row.try_get("external_id")?,
        display_name: row.try_get("display_name")?,
        sku_name: row.try_get("sku_name")?,
        sku_tier: row.try_get("sku_tier")?,
        location: row.try_get("location")?,
        state: row.try_get("state")?,
        last_synced_at: synced.map(from_ms).transpose()?,
    })
}

fn snapshot_from_row(row: &SqliteRow) -> Result<CapacitySnapshot, StoreError> {
    let capacity_id: String = row.try_get("capacity_id")?;
    let collected_at: i64 = row.try_get("collected_at")?;
    Ok(CapacitySnapshot {
        id: row.try_get("id")?,
        capacity_id: parse_id(&capacity_id)?,
        collected_at: from_ms(collected_at)?,
        state: row.try_get("state")?,
        sku_name: row.try_get("sku_name")?,
    })
}

impl SqliteStore {
    /// Capacities of one tenant ordered by display name.
    pub async fn capacities_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<Capacity>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {CAPACITY_COLUMNS} FROM capacities WHERE tenant_id = $1 ORDER BY display_name"
        ))
        .bind(tenant_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(capacity_from_row).collect()
    }

    pub async fn capacity_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Capacity>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CAPACITY_COLUMNS} FROM capacities WHERE external_id = $1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(capacity_from_row).transpose()
    }

    /// Lookup by display name within a tenant. Names are not unique; the earliest-created
    /// match wins and a warning is logged when more than one exists.
    pub async fn capacity_by_name(
        &self,
        tenant_id: Uuid,
        name: &str,
    ) -> Result<Option<Capacity>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {CAPACITY_COLUMNS} FROM capacities WHERE tenant_id = $1 AND display_name = $2 ORDER BY created_at, id"
        ))
        .bind(tenant_id.to_string())
        .bind(name)
        .fetch_all(&self.pool)
        .await?;
        if rows.len() > 1 {
            tracing::warn!(
                tenant_id = %tenant_id,
                capacity_name = name,
                matches = rows.len(),
                "capacity display name is ambiguous; using the earliest-created match"
            );
        }
        rows.first().map(capacity_from_row).transpose()
    }

    /// Snapshots of a capacity, newest first, optionally bounded by [start, end].
    /// A capacity that does not belong to `tenant_id` yields an empty list.
    pub async fn snapshots_for_capacity(
        &self,
        tenant_id: Uuid,
        capacity_id: Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<CapacitySnapshot>, StoreError> {
        let rows = sqlx::query(
            "SELECT s.id, s.capacity_id, s.collected_at, s.state, s.sku_name
             FROM capacity_snapshots s JOIN capacities c ON c.id = s.capacity_id
             WHERE s.capacity_id = $1 AND c.tenant_id = $2
               AND ($3 IS NULL OR s.collected_at >= $3)
               AND ($4 IS NULL OR s.collected_at <= $4)
             ORDER BY s.collected_at DESC, s.id DESC",
        )
        .bind(capacity_id.to_string())
        .bind(tenant_id.to_string())
        .bind(start.map(to_ms))
        .bind(end.map(to_ms))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(snapshot_from_row).collect()
    }
}

#[async_trait]
impl CapacityStore for SqliteStore {
    // Single statement so concurrent upserts of one external id resolve last-writer-wins.
    // The WHERE on DO UPDATE suppresses the update (and the RETURNING row) when another
    // tenant owns the id.
    #[instrument(skip(self, upsert), fields(repo = "capacities", operation = "upsert_capacity", external_id = %upsert.external_id))]
    async fn upsert_capacity(
        &self,
        tenant_id: Uuid,
        upsert: &CapacityUpsert,
    ) -> Result<Capacity, StoreError> {
        let now = to_ms(Utc::now());
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO capacities
            (id, tenant_id, external_id, display_name, sku_name, sku_tier, location, state, last_synced_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            ON CONFLICT(external_id) DO UPDATE SET
                display_name = excluded.display_name,
                sku_name = excluded.sku_name,
                sku_tier = excluded.sku_tier,
                location = excluded.location,
                state = excluded.state,
                last_synced_at = excluded.last_synced_at
            WHERE capacities.tenant_id = excluded.tenant_id
            RETURNING {CAPACITY_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(tenant_id.to_string())
        .bind(&upsert.external_id)
        .bind(&upsert.display_name)
        .bind(&upsert.sku_name)
        .bind(&upsert.sku_tier)
        .bind(&upsert.location)
        .bind(&upsert.state)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => capacity_from_row(&row),
            None => Err(StoreError::OwnershipConflict {
                external_id: upsert.external_id.clone(),
            }),
        }
    }

    #[instrument(skip(self, capacity), fields(repo = "capacities", operation = "append_snapshot", capacity_id = %capacity.id))]
    async fn append_snapshot(
        &self,
        tenant_id: Uuid,
        capacity: &Capacity,
    ) -> Result<CapacitySnapshot, StoreError> {
        let row = sqlx::query(
            "INSERT INTO capacity_snapshots (capacity_id, collected_at, state, sku_name)
             SELECT id, $1, $2, $3 FROM capacities WHERE id = $4 AND tenant_id = $5
             RETURNING id, capacity_id, collected_at, state, sku_name",
        )
        .bind(to_ms(Utc::now()))
        .bind(capacity.snapshot_state())
        .bind(capacity.snapshot_sku())
        .bind(capacity.id.to_string())
        .bind(tenant_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => snapshot_from_row(&row),
            None => Err(StoreError::NotFound {
                entity: "capacity",
                key: capacity.id.to_string(),
            }),
        }
    }

    async fn append_metric_samples(&self, samples: &[MetricSample]) -> Result<u64, StoreError> {
        self.insert_metric_samples(samples).await
    }
}
