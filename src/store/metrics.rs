// Metric samples: engine-pulled series and externally ingested payloads.

use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

use super::{SqliteStore, from_ms, parse_id, to_ms};
use crate::error::StoreError;
use crate::models::{IngestPayload, MetricSample};

/// Cap on rows returned by a single metric read.
pub const MAX_METRIC_ROWS: i64 = 1000;

impl SqliteStore {
    #[instrument(skip(self, samples), fields(repo = "metrics", operation = "insert_metric_samples", samples_count = samples.len()))]
    pub(super) async fn insert_metric_samples(
        &self,
        samples: &[MetricSample],
    ) -> Result<u64, StoreError> {
        if samples.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for s in samples {
            sqlx::query(
                "INSERT INTO capacity_metrics (tenant_id, capacity_id, collected_at, metric_name, metric_value, aggregation_type) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(s.tenant_id.to_string())
            .bind(s.capacity_id.to_string())
            .bind(to_ms(s.collected_at))
            .bind(&s.metric_name)
            .bind(s.value)
            .bind(&s.aggregation)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(samples.len() as u64)
    }

    /// Store an externally pushed payload against the tenant's capacity with that display name.
    #[instrument(skip(self, payload), fields(repo = "metrics", operation = "ingest_metrics", capacity_name = %payload.capacity_name))]
    pub async fn ingest_metrics(
        &self,
        tenant_id: Uuid,
        payload: &IngestPayload,
    ) -> Result<u64, StoreError> {
        payload.validate().map_err(StoreError::Invalid)?;
        let capacity = self
            .capacity_by_name(tenant_id, &payload.capacity_name)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "capacity",
                key: payload.capacity_name.clone(),
            })?;
        let collected_at = payload.collected_at.unwrap_or_else(Utc::now);
        let samples: Vec<MetricSample> = payload
            .metrics
            .iter()
            .map(|m| MetricSample {
                tenant_id,
                capacity_id: capacity.id,
                collected_at,
                metric_name: m.name.clone(),
                value: m.value,
                aggregation: m.aggregation.clone(),
            })
            .collect();
        let stored = self.insert_metric_samples(&samples).await?;
        tracing::info!(
            tenant_id = %tenant_id,
            capacity_id = %capacity.id,
            metrics_stored = stored,
            "ingest complete"
        );
        Ok(stored)
    }

    /// Samples of one capacity (tenant-scoped), newest first, optionally bounded in time and
    /// narrowed to one metric name. At most `MAX_METRIC_ROWS` rows.
    #[instrument(skip(self), fields(repo = "metrics", operation = "metrics_for_capacity"))]
    pub async fn metrics_for_capacity(
        &self,
        tenant_id: Uuid,
        capacity_id: Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        metric_name: Option<&str>,
    ) -> Result<Vec<MetricSample>, StoreError> {
        let rows = sqlx::query(
            "SELECT tenant_id, capacity_id, collected_at, metric_name, metric_value, aggregation_type
             FROM capacity_metrics WHERE tenant_id = $1 AND capacity_id = $2
               AND ($3 IS NULL OR collected_at >= $3)
               AND ($4 IS NULL OR collected_at <= $4)
               AND ($5 IS NULL OR metric_name = $5)
             ORDER BY collected_at DESC, id DESC
             LIMIT $6",
        )
        .bind(tenant_id.to_string())
        .bind(capacity_id.to_string())
        .bind(start.map(to_ms))
        .bind(end.map(to_ms))
        .bind(metric_name)
        .bind(MAX_METRIC_ROWS)
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let tenant: String = row.try_get("tenant_id")?;
            let capacity: String = row.try_get("capacity_id")?;
            let collected_at: i64 = row.try_get("collected_at")?;
            out.push(MetricSample {
                tenant_id: parse_id(&tenant)?,
                capacity_id: parse_id(&capacity)?,
                collected_at: from_ms(collected_at)?,
                metric_name: row.try_get("metric_name")?,
                value: row.try_get("metric_value")?,
                aggregation: row.try_get("aggregation_type")?,
            });
        }
        Ok(out)
    }
}
