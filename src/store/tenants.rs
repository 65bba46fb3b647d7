// Tenant rows: provisioning helpers and the engine-facing TenantStore impl.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::instrument;
use uuid::Uuid;

use super::{SqliteStore, TenantStore, from_ms, parse_id, to_ms};
use crate::error::StoreError;
use crate::models::{HealthStatus, NewTenant, Tenant, TenantHealth};

const TENANT_COLUMNS: &str = "id, name, cloud_tenant_id, client_id, client_secret_ref, subscription_id, resource_group, is_active, health_status, last_successful_collection, last_collection_error, consecutive_failures, created_at";

fn tenant_from_row(row: &SqliteRow) -> Result<Tenant, StoreError> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("health_status")?;
    let last_ok: Option<i64> = row.try_get("last_successful_collection")?;
    let failures: i64 = row.try_get("consecutive_failures")?;
    let created_at: i64 = row.try_get("created_at")?;
    Ok(Tenant {
        id: parse_id(&id)?,
        name: row.try_get("name")?,
        cloud_tenant_id: row.try_get("cloud_tenant_id")?,
        client_id: row.try_get("client_id")?,
        client_secret_ref: row.try_get("client_secret_ref")?,
        subscription_id: row.try_get("subscription_id")?,
        resource_group: row.try_get("resource_group")?,
        is_active: row.try_get("is_active")?,
        health: TenantHealth {
            status: status.parse::<HealthStatus>().map_err(StoreError::Invalid)?,
            last_successful_collection: last_ok.map(from_ms).transpose()?,
            last_collection_error: row.try_get("last_collection_error")?,
            consecutive_failures: u32::try_from(failures).map_err(|_| {
                StoreError::Invalid(format!("consecutive_failures out of range: {failures}"))
            })?,
        },
        created_at: from_ms(created_at)?,
    })
}

impl SqliteStore {
    /// Provision an active, healthy tenant. The secret reference is derived, never supplied.
    #[instrument(skip(self, new), fields(repo = "tenants", operation = "create_tenant"))]
    pub async fn create_tenant(&self, new: &NewTenant) -> Result<Tenant, StoreError> {
        let id = Uuid::new_v4();
        let now = to_ms(Utc::now());
        sqlx::query(
            "INSERT INTO tenants (id, name, cloud_tenant_id, client_id, client_secret_ref, subscription_id, resource_group, is_active, health_status, consecutive_failures, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, 1, 'healthy', 0, $8, $8)",
        )
        .bind(id.to_string())
        .bind(&new.name)
        .bind(&new.cloud_tenant_id)
        .bind(&new.client_id)
        .bind(new.secret_reference())
        .bind(&new.subscription_id)
        .bind(&new.resource_group)
        .bind(now)
        .execute(&self.pool)
        .await?;
        self.get_tenant(id).await?.ok_or(StoreError::NotFound {
            entity: "tenant",
            key: id.to_string(),
        })
    }

    /// All tenants (or only active ones), newest first.
    pub async fn list_tenants(&self, active_only: bool) -> Result<Vec<Tenant>, StoreError> {
        let sql = if active_only {
            format!(
                "SELECT {TENANT_COLUMNS} FROM tenants WHERE is_active = 1 ORDER BY created_at DESC"
            )
        } else {
            format!("SELECT {TENANT_COLUMNS} FROM tenants ORDER BY created_at DESC")
        };
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(tenant_from_row).collect()
    }

    /// Flip `is_active` off; the tenant drops out of future cycles. Returns None if unknown.
    #[instrument(skip(self), fields(repo = "tenants", operation = "deactivate_tenant"))]
    pub async fn deactivate_tenant(&self, id: Uuid) -> Result<Option<Tenant>, StoreError> {
        let res = sqlx::query("UPDATE tenants SET is_active = 0, updated_at = $1 WHERE id = $2")
            .bind(to_ms(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_tenant(id).await
    }

    /// Physically remove a tenant; dependent rows go with it via ON DELETE CASCADE.
    pub async fn delete_tenant(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[async_trait]
impl TenantStore for SqliteStore {
    #[instrument(skip(self), fields(repo = "tenants", operation = "list_active_tenants"))]
    async fn list_active_tenants(&self) -> Result<Vec<Tenant>, StoreError> {
        self.list_tenants(true).await
    }

    async fn get_tenant(&self, id: Uuid) -> Result<Option<Tenant>, StoreError> {
        let row = sqlx::query(&format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = $1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(tenant_from_row).transpose()
    }

    #[instrument(skip(self, health), fields(repo = "tenants", operation = "write_health", status = %health.status))]
    async fn write_health(&self, id: Uuid, health: &TenantHealth) -> Result<(), StoreError> {
        let res = sqlx::query(
            "UPDATE tenants SET health_status = $1, last_successful_collection = $2, last_collection_error = $3, consecutive_failures = $4, updated_at = $5 WHERE id = $6",
        )
        .bind(health.status.as_str())
        .bind(health.last_successful_collection.map(to_ms))
        .bind(&health.last_collection_error)
        .bind(i64::from(health.consecutive_failures))
        .bind(to_ms(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "tenant",
                key: id.to_string(),
            });
        }
        Ok(())
    }
}
