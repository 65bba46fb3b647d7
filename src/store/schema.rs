// Schema: created idempotently at startup. Deleting a tenant cascades to its capacities,
// snapshots and metric samples; the engine itself never deletes rows.

use sqlx::SqlitePool;

const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_version (key TEXT PRIMARY KEY, value INTEGER NOT NULL)",
    r#"
    CREATE TABLE IF NOT EXISTS tenants (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        cloud_tenant_id TEXT NOT NULL,
        client_id TEXT NOT NULL,
        client_secret_ref TEXT NOT NULL,
        subscription_id TEXT NOT NULL,
        resource_group TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        health_status TEXT NOT NULL DEFAULT 'healthy'
            CHECK (health_status IN ('healthy', 'degraded', 'critical')),
        last_successful_collection INTEGER,
        last_collection_error TEXT,
        consecutive_failures INTEGER NOT NULL DEFAULT 0 CHECK (consecutive_failures >= 0),
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tenants_active ON tenants(is_active)",
    // external_id is globally unique, which also makes (tenant_id, external_id) unique.
    r#"
    CREATE TABLE IF NOT EXISTS capacities (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
        external_id TEXT NOT NULL UNIQUE,
        display_name TEXT,
        sku_name TEXT,
        sku_tier TEXT,
        location TEXT,
        state TEXT,
        last_synced_at INTEGER,
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_capacities_tenant_name ON capacities(tenant_id, display_name)",
    r#"
    CREATE TABLE IF NOT EXISTS capacity_snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        capacity_id TEXT NOT NULL REFERENCES capacities(id) ON DELETE CASCADE,
        collected_at INTEGER NOT NULL,
        state TEXT NOT NULL,
        sku_name TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_snapshot_capacity_time ON capacity_snapshots(capacity_id, collected_at)",
    r#"
    CREATE TABLE IF NOT EXISTS capacity_metrics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
        capacity_id TEXT NOT NULL REFERENCES capacities(id) ON DELETE CASCADE,
        collected_at INTEGER NOT NULL,
        metric_name TEXT NOT NULL,
        metric_value REAL NOT NULL,
        aggregation_type TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_metric_tenant_time ON capacity_metrics(tenant_id, collected_at)",
    "CREATE INDEX IF NOT EXISTS idx_metric_capacity_name_time ON capacity_metrics(capacity_id, metric_name, collected_at)",
];

pub(super) async fn init(pool: &SqlitePool) -> anyhow::Result<()> {
    for stmt in STATEMENTS {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}
