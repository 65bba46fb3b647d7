use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    pub azure: AzureConfig,
    #[serde(default)]
    pub lock: LockConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    /// Upper bound on per-tenant tasks in flight within one cycle.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Bound on every secret-store and management-API call.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// Pull metric definitions/values for each discovered resource (best effort).
    #[serde(default)]
    pub collect_metrics: bool,
    /// ISO-8601 granularity passed to the metrics API.
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval: String,
    #[serde(default = "default_degraded_after")]
    pub degraded_after: u32,
    #[serde(default = "default_critical_after")]
    pub critical_after: u32,
}

/// Upper bound on `interval_minutes` (one day).
const MAX_INTERVAL_MINUTES: u64 = 24 * 60;

fn default_interval_minutes() -> u64 {
    15
}

fn default_max_concurrency() -> usize {
    10
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_metrics_interval() -> String {
    "PT5M".into()
}

fn default_degraded_after() -> u32 {
    3
}

fn default_critical_after() -> u32 {
    5
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            max_concurrency: default_max_concurrency(),
            call_timeout_secs: default_call_timeout_secs(),
            collect_metrics: false,
            metrics_interval: default_metrics_interval(),
            degraded_after: default_degraded_after(),
            critical_after: default_critical_after(),
        }
    }
}

impl CollectorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AzureConfig {
    pub key_vault_url: String,
    #[serde(default = "default_login_endpoint")]
    pub login_endpoint: String,
    #[serde(default = "default_management_endpoint")]
    pub management_endpoint: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_metrics_api_version")]
    pub metrics_api_version: String,
    /// Provider namespace and type listed per subscription / resource group.
    #[serde(default = "default_resource_provider")]
    pub resource_provider: String,
}

fn default_login_endpoint() -> String {
    "https://login.microsoftonline.com".into()
}

fn default_management_endpoint() -> String {
    "https://management.azure.com".into()
}

fn default_api_version() -> String {
    "2023-11-01".into()
}

fn default_metrics_api_version() -> String {
    "2023-10-01".into()
}

fn default_resource_provider() -> String {
    "Microsoft.Fabric/capacities".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Blob service URL (e.g. https://acct.blob.core.windows.net). No URL means no locking.
    #[serde(default)]
    pub account_url: Option<String>,
    #[serde(default = "default_lock_container")]
    pub container: String,
    #[serde(default = "default_lock_blob")]
    pub blob_name: String,
    #[serde(default = "default_lease_duration_secs")]
    pub lease_duration_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_lock_container() -> String {
    "locks".into()
}

fn default_lock_blob() -> String {
    "collector-lock".into()
}

fn default_lease_duration_secs() -> u64 {
    60
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            account_url: None,
            container: default_lock_container(),
            blob_name: default_lock_blob(),
            lease_duration_secs: default_lease_duration_secs(),
        }
    }
}

impl LockConfig {
    /// Locking runs only when enabled and a shared-storage backend is configured.
    pub fn backend_url(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.account_url.as_deref().filter(|u| !u.trim().is_empty())
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_secs)
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            (1..=MAX_INTERVAL_MINUTES).contains(&self.collector.interval_minutes),
            "collector.interval_minutes must be between 1 and {MAX_INTERVAL_MINUTES}, got {}",
            self.collector.interval_minutes
        );
        anyhow::ensure!(
            self.collector.max_concurrency > 0,
            "collector.max_concurrency must be > 0, got {}",
            self.collector.max_concurrency
        );
        anyhow::ensure!(
            self.collector.call_timeout_secs > 0,
            "collector.call_timeout_secs must be > 0, got {}",
            self.collector.call_timeout_secs
        );
        anyhow::ensure!(
            self.collector.degraded_after > 0
                && self.collector.degraded_after < self.collector.critical_after,
            "collector.degraded_after must be > 0 and < collector.critical_after, got {} / {}",
            self.collector.degraded_after,
            self.collector.critical_after
        );
        anyhow::ensure!(
            !self.azure.key_vault_url.is_empty(),
            "azure.key_vault_url must be non-empty"
        );
        anyhow::ensure!(
            (15..=60).contains(&self.lock.lease_duration_secs),
            "lock.lease_duration_secs must be between 15 and 60, got {}",
            self.lock.lease_duration_secs
        );
        Ok(())
    }
}
