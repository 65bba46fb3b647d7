use anyhow::{Context, Result};
use capacity_collector::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

use capacity_collector::azure::{AmbientCredential, AmbientSource, BlobLeaseStore, KeyVaultSecretStore};
use capacity_collector::credentials::CredentialResolver;
use capacity_collector::engine::{CollectionEngine, EngineContext, EngineSettings};
use capacity_collector::health::HealthTracker;
use capacity_collector::lock::{DistributedLock, LeaseStore};
use capacity_collector::models::HealthThresholds;
use capacity_collector::resource_client::ArmClient;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    tracing::info!(name = version::NAME, version = version::VERSION, "starting");

    let store = Arc::new(
        store::SqliteStore::connect(
            &app_config.database.path,
            app_config.database.max_pool_size,
        )
        .await?,
    );
    store.init().await?;

    let collector = &app_config.collector;
    let http = azure::http_client(collector.call_timeout())?;
    let ambient = Arc::new(AmbientCredential::new(
        http.clone(),
        app_config.azure.login_endpoint.trim_end_matches('/'),
        AmbientSource::from_env(),
    ));

    let vault_url = url::Url::parse(&app_config.azure.key_vault_url)
        .with_context(|| format!("azure.key_vault_url: {}", app_config.azure.key_vault_url))?;
    let secrets = Arc::new(KeyVaultSecretStore::new(http.clone(), vault_url, ambient.clone()));

    let lease_store: Option<Arc<dyn LeaseStore>> = match app_config.lock.backend_url() {
        Some(account_url) => {
            tracing::info!(account_url, container = %app_config.lock.container, "distributed locking enabled");
            let blob: Arc<dyn LeaseStore> = Arc::new(BlobLeaseStore::new(
                http.clone(),
                account_url,
                &app_config.lock.container,
                &app_config.lock.blob_name,
                ambient.clone(),
            ));
            Some(blob)
        }
        None => {
            tracing::info!("distributed locking disabled");
            None
        }
    };

    let collection = CollectionEngine::new(EngineContext {
        tenants: store.clone(),
        capacities: store.clone(),
        credentials: CredentialResolver::new(secrets, collector.call_timeout()),
        resources: Arc::new(ArmClient::new(&app_config.azure, collector.call_timeout())?),
        lock: DistributedLock::new(lease_store, app_config.lock.lease_duration()),
        health: HealthTracker::new(
            store.clone(),
            HealthThresholds {
                degraded_after: collector.degraded_after,
                critical_after: collector.critical_after,
            },
        ),
        settings: EngineSettings::from_config(collector),
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let collector_handle =
        engine::scheduler::spawn(collection.clone(), collector.interval(), shutdown_rx);

    let app = routes::app(store.clone(), collection.report_handle());
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(_) => {
                        let _ = tokio::signal::ctrl_c().await;
                        return;
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
        } => {
            tracing::info!("Received shutdown signal; waiting for in-flight cycle");
            let _ = shutdown_tx.send(());
            let _ = collector_handle.await;
        }
    }

    Ok(())
}
