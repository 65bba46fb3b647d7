// Shared test helpers: temp database, tenant fixtures, fake collaborators

#![allow(dead_code)]

use async_trait::async_trait;
use capacity_collector::credentials::{ClientSecret, CredentialResolver, SecretStore};
use capacity_collector::engine::{CollectionEngine, EngineContext, EngineSettings};
use capacity_collector::error::{LeaseError, ResourceApiError, SecretError, StoreError};
use capacity_collector::health::HealthTracker;
use capacity_collector::lock::{DistributedLock, LeaseStore, LeaseToken};
use capacity_collector::models::*;
use capacity_collector::resource_client::{AccessToken, ResourceApi};
use capacity_collector::store::{SqliteStore, TenantStore};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

pub async fn temp_store() -> (TempDir, Arc<SqliteStore>) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("collector.db");
    let store = SqliteStore::connect(path.to_str().unwrap(), 4).await.unwrap();
    store.init().await.unwrap();
    (dir, Arc::new(store))
}

/// Tenant `i`: directory `dir-{i}`, subscription `sub-{i}`, secret `customer-dir-{i}-secret`.
pub fn new_tenant(i: usize) -> NewTenant {
    NewTenant {
        name: format!("Tenant {i}"),
        cloud_tenant_id: format!("dir-{i}"),
        client_id: format!("client-{i}"),
        subscription_id: format!("sub-{i}"),
        resource_group: None,
    }
}

pub fn resource(id: &str, name: &str, state: Option<&str>, sku: Option<&str>) -> ResourceDescriptor {
    ResourceDescriptor {
        id: id.to_string(),
        name: Some(name.to_string()),
        location: Some("westeurope".to_string()),
        sku: sku.map(|s| ResourceSku {
            name: Some(s.to_string()),
            tier: Some("Fabric".to_string()),
        }),
        properties: state.map(|s| ResourceProperties {
            state: Some(s.to_string()),
        }),
    }
}

/// Secret store backed by a map; unknown references are NotFound, `hanging` ones never answer.
#[derive(Default)]
pub struct MapSecrets {
    secrets: HashMap<String, String>,
    hanging: HashSet<String>,
    pub calls: AtomicUsize,
}

impl MapSecrets {
    /// A secret for every tenant fixture `0..n`.
    pub fn for_tenants(n: usize) -> Self {
        let secrets = (0..n)
            .map(|i| (new_tenant(i).secret_reference(), format!("secret-{i}")))
            .collect();
        Self {
            secrets,
            hanging: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn hanging(mut self, reference: &str) -> Self {
        self.hanging.insert(reference.to_string());
        self
    }

    pub fn without(mut self, reference: &str) -> Self {
        self.secrets.remove(reference);
        self
    }
}

#[async_trait]
impl SecretStore for MapSecrets {
    async fn get_secret(&self, reference: &str) -> Result<ClientSecret, SecretError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hanging.contains(reference) {
            std::future::pending::<()>().await;
        }
        self.secrets
            .get(reference)
            .map(ClientSecret::new)
            .ok_or_else(|| SecretError::NotFound {
                reference: reference.to_string(),
            })
    }
}

#[derive(Clone)]
pub enum Listing {
    Resources(Vec<ResourceDescriptor>),
    Status(u16, String),
    Panic,
    /// Listing that does not answer within any reasonable timeout.
    Hang,
}

/// Management API fake keyed by directory id (auth) and subscription id (listing).
#[derive(Default)]
pub struct FakeResourceApi {
    pub auth_failures: HashSet<String>,
    pub listings: HashMap<String, Listing>,
    pub list_delay: Duration,
    pub metrics: Option<MetricSeries>,
    pub auth_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeResourceApi {
    pub fn total_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst) + self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceApi for FakeResourceApi {
    async fn authenticate(
        &self,
        tenant_id: &str,
        _client_id: &str,
        _client_secret: &ClientSecret,
    ) -> Result<AccessToken, ResourceApiError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        if self.auth_failures.contains(tenant_id) {
            return Err(ResourceApiError::Authentication(
                "invalid_client: AADSTS7000215 invalid client secret".into(),
            ));
        }
        Ok(AccessToken::new(
            format!("token-{tenant_id}"),
            chrono::Utc::now() + chrono::Duration::hours(1),
        ))
    }

    async fn list_resources(
        &self,
        _token: &AccessToken,
        subscription_id: &str,
        _resource_group: Option<&str>,
    ) -> Result<Vec<ResourceDescriptor>, ResourceApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.list_delay.is_zero() {
            tokio::time::sleep(self.list_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match self.listings.get(subscription_id).cloned() {
            None => Ok(Vec::new()),
            Some(Listing::Resources(r)) => Ok(r),
            Some(Listing::Status(status, body)) => Err(ResourceApiError::status(status, &body)),
            Some(Listing::Panic) => panic!("listing exploded"),
            Some(Listing::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn get_metric_definitions(
        &self,
        _token: &AccessToken,
        _resource_id: &str,
    ) -> Vec<MetricDefinition> {
        match &self.metrics {
            Some(series) => series
                .value
                .iter()
                .map(|e| MetricDefinition {
                    name: e.name.clone(),
                    unit: e.unit.clone(),
                    primary_aggregation_type: None,
                })
                .collect(),
            None => Vec::new(),
        }
    }

    async fn get_metrics(
        &self,
        _token: &AccessToken,
        _resource_id: &str,
        _metric_names: &[String],
        _timespan: &str,
        _interval: &str,
    ) -> MetricSeries {
        self.metrics.clone().unwrap_or_default()
    }
}

/// Lease fake: `held` makes acquire report another holder, `fail` makes it error.
#[derive(Default)]
pub struct FakeLease {
    pub held: bool,
    pub fail: bool,
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
}

#[async_trait]
impl LeaseStore for FakeLease {
    async fn ensure_lock_object(&self) -> Result<(), LeaseError> {
        Ok(())
    }

    async fn acquire(&self, _duration: Duration) -> Result<Option<LeaseToken>, LeaseError> {
        if self.fail {
            return Err(LeaseError::Transport("connection refused".into()));
        }
        if self.held {
            return Ok(None);
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Some(LeaseToken::new("lease-1")))
    }

    async fn release(&self, _token: &LeaseToken) -> Result<(), LeaseError> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Wraps the real store, counting health writes; can fail enumeration or writes.
pub struct CountingTenants {
    pub inner: Arc<SqliteStore>,
    pub health_writes: AtomicUsize,
    pub fail_enumeration: bool,
    pub fail_writes: bool,
}

impl CountingTenants {
    pub fn new(inner: Arc<SqliteStore>) -> Self {
        Self {
            inner,
            health_writes: AtomicUsize::new(0),
            fail_enumeration: false,
            fail_writes: false,
        }
    }
}

#[async_trait]
impl TenantStore for CountingTenants {
    async fn list_active_tenants(&self) -> Result<Vec<Tenant>, StoreError> {
        if self.fail_enumeration {
            return Err(StoreError::Invalid("database is locked".into()));
        }
        self.inner.list_active_tenants().await
    }

    async fn get_tenant(&self, id: Uuid) -> Result<Option<Tenant>, StoreError> {
        self.inner.get_tenant(id).await
    }

    async fn write_health(&self, id: Uuid, health: &TenantHealth) -> Result<(), StoreError> {
        self.health_writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(StoreError::Invalid("disk full".into()));
        }
        self.inner.write_health(id, health).await
    }
}

pub fn settings(max_concurrency: usize) -> EngineSettings {
    EngineSettings {
        max_concurrency,
        call_timeout: Duration::from_secs(5),
        ..EngineSettings::default()
    }
}

pub fn engine(
    store: Arc<SqliteStore>,
    tenants: Arc<dyn TenantStore>,
    secrets: Arc<dyn SecretStore>,
    api: Arc<dyn ResourceApi>,
    lease: Option<Arc<dyn LeaseStore>>,
    settings: EngineSettings,
) -> CollectionEngine {
    CollectionEngine::new(EngineContext {
        tenants: tenants.clone(),
        capacities: store,
        credentials: CredentialResolver::new(secrets, settings.call_timeout),
        resources: api,
        lock: DistributedLock::new(lease, Duration::from_secs(60)),
        health: HealthTracker::new(tenants, HealthThresholds::default()),
        settings,
    })
}

/// Serve `router` on an ephemeral local port; returns its base URL.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}
