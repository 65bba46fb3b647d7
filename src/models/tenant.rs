// Tenant (customer) records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TenantHealth;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    /// Directory (cloud tenant) the service principal lives in.
    pub cloud_tenant_id: String,
    pub client_id: String,
    /// Where the client secret is stored; never the secret itself.
    pub client_secret_ref: String,
    pub subscription_id: String,
    pub resource_group: Option<String>,
    pub is_active: bool,
    pub health: TenantHealth,
    pub created_at: DateTime<Utc>,
}

/// Fields required to provision a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTenant {
    pub name: String,
    pub cloud_tenant_id: String,
    pub client_id: String,
    pub subscription_id: String,
    pub resource_group: Option<String>,
}

impl NewTenant {
    /// Secret-store name under which provisioning stores this tenant's client secret.
    pub fn secret_reference(&self) -> String {
        format!("customer-{}-secret", self.cloud_tenant_id)
    }
}

/// Health view exposed on the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantHealthSummary {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    #[serde(flatten)]
    pub health: TenantHealth,
}

impl From<&Tenant> for TenantHealthSummary {
    fn from(t: &Tenant) -> Self {
        Self {
            id: t.id,
            name: t.name.clone(),
            is_active: t.is_active,
            health: t.health.clone(),
        }
    }
}
