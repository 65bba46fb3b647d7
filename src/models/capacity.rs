// Capacity resources: upstream descriptors, stored rows and snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Substituted for a missing state / SKU when a snapshot is taken.
pub const UNKNOWN: &str = "Unknown";

/// One resource as returned by the management API list call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub sku: Option<ResourceSku>,
    #[serde(default)]
    pub properties: Option<ResourceProperties>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSku {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceProperties {
    #[serde(default)]
    pub state: Option<String>,
}

impl ResourceDescriptor {
    pub fn sku_name(&self) -> Option<&str> {
        self.sku.as_ref().and_then(|s| s.name.as_deref())
    }

    pub fn sku_tier(&self) -> Option<&str> {
        self.sku.as_ref().and_then(|s| s.tier.as_deref())
    }

    pub fn state(&self) -> Option<&str> {
        self.properties.as_ref().and_then(|p| p.state.as_deref())
    }
}

/// Mutable fields written on every discovery of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityUpsert {
    pub external_id: String,
    pub display_name: Option<String>,
    pub sku_name: Option<String>,
    pub sku_tier: Option<String>,
    pub location: Option<String>,
    pub state: Option<String>,
}

impl From<&ResourceDescriptor> for CapacityUpsert {
    fn from(r: &ResourceDescriptor) -> Self {
        Self {
            external_id: r.id.clone(),
            display_name: r.name.clone(),
            sku_name: r.sku_name().map(str::to_string),
            sku_tier: r.sku_tier().map(str::to_string),
            location: r.location.clone(),
            state: r.state().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capacity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Globally unique upstream resource id.
    pub external_id: String,
    pub display_name: Option<String>,
    pub sku_name: Option<String>,
    pub sku_tier: Option<String>,
    pub location: Option<String>,
    pub state: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl Capacity {
    pub fn snapshot_state(&self) -> &str {
        self.state.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn snapshot_sku(&self) -> &str {
        self.sku_name.as_deref().unwrap_or(UNKNOWN)
    }
}

/// Append-only point-in-time record of a capacity's state and SKU.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacitySnapshot {
    pub id: i64,
    pub capacity_id: Uuid,
    pub collected_at: DateTime<Utc>,
    pub state: String,
    pub sku_name: String,
}
