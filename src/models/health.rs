// Tenant health: three-valued status derived from the consecutive failure count.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longest `last_collection_error` kept on a tenant, in characters.
pub const MAX_ERROR_CHARS: usize = 1000;

/// Tenant collection health; serializes to lowercase JSON (e.g. "degraded").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Critical => "critical",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(HealthStatus::Healthy),
            "degraded" => Ok(HealthStatus::Degraded),
            "critical" => Ok(HealthStatus::Critical),
            other => Err(format!("unknown health status: {other}")),
        }
    }
}

/// Failure counts at which a tenant becomes degraded / critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthThresholds {
    pub degraded_after: u32,
    pub critical_after: u32,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            degraded_after: 3,
            critical_after: 5,
        }
    }
}

impl HealthThresholds {
    pub fn status_for(&self, consecutive_failures: u32) -> HealthStatus {
        if consecutive_failures >= self.critical_after {
            HealthStatus::Critical
        } else if consecutive_failures >= self.degraded_after {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Result of one per-tenant collection, as seen by the health tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionOutcome {
    Success,
    Failure(String),
}

/// Health fields of a tenant record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantHealth {
    pub status: HealthStatus,
    pub last_successful_collection: Option<DateTime<Utc>>,
    pub last_collection_error: Option<String>,
    pub consecutive_failures: u32,
}

impl Default for TenantHealth {
    fn default() -> Self {
        Self {
            status: HealthStatus::Healthy,
            last_successful_collection: None,
            last_collection_error: None,
            consecutive_failures: 0,
        }
    }
}

impl TenantHealth {
    /// Next health state after `outcome`. A success always resets fully; a failure bumps
    /// the counter, re-derives the status and overwrites the error (truncated).
    pub fn apply(
        &self,
        outcome: &CollectionOutcome,
        thresholds: &HealthThresholds,
        now: DateTime<Utc>,
    ) -> TenantHealth {
        match outcome {
            CollectionOutcome::Success => TenantHealth {
                status: HealthStatus::Healthy,
                last_successful_collection: Some(now),
                last_collection_error: None,
                consecutive_failures: 0,
            },
            CollectionOutcome::Failure(message) => {
                let failures = self.consecutive_failures.saturating_add(1);
                TenantHealth {
                    status: thresholds.status_for(failures),
                    last_successful_collection: self.last_successful_collection,
                    last_collection_error: Some(truncate_chars(message, MAX_ERROR_CHARS)),
                    consecutive_failures: failures,
                }
            }
        }
    }
}

/// First `max` characters of `s` (never splits a UTF-8 sequence).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
