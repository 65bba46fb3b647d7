// Cloud adapters for the collector's own identity: ambient credential, key vault secrets,
// blob leases. Per-tenant management API access lives in resource_client.

mod blob_lease;
mod credential;
mod key_vault;

pub use blob_lease::{BlobLeaseStore, STORAGE_SCOPE};
pub use credential::{AmbientCredential, AmbientSource, TokenSource};
pub use key_vault::{KEY_VAULT_SCOPE, KeyVaultSecretStore};

use std::time::Duration;

use crate::version::USER_AGENT;

/// Shared reqwest client for adapters; every request bounded by `timeout`.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
}
