// Key vault secret store: GET {vault}/secrets/{name}?api-version=7.4 with the ambient identity.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;

use super::TokenSource;
use crate::credentials::{ClientSecret, SecretStore};
use crate::error::SecretError;

pub const KEY_VAULT_SCOPE: &str = "https://vault.azure.net/.default";
const KEY_VAULT_API_VERSION: &str = "7.4";

#[derive(Deserialize)]
struct SecretBundle {
    value: String,
}

pub struct KeyVaultSecretStore {
    client: Client,
    vault_url: Url,
    credential: Arc<dyn TokenSource>,
    scope: String,
}

impl KeyVaultSecretStore {
    pub fn new(client: Client, vault_url: Url, credential: Arc<dyn TokenSource>) -> Self {
        Self::with_scope(client, vault_url, credential, KEY_VAULT_SCOPE)
    }

    pub fn with_scope(
        client: Client,
        vault_url: Url,
        credential: Arc<dyn TokenSource>,
        scope: &str,
    ) -> Self {
        Self {
            client,
            vault_url,
            credential,
            scope: scope.to_string(),
        }
    }

    fn secret_url(&self, reference: &str) -> Result<Url, SecretError> {
        let mut url = self.vault_url.clone();
        url.path_segments_mut()
            .map_err(|_| SecretError::Unavailable(format!("invalid vault url {}", self.vault_url)))?
            .pop_if_empty()
            .push("secrets")
            .push(reference);
        url.query_pairs_mut()
            .append_pair("api-version", KEY_VAULT_API_VERSION);
        Ok(url)
    }
}

#[async_trait]
impl SecretStore for KeyVaultSecretStore {
    async fn get_secret(&self, reference: &str) -> Result<ClientSecret, SecretError> {
        let token = self
            .credential
            .token(&self.scope)
            .await
            .map_err(|e| SecretError::Unavailable(format!("vault credential: {e}")))?;
        let url = self.secret_url(reference)?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token.bearer())
            .send()
            .await
            .map_err(|e| SecretError::Unavailable(e.to_string()))?;
        let status = response.status();
        match status {
            s if s.is_success() => {
                let bundle: SecretBundle = response
                    .json()
                    .await
                    .map_err(|e| SecretError::Unavailable(format!("invalid secret body: {e}")))?;
                Ok(ClientSecret::new(bundle.value))
            }
            StatusCode::NOT_FOUND => Err(SecretError::NotFound {
                reference: reference.to_string(),
            }),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SecretError::AccessDenied {
                reference: reference.to_string(),
                status: status.as_u16(),
            }),
            other => Err(SecretError::Unavailable(format!(
                "vault returned HTTP {} for {reference}",
                other.as_u16()
            ))),
        }
    }
}
