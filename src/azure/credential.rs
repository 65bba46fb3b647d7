// Ambient credential for the collector's own identity (key vault, blob storage).
// Client credentials from AZURE_TENANT_ID / AZURE_CLIENT_ID / AZURE_CLIENT_SECRET when all
// are set; otherwise the managed-identity endpoint. Tokens are cached per scope.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::Client;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::credentials::ClientSecret;
use crate::error::ResourceApiError;
use crate::resource_client::{AccessToken, client_credentials_token};
use crate::resource_client::token::TokenResponse;

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

/// Refresh cached tokens this long before they expire.
fn refresh_margin() -> ChronoDuration {
    ChronoDuration::minutes(5)
}

/// Source of bearer tokens for a given scope.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self, scope: &str) -> Result<AccessToken, ResourceApiError>;
}

#[derive(Debug, Clone)]
pub enum AmbientSource {
    ClientSecret {
        tenant_id: String,
        client_id: String,
        secret: ClientSecret,
    },
    /// App Service style endpoint (IDENTITY_ENDPOINT + IDENTITY_HEADER).
    AppService { endpoint: String, header: String },
    /// Instance metadata service.
    Imds,
}

impl AmbientSource {
    pub fn from_env() -> Self {
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.is_empty());
        if let (Some(tenant_id), Some(client_id), Some(secret)) = (
            var("AZURE_TENANT_ID"),
            var("AZURE_CLIENT_ID"),
            var("AZURE_CLIENT_SECRET"),
        ) {
            return AmbientSource::ClientSecret {
                tenant_id,
                client_id,
                secret: ClientSecret::new(secret),
            };
        }
        if let (Some(endpoint), Some(header)) = (var("IDENTITY_ENDPOINT"), var("IDENTITY_HEADER"))
        {
            return AmbientSource::AppService { endpoint, header };
        }
        AmbientSource::Imds
    }

    fn describe(&self) -> &'static str {
        match self {
            AmbientSource::ClientSecret { .. } => "client_secret",
            AmbientSource::AppService { .. } => "app_service_identity",
            AmbientSource::Imds => "imds",
        }
    }
}

pub struct AmbientCredential {
    client: Client,
    login_endpoint: String,
    source: AmbientSource,
    cache: Mutex<HashMap<String, AccessToken>>,
}

impl AmbientCredential {
    pub fn new(client: Client, login_endpoint: impl Into<String>, source: AmbientSource) -> Self {
        tracing::info!(source = source.describe(), "ambient credential configured");
        Self {
            client,
            login_endpoint: login_endpoint.into(),
            source,
            cache: Mutex::new(HashMap::new()),
        }
    }

    async fn fetch(&self, scope: &str) -> Result<AccessToken, ResourceApiError> {
        match &self.source {
            AmbientSource::ClientSecret {
                tenant_id,
                client_id,
                secret,
            } => {
                client_credentials_token(
                    &self.client,
                    &self.login_endpoint,
                    tenant_id,
                    client_id,
                    secret,
                    scope,
                )
                .await
            }
            AmbientSource::AppService { endpoint, header } => {
                let request = self
                    .client
                    .get(endpoint)
                    .query(&[
                        ("resource", resource_for(scope)),
                        ("api-version", APP_SERVICE_API_VERSION),
                    ])
                    .header("X-IDENTITY-HEADER", header);
                managed_identity_token(request).await
            }
            AmbientSource::Imds => {
                let request = self
                    .client
                    .get(IMDS_ENDPOINT)
                    .query(&[
                        ("resource", resource_for(scope)),
                        ("api-version", IMDS_API_VERSION),
                    ])
                    .header("Metadata", "true");
                managed_identity_token(request).await
            }
        }
    }
}

#[async_trait]
impl TokenSource for AmbientCredential {
    async fn token(&self, scope: &str) -> Result<AccessToken, ResourceApiError> {
        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.get(scope)
            && token.is_fresh(refresh_margin())
        {
            return Ok(token.clone());
        }
        let token = self.fetch(scope).await?;
        cache.insert(scope.to_string(), token.clone());
        Ok(token)
    }
}

/// Managed-identity endpoints take a resource, not a `/.default` scope.
fn resource_for(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

async fn managed_identity_token(
    request: reqwest::RequestBuilder,
) -> Result<AccessToken, ResourceApiError> {
    let response = request
        .send()
        .await
        .map_err(|e| ResourceApiError::Authentication(format!("managed identity: {e}")))?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ResourceApiError::Authentication(format!(
            "managed identity endpoint returned HTTP {}",
            status.as_u16()
        )));
    }
    let parsed: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| ResourceApiError::Decode(format!("managed identity token: {e}")))?;
    Ok(parsed.into_token(Utc::now()))
}
