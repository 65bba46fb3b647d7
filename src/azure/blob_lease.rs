// Blob lease store: the lock object is one blob in a "locks" container; exclusivity is a
// blob lease (15-60s). Creation of container and blob tolerates "already exists".

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::TokenSource;
use crate::error::{LeaseError, MAX_BODY_PREVIEW_CHARS};
use crate::lock::{LeaseStore, LeaseToken};
use crate::models::truncate_chars;

pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";
/// Blob service version; bearer auth needs 2017-11-09 or later.
const STORAGE_API_VERSION: &str = "2021-08-06";

pub struct BlobLeaseStore {
    client: Client,
    account_url: String,
    container: String,
    blob_name: String,
    credential: Arc<dyn TokenSource>,
}

impl BlobLeaseStore {
    pub fn new(
        client: Client,
        account_url: &str,
        container: &str,
        blob_name: &str,
        credential: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            client,
            account_url: account_url.trim_end_matches('/').to_string(),
            container: container.to_string(),
            blob_name: blob_name.to_string(),
            credential,
        }
    }

    fn container_url(&self) -> String {
        format!("{}/{}", self.account_url, self.container)
    }

    fn blob_url(&self) -> String {
        format!("{}/{}/{}", self.account_url, self.container, self.blob_name)
    }

    async fn put(&self, url: &str) -> Result<RequestBuilder, LeaseError> {
        let token = self
            .credential
            .token(STORAGE_SCOPE)
            .await
            .map_err(|e| LeaseError::Credential(e.to_string()))?;
        Ok(self
            .client
            .put(url)
            .bearer_auth(token.bearer())
            .header("x-ms-version", STORAGE_API_VERSION)
            .header(
                "x-ms-date",
                Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            ))
    }
}

async fn send(request: RequestBuilder) -> Result<reqwest::Response, LeaseError> {
    request
        .send()
        .await
        .map_err(|e| LeaseError::Transport(e.to_string()))
}

async fn status_error(response: reqwest::Response) -> LeaseError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    LeaseError::Status {
        status,
        body: truncate_chars(body.trim(), MAX_BODY_PREVIEW_CHARS),
    }
}

#[async_trait]
impl LeaseStore for BlobLeaseStore {
    async fn ensure_lock_object(&self) -> Result<(), LeaseError> {
        let request = self
            .put(&format!("{}?restype=container", self.container_url()))
            .await?
            .body("");
        let response = send(request).await?;
        match response.status() {
            s if s.is_success() => tracing::info!(container = %self.container, "lock container created"),
            StatusCode::CONFLICT => {}
            _ => return Err(status_error(response).await),
        }

        let request = self
            .put(&self.blob_url())
            .await?
            .header("x-ms-blob-type", "BlockBlob")
            .header(reqwest::header::IF_NONE_MATCH, "*")
            .body("lock");
        let response = send(request).await?;
        match response.status() {
            s if s.is_success() => Ok(()),
            // Exists already (409 while leased, 412 otherwise).
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => Ok(()),
            _ => Err(status_error(response).await),
        }
    }

    async fn acquire(&self, duration: Duration) -> Result<Option<LeaseToken>, LeaseError> {
        let proposed = Uuid::new_v4().to_string();
        let request = self
            .put(&format!("{}?comp=lease", self.blob_url()))
            .await?
            .header("x-ms-lease-action", "acquire")
            .header("x-ms-lease-duration", duration.as_secs().to_string())
            .header("x-ms-proposed-lease-id", proposed.as_str())
            .body("");
        let response = send(request).await?;
        match response.status() {
            s if s.is_success() => {
                let lease_id = response
                    .headers()
                    .get("x-ms-lease-id")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
                    .unwrap_or(proposed);
                Ok(Some(LeaseToken::new(lease_id)))
            }
            StatusCode::CONFLICT => Ok(None),
            _ => Err(status_error(response).await),
        }
    }

    async fn release(&self, token: &LeaseToken) -> Result<(), LeaseError> {
        let request = self
            .put(&format!("{}?comp=lease", self.blob_url()))
            .await?
            .header("x-ms-lease-action", "release")
            .header("x-ms-lease-id", token.as_str())
            .body("");
        let response = send(request).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }
}
