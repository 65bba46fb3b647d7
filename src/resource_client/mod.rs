// Management API client: token exchange, resource listing and metric queries.
// Transport only; no persistence or tenant iteration lives here. Listing failures propagate
// as ResourceApiError::Status (status + truncated body); metric calls degrade to empty results.

pub(crate) mod token;

pub use token::{AccessToken, client_credentials_token};

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;

use crate::config::AzureConfig;
use crate::credentials::ClientSecret;
use crate::error::ResourceApiError;
use crate::models::{MetricDefinition, MetricSeries, ResourceDescriptor};
use crate::version::USER_AGENT;

/// Scope requested for management API tokens.
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

/// Upper bound on `nextLink` pages followed for one listing.
const MAX_LIST_PAGES: usize = 50;

#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// Exchange tenant credentials for a management API bearer token.
    async fn authenticate(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &ClientSecret,
    ) -> Result<AccessToken, ResourceApiError>;

    /// Resources at subscription scope, or resource-group scope when `resource_group` is set.
    async fn list_resources(
        &self,
        token: &AccessToken,
        subscription_id: &str,
        resource_group: Option<&str>,
    ) -> Result<Vec<ResourceDescriptor>, ResourceApiError>;

    /// Best effort: empty on any failure.
    async fn get_metric_definitions(
        &self,
        token: &AccessToken,
        resource_id: &str,
    ) -> Vec<MetricDefinition>;

    /// Best effort: empty series on any failure.
    async fn get_metrics(
        &self,
        token: &AccessToken,
        resource_id: &str,
        metric_names: &[String],
        timespan: &str,
        interval: &str,
    ) -> MetricSeries;
}

#[derive(Deserialize)]
struct ListPage<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(default, rename = "nextLink")]
    next_link: Option<String>,
}

pub struct ArmClient {
    client: Client,
    login_endpoint: String,
    management_endpoint: String,
    api_version: String,
    metrics_api_version: String,
    resource_provider: String,
}

impl ArmClient {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(config: &AzureConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            login_endpoint: config.login_endpoint.trim_end_matches('/').to_string(),
            management_endpoint: config.management_endpoint.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            metrics_api_version: config.metrics_api_version.clone(),
            resource_provider: config.resource_provider.trim_matches('/').to_string(),
        })
    }

    pub fn list_url(&self, subscription_id: &str, resource_group: Option<&str>) -> String {
        match resource_group {
            Some(rg) => format!(
                "{}/subscriptions/{}/resourceGroups/{}/providers/{}?api-version={}",
                self.management_endpoint,
                subscription_id,
                rg,
                self.resource_provider,
                self.api_version
            ),
            None => format!(
                "{}/subscriptions/{}/providers/{}?api-version={}",
                self.management_endpoint, subscription_id, self.resource_provider, self.api_version
            ),
        }
    }

    /// Pagination links are followed only when they stay on the management endpoint, so the
    /// bearer token never leaves it.
    fn is_management_link(&self, link: &str) -> bool {
        link.strip_prefix(self.management_endpoint.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }

    fn metric_definitions_url(&self, resource_id: &str) -> String {
        format!(
            "{}{}/providers/Microsoft.Insights/metricDefinitions?api-version={}",
            self.management_endpoint, resource_id, self.metrics_api_version
        )
    }

    fn metrics_url(
        &self,
        resource_id: &str,
        metric_names: &[String],
        timespan: &str,
        interval: &str,
    ) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!(
            "{}{}/providers/Microsoft.Insights/metrics",
            self.management_endpoint, resource_id
        ))?;
        url.query_pairs_mut()
            .append_pair("api-version", &self.metrics_api_version)
            .append_pair("metricnames", &metric_names.join(","))
            .append_pair("timespan", timespan)
            .append_pair("interval", interval);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        token: &AccessToken,
        url: &str,
    ) -> Result<T, ResourceApiError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(token.bearer())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(ResourceApiError::status(
                status.as_u16(),
                &String::from_utf8_lossy(&body),
            ));
        }
        serde_json::from_slice(&body).map_err(|e| ResourceApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ResourceApi for ArmClient {
    async fn authenticate(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &ClientSecret,
    ) -> Result<AccessToken, ResourceApiError> {
        client_credentials_token(
            &self.client,
            &self.login_endpoint,
            tenant_id,
            client_id,
            client_secret,
            MANAGEMENT_SCOPE,
        )
        .await
    }

    async fn list_resources(
        &self,
        token: &AccessToken,
        subscription_id: &str,
        resource_group: Option<&str>,
    ) -> Result<Vec<ResourceDescriptor>, ResourceApiError> {
        let mut url = self.list_url(subscription_id, resource_group);
        let mut out = Vec::new();
        for _ in 0..MAX_LIST_PAGES {
            let page: ListPage<ResourceDescriptor> =
                self.get_json(token, &url).await.inspect_err(|e| {
                    tracing::warn!(url = %url, error = %e, "resource listing failed");
                })?;
            out.extend(page.value);
            match page.next_link {
                Some(next) if next.is_empty() => return Ok(out),
                Some(next) if self.is_management_link(&next) => url = next,
                Some(next) => {
                    let host = Url::parse(&next)
                        .ok()
                        .and_then(|u| u.host_str().map(str::to_string))
                        .unwrap_or_default();
                    tracing::warn!(subscription_id, host = %host, "nextLink leaves the management endpoint");
                    return Err(ResourceApiError::Decode(format!(
                        "nextLink points outside the management endpoint (host {host:?})"
                    )));
                }
                None => return Ok(out),
            }
        }
        tracing::warn!(
            subscription_id,
            pages = MAX_LIST_PAGES,
            "resource listing truncated at page limit"
        );
        Ok(out)
    }

    async fn get_metric_definitions(
        &self,
        token: &AccessToken,
        resource_id: &str,
    ) -> Vec<MetricDefinition> {
        let url = self.metric_definitions_url(resource_id);
        match self.get_json::<ListPage<MetricDefinition>>(token, &url).await {
            Ok(page) => page.value,
            Err(e) => {
                tracing::warn!(resource_id, error = %e, "metric definitions not available");
                Vec::new()
            }
        }
    }

    async fn get_metrics(
        &self,
        token: &AccessToken,
        resource_id: &str,
        metric_names: &[String],
        timespan: &str,
        interval: &str,
    ) -> MetricSeries {
        if metric_names.is_empty() {
            return MetricSeries::default();
        }
        let url = match self.metrics_url(resource_id, metric_names, timespan, interval) {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!(resource_id, error = %e, "invalid metrics url");
                return MetricSeries::default();
            }
        };
        match self.get_json::<MetricSeries>(token, url.as_str()).await {
            Ok(series) => series,
            Err(e) => {
                tracing::warn!(resource_id, error = %e, "metrics not available");
                MetricSeries::default()
            }
        }
    }
}
