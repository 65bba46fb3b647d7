// Bearer tokens and the client-credentials exchange against the login endpoint.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::fmt;

use crate::credentials::ClientSecret;
use crate::error::{MAX_BODY_PREVIEW_CHARS, ResourceApiError};
use crate::models::truncate_chars;

/// Lifetime assumed when the token endpoint reports none.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 300;

#[derive(Clone)]
pub struct AccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn bearer(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// True while the token stays valid for at least `margin` more.
    pub fn is_fresh(&self, margin: ChronoDuration) -> bool {
        self.expires_at - margin > Utc::now()
    }
}

/// Token endpoint success body. Managed-identity endpoints send numbers as strings.
#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
    #[serde(default)]
    expires_on: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct TokenErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

fn as_i64(v: &serde_json::Value) -> Option<i64> {
    match v {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl TokenResponse {
    pub(crate) fn into_token(self, now: DateTime<Utc>) -> AccessToken {
        let expires_at = self
            .expires_in
            .as_ref()
            .and_then(as_i64)
            .map(|secs| now + ChronoDuration::seconds(secs))
            .or_else(|| {
                self.expires_on
                    .as_ref()
                    .and_then(as_i64)
                    .and_then(|epoch| DateTime::from_timestamp(epoch, 0))
            })
            .unwrap_or(now + ChronoDuration::seconds(DEFAULT_TOKEN_LIFETIME_SECS));
        AccessToken::new(self.access_token, expires_at)
    }
}

/// OAuth2 client-credentials grant for `scope` (e.g. "https://management.azure.com/.default").
/// Error messages carry the endpoint's error code/description, never the secret.
pub async fn client_credentials_token(
    client: &Client,
    login_endpoint: &str,
    tenant_id: &str,
    client_id: &str,
    secret: &ClientSecret,
    scope: &str,
) -> Result<AccessToken, ResourceApiError> {
    let url = format!(
        "{}/{}/oauth2/v2.0/token",
        login_endpoint.trim_end_matches('/'),
        tenant_id
    );
    let response = client
        .post(&url)
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", secret.expose()),
            ("scope", scope),
        ])
        .send()
        .await
        .map_err(|e| ResourceApiError::Authentication(scrub(&e.to_string(), secret)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ResourceApiError::Authentication(scrub(&e.to_string(), secret)))?;
    if !status.is_success() {
        let detail = match serde_json::from_str::<TokenErrorBody>(&body) {
            Ok(TokenErrorBody {
                error: Some(code),
                error_description,
            }) => format!(
                "{code}: {}",
                error_description.as_deref().unwrap_or("no description")
            ),
            _ => format!("HTTP {}: {}", status.as_u16(), body.trim()),
        };
        return Err(ResourceApiError::Authentication(truncate_chars(
            &scrub(&detail, secret),
            MAX_BODY_PREVIEW_CHARS,
        )));
    }
    let parsed: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| ResourceApiError::Authentication(format!("invalid token response: {e}")))?;
    Ok(parsed.into_token(Utc::now()))
}

fn scrub(message: &str, secret: &ClientSecret) -> String {
    if secret.expose().is_empty() {
        message.to_string()
    } else {
        message.replace(secret.expose(), "<redacted>")
    }
}
