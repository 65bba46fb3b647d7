// ArmClient against an in-process fake of the login endpoint and management API

mod common;

use axum::extract::{Form, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use capacity_collector::config::AzureConfig;
use capacity_collector::credentials::ClientSecret;
use capacity_collector::error::{CollectionError, ResourceApiError};
use capacity_collector::resource_client::{AccessToken, ArmClient, ResourceApi};
use common::serve;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

const SUB: &str = "11111111-2222-3333-4444-555555555555";

async fn token_handler(
    Path(tenant): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<serde_json::Value>) {
    if tenant == "bad-dir" || form.get("client_secret").map(String::as_str) != Some("s3cret") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "invalid_client",
                "error_description": "AADSTS7000215: Invalid client secret provided."
            })),
        );
    }
    assert_eq!(form.get("grant_type").map(String::as_str), Some("client_credentials"));
    assert_eq!(
        form.get("scope").map(String::as_str),
        Some("https://management.azure.com/.default")
    );
    (
        StatusCode::OK,
        Json(json!({"token_type": "Bearer", "expires_in": 3599, "access_token": "mgmt-token"})),
    )
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer mgmt-token")
}

async fn list_handler(
    State(base): State<String>,
    Path(sub): Path<String>,
    Query(q): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> (StatusCode, Json<serde_json::Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": {"code": "InvalidAuthenticationToken"}})));
    }
    if sub == "forbidden" {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": {"code": "AuthorizationFailed", "message": "no access"}})),
        );
    }
    if sub == "redirected" {
        return (
            StatusCode::OK,
            Json(json!({
                "value": [{"id": format!("/subscriptions/{sub}/providers/Microsoft.Fabric/capacities/one"), "name": "one"}],
                "nextLink": "http://collector-exfil.invalid/subscriptions/redirected/page2"
            })),
        );
    }
    if sub == "broken" {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "x".repeat(2000)})));
    }
    assert_eq!(q.get("api-version").map(String::as_str), Some("2023-11-01"));
    if q.contains_key("page2") {
        return (
            StatusCode::OK,
            Json(json!({"value": [{
                "id": format!("/subscriptions/{sub}/providers/Microsoft.Fabric/capacities/two"),
                "name": "two",
                "location": "northeurope",
                "sku": {"name": "F4", "tier": "Fabric"}
            }]})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "value": [{
                "id": format!("/subscriptions/{sub}/providers/Microsoft.Fabric/capacities/one"),
                "name": "one",
                "location": "westeurope",
                "sku": {"name": "F2", "tier": "Fabric"},
                "properties": {"state": "Active"}
            }],
            "nextLink": format!("{base}/subscriptions/{sub}/providers/Microsoft.Fabric/capacities?api-version=2023-11-01&page2=1")
        })),
    )
}

async fn rg_list_handler(
    Path((sub, rg)): Path<(String, String)>,
    headers: HeaderMap,
) -> (StatusCode, Json<serde_json::Value>) {
    assert!(authorized(&headers));
    (
        StatusCode::OK,
        Json(json!({"value": [{
            "id": format!("/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.Fabric/capacities/rgcap"),
            "name": "rgcap"
        }]})),
    )
}

async fn metric_definitions_handler() -> Json<serde_json::Value> {
    Json(json!({"value": [
        {"name": {"value": "cu_usage", "localizedValue": "CU usage"}, "unit": "Percent", "primaryAggregationType": "Average"}
    ]}))
}

async fn metrics_handler(Query(q): Query<HashMap<String, String>>) -> (StatusCode, Json<serde_json::Value>) {
    if q.get("interval").map(String::as_str) != Some("PT5M") {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "bad interval"})));
    }
    (
        StatusCode::OK,
        Json(json!({"value": [{
            "name": {"value": "cu_usage"},
            "timeseries": [{"data": [{"timeStamp": "2024-01-01T00:00:00Z", "average": 33.0}]}]
        }]})),
    )
}

async fn fake_cloud() -> ArmClient {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let metrics_base = "/subscriptions/{sub}/providers/Microsoft.Fabric/capacities/{cap}/providers/Microsoft.Insights";
    let router = Router::new()
        .route("/{tenant}/oauth2/v2.0/token", post(token_handler))
        .route(
            "/subscriptions/{sub}/providers/Microsoft.Fabric/capacities",
            get(list_handler),
        )
        .route(
            "/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.Fabric/capacities",
            get(rg_list_handler),
        )
        .route(
            &format!("{metrics_base}/metricDefinitions"),
            get(metric_definitions_handler),
        )
        .route(&format!("{metrics_base}/metrics"), get(metrics_handler))
        .with_state(base.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    client_for(&base)
}

fn client_for(base: &str) -> ArmClient {
    let config = AzureConfig {
        key_vault_url: "https://vault.invalid".into(),
        login_endpoint: base.to_string(),
        management_endpoint: base.to_string(),
        api_version: "2023-11-01".into(),
        metrics_api_version: "2023-10-01".into(),
        resource_provider: "Microsoft.Fabric/capacities".into(),
    };
    ArmClient::new(&config, Duration::from_secs(5)).unwrap()
}

async fn token(client: &ArmClient) -> AccessToken {
    client
        .authenticate("good-dir", "client", &ClientSecret::new("s3cret"))
        .await
        .unwrap()
}

#[tokio::test]
async fn authenticate_returns_bearer_token() {
    let client = fake_cloud().await;
    let token = token(&client).await;
    assert_eq!(token.bearer(), "mgmt-token");
    assert!(token.expires_at() > chrono::Utc::now() + chrono::Duration::minutes(50));
}

#[tokio::test]
async fn authentication_failure_carries_code_but_not_secret() {
    let client = fake_cloud().await;
    let err = client
        .authenticate("good-dir", "client", &ClientSecret::new("wrong-value"))
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(matches!(err, ResourceApiError::Authentication(_)));
    assert!(message.contains("invalid_client"));
    assert!(!message.contains("wrong-value"));
}

#[tokio::test]
async fn listing_follows_next_link() {
    let client = fake_cloud().await;
    let token = token(&client).await;
    let resources = client.list_resources(&token, SUB, None).await.unwrap();
    assert_eq!(resources.len(), 2);
    assert_eq!(resources[0].name.as_deref(), Some("one"));
    assert_eq!(resources[0].state(), Some("Active"));
    assert_eq!(resources[1].sku_name(), Some("F4"));
    assert_eq!(resources[1].state(), None);
}

#[tokio::test]
async fn listing_uses_resource_group_scope() {
    let client = fake_cloud().await;
    let token = token(&client).await;
    let resources = client
        .list_resources(&token, SUB, Some("analytics-rg"))
        .await
        .unwrap();
    assert_eq!(resources.len(), 1);
    assert!(resources[0].id.contains("/resourceGroups/analytics-rg/"));
}

#[tokio::test]
async fn listing_status_errors_are_distinguishable() {
    let client = fake_cloud().await;
    let token = token(&client).await;

    let err = client.list_resources(&token, "forbidden", None).await.unwrap_err();
    assert!(matches!(err, ResourceApiError::Status { status: 403, .. }));
    assert_eq!(
        CollectionError::from_listing(err).kind(),
        "authorization_failed"
    );

    let err = client.list_resources(&token, "broken", None).await.unwrap_err();
    match &err {
        ResourceApiError::Status { status, body } => {
            assert_eq!(*status, 500);
            assert!(body.chars().count() <= 500);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(CollectionError::from_listing(err).kind(), "api_error");
}

#[tokio::test]
async fn listing_refuses_next_link_to_another_host() {
    let client = fake_cloud().await;
    let token = token(&client).await;
    let err = client
        .list_resources(&token, "redirected", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ResourceApiError::Decode(_)));
    assert!(err.to_string().contains("collector-exfil.invalid"));
    assert_eq!(CollectionError::from_listing(err).kind(), "collection_failed");
}

#[tokio::test]
async fn metrics_are_best_effort() {
    let client = fake_cloud().await;
    let token = token(&client).await;
    let resource_id = format!("/subscriptions/{SUB}/providers/Microsoft.Fabric/capacities/one");

    let definitions = client.get_metric_definitions(&token, &resource_id).await;
    assert_eq!(definitions.len(), 1);
    assert_eq!(definitions[0].name.value, "cu_usage");

    let names = vec!["cu_usage".to_string()];
    let series = client
        .get_metrics(&token, &resource_id, &names, "2024-01-01T00:00:00Z/2024-01-01T00:15:00Z", "PT5M")
        .await;
    assert_eq!(series.value.len(), 1);

    // Rejected request degrades to an empty series.
    let series = client
        .get_metrics(&token, &resource_id, &names, "2024-01-01T00:00:00Z/2024-01-01T00:15:00Z", "PT1M")
        .await;
    assert!(series.is_empty());
}

#[tokio::test]
async fn missing_endpoints_degrade_metrics_and_fail_listing() {
    let base = serve(Router::new()).await;
    let client = client_for(&base);
    let token = AccessToken::new("t", chrono::Utc::now() + chrono::Duration::hours(1));
    assert!(client.get_metric_definitions(&token, "/x").await.is_empty());
    let err = client.list_resources(&token, SUB, None).await.unwrap_err();
    assert!(matches!(err, ResourceApiError::Status { status: 404, .. }));
}
