//! Integration tests for the StatusGuard HTTP binding
//!
//! Routing and gating tests run without a database. Engine-backed tests need
//! PostgreSQL (DATABASE_URL) and return early without it.
//!
//! Run with: cargo test -p statusguard-api --test api_tests

mod common;

use axum::http::StatusCode;
use chrono::Duration;
use common::{json_body, request, send, token_for, unique_email, TestContext};
use serde_json::json;
use statusguard_api::config::FeatureToggles;
use statusguard_shared::auth::jwt::{create_token, Claims};

const ADMIN_OFF: FeatureToggles = FeatureToggles {
    billing_enabled: true,
    admin_enabled: false,
};

const ADMIN_ON: FeatureToggles = FeatureToggles {
    billing_enabled: true,
    admin_enabled: true,
};

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = common::lazy_app(ADMIN_OFF);

    for (method, uri) in [
        ("GET", "/v1/projects"),
        ("GET", "/v1/groups"),
        ("GET", "/v1/invitations"),
        ("GET", "/v1/subscription"),
        ("POST", "/v1/incidents/00000000-0000-0000-0000-000000000000/resolve"),
    ] {
        let response = send(&app, request(method, uri, None, None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
    }
}

#[tokio::test]
async fn test_invalid_and_expired_tokens_rejected() {
    let app = common::lazy_app(ADMIN_OFF);

    let response = send(&app, request("GET", "/v1/projects", Some("not-a-jwt"), None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let wrong_key = create_token(
        &Claims::new("alice@example.com"),
        "another-secret-that-is-at-least-32-bytes",
    )
    .unwrap();
    let response = send(&app, request("GET", "/v1/projects", Some(&wrong_key), None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let expired = create_token(
        &Claims::with_expiration("alice@example.com", Duration::hours(-1)),
        common::TEST_SECRET,
    )
    .unwrap();
    let response = send(&app, request("GET", "/v1/projects", Some(&expired), None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = json_body(response).await;
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_admin_disabled_returns_503_before_auth() {
    let app = common::lazy_app(ADMIN_OFF);

    for uri in ["/v1/admin/stats", "/v1/admin/users", "/v1/admin/decisions"] {
        let response = send(&app, request("GET", uri, None, None)).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{uri}");
    }

    let body = json_body(send(&app, request("GET", "/v1/admin/stats", None, None)).await).await;
    assert_eq!(body["error"], "service_unavailable");
}

#[tokio::test]
async fn test_admin_enabled_requires_identity() {
    let app = common::lazy_app(ADMIN_ON);

    let response = send(&app, request("GET", "/v1/admin/stats", None, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_feature_config_is_public() {
    let app = common::lazy_app(ADMIN_OFF);

    let response = send(&app, request("GET", "/v1/config", None, None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body, json!({"billing_enabled": true, "admin_enabled": false}));
}

#[tokio::test]
async fn test_quota_denial_over_http() {
    let Some(ctx) = TestContext::with_database().await else { return };
    let alice = token_for(&unique_email("alice"));

    let first = ctx
        .send(request("POST", "/v1/projects", Some(&alice), Some(json!({"name": "P1"}))))
        .await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = ctx
        .send(request("POST", "/v1/projects", Some(&alice), Some(json!({"name": "P2"}))))
        .await;
    assert_eq!(second.status(), StatusCode::FORBIDDEN);

    let body = json_body(second).await;
    assert_eq!(body["reason"], "quota_exceeded");
    assert_eq!(body["limit"], 1);
}

#[tokio::test]
async fn test_private_project_is_404_for_outsider() {
    let Some(ctx) = TestContext::with_database().await else { return };
    let alice = token_for(&unique_email("alice"));
    let mallory = token_for(&unique_email("mallory"));

    let created = ctx
        .send(request("POST", "/v1/projects", Some(&alice), Some(json!({"name": "Private"}))))
        .await;
    let project = json_body(created).await;
    let uri = format!("/v1/projects/{}", project["id"].as_str().unwrap());

    let hidden = ctx.send(request("GET", &uri, Some(&mallory), None)).await;
    assert_eq!(hidden.status(), StatusCode::NOT_FOUND);
    let hidden = json_body(hidden).await;

    let missing = ctx
        .send(request(
            "GET",
            "/v1/projects/00000000-0000-0000-0000-000000000000",
            Some(&mallory),
            None,
        ))
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(missing).await, hidden);

    let owner_view = ctx.send(request("GET", &uri, Some(&alice), None)).await;
    assert_eq!(owner_view.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_invitation_flow_over_http() {
    let Some(ctx) = TestContext::with_database().await else { return };
    let alice = token_for(&unique_email("alice"));
    let bob_email = unique_email("bob");
    let bob = token_for(&bob_email);

    let group = json_body(
        ctx.send(request("POST", "/v1/groups", Some(&alice), Some(json!({"name": "Ops"}))))
            .await,
    )
    .await;
    let group_id = group["id"].as_str().unwrap().to_string();

    let created = ctx
        .send(request(
            "POST",
            "/v1/groups/invitations",
            Some(&alice),
            Some(json!({"group_id": group_id, "email": bob_email.to_uppercase(), "role": "member"})),
        ))
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let invitation = json_body(created).await;

    let inbox = json_body(ctx.send(request("GET", "/v1/invitations", Some(&bob), None)).await).await;
    assert_eq!(inbox["invitations"].as_array().unwrap().len(), 1);

    let uri = format!("/v1/invitations/{}", invitation["id"].as_str().unwrap());
    let accepted = ctx
        .send(request("PATCH", &uri, Some(&bob), Some(json!({"status": "accepted"}))))
        .await;
    assert_eq!(accepted.status(), StatusCode::OK);

    let again = ctx
        .send(request("PATCH", &uri, Some(&bob), Some(json!({"status": "declined"}))))
        .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(again).await["reason"], "already_responded");

    let detail = ctx
        .send(request("GET", &format!("/v1/groups/{group_id}"), Some(&bob), None))
        .await;
    assert_eq!(detail.status(), StatusCode::OK);
    assert_eq!(json_body(detail).await["role"], "member");
}

#[tokio::test]
async fn test_non_admin_forbidden_on_admin_surface() {
    let Some(ctx) = TestContext::with_database().await else { return };
    let user = token_for(&unique_email("user"));

    let response = ctx.send(request("GET", "/v1/admin/stats", Some(&user), None)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["reason"], "forbidden");

    let bad_page = ctx
        .send(request("GET", "/v1/admin/users?limit=1000", Some(&user), None))
        .await;
    assert_eq!(bad_page.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
