//! End-to-end pipeline tests
//!
//! Drive requests through the full gateway router with wiremock standing in
//! for both the identity provider and the destination services.

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{any, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::test_app::{assert_error_response, body_json, test_config, TestApp};
use crate::common::tokens::{expired_token, token_for_audience, token_with};

async fn mock_exchange_success(idp: &MockServer, expected_audience: &str) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("token-exchange"))
        .and(body_string_contains(format!("audience={expected_audience}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "exchanged-token",
            "token_type": "Bearer",
            "expires_in": 300,
        })))
        .mount(idp)
        .await;
}

/// Scenario A + D: an organizer on an organizer route is forwarded with the
/// exchanged token and the staged identity headers.
#[tokio::test]
async fn organizer_request_is_exchanged_and_forwarded() {
    let destination = MockServer::start().await;
    let idp = MockServer::start().await;
    mock_exchange_success(&idp, "competition-service").await;

    let tenant = Uuid::new_v4();
    Mock::given(method("GET"))
        .and(path("/api/competitions/123"))
        .and(header("Authorization", "Bearer exchanged-token"))
        .and(header("X-Tenant-ID", tenant.to_string()))
        .and(header("X-User-ID", "user-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 123})))
        .expect(1)
        .mount(&destination)
        .await;

    let app = TestApp::new(&destination.uri(), &idp.uri()).await;
    let token = token_with("user-42", Some(tenant), &["organizer"]);

    let response = app.get("/api/competitions/123", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], 123);
}

/// A steward also satisfies the organizer-or-steward policy (OR semantics).
#[tokio::test]
async fn steward_role_satisfies_or_policy() {
    let destination = MockServer::start().await;
    let idp = MockServer::start().await;
    mock_exchange_success(&idp, "competition-service").await;

    Mock::given(method("GET"))
        .and(path("/api/competitions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&destination)
        .await;

    let app = TestApp::new(&destination.uri(), &idp.uri()).await;
    let token = token_with("user-7", Some(Uuid::new_v4()), &["entrant", "steward"]);

    let response = app.get("/api/competitions", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

/// Scenario B: an entrant on an organizer route is denied with 403 and
/// nothing is spent on exchange or proxying.
#[tokio::test]
async fn entrant_on_organizer_route_is_forbidden() {
    let destination = MockServer::start().await;
    let idp = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&destination)
        .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&idp)
        .await;

    let app = TestApp::new(&destination.uri(), &idp.uri()).await;
    let token = token_with("user-42", Some(Uuid::new_v4()), &["entrant"]);

    let response = app.get("/api/competitions", Some(&token)).await;
    assert_error_response(response, StatusCode::FORBIDDEN, "forbidden").await;
}

/// Scenario C: a valid token without a tenant claim is terminal with 403;
/// zero downstream calls are made.
#[tokio::test]
async fn missing_tenant_claim_is_terminal() {
    let destination = MockServer::start().await;
    let idp = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&destination)
        .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&idp)
        .await;

    let app = TestApp::new(&destination.uri(), &idp.uri()).await;
    let token = token_with("user-42", None, &["organizer"]);

    let response = app.get("/api/competitions", Some(&token)).await;
    assert_error_response(response, StatusCode::FORBIDDEN, "forbidden").await;
}

/// Scenario E: the identity provider rejects the exchange. The request is
/// still forwarded, but without an Authorization header, and the
/// destination's own rejection is passed through.
#[tokio::test]
async fn rejected_exchange_forwards_without_authorization() {
    let destination = MockServer::start().await;
    let idp = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})),
        )
        .expect(1)
        .mount(&idp)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/entries"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": "unauthorized", "message": "bad audience"})),
        )
        .expect(1)
        .mount(&destination)
        .await;

    let tenant = Uuid::new_v4();
    let app = TestApp::new(&destination.uri(), &idp.uri()).await;
    let token = token_with("user-42", Some(tenant), &["entrant"]);

    let response = app.get("/api/entries", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The original caller token must not have been passed through.
    let received = destination.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(received[0].headers.get("authorization").is_none());
    assert_eq!(
        received[0].headers.get("x-tenant-id").unwrap(),
        tenant.to_string().as_str()
    );
}

/// Scenario F: no credential on an authenticated-only route is 401 before
/// any audience resolution or exchange happens.
#[tokio::test]
async fn anonymous_on_authenticated_route_is_unauthorized() {
    let destination = MockServer::start().await;
    let idp = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&destination)
        .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&idp)
        .await;

    let app = TestApp::new(&destination.uri(), &idp.uri()).await;

    let response = app.get("/api/entries", None).await;
    assert_error_response(response, StatusCode::UNAUTHORIZED, "unauthorized").await;
}

/// A cluster with no exchange audience forwards the original credential
/// unchanged; the identity provider is never contacted.
#[tokio::test]
async fn no_exchange_cluster_forwards_original_token() {
    let destination = MockServer::start().await;
    let idp = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&idp)
        .await;

    let tenant = Uuid::new_v4();
    let token = token_with("user-42", Some(tenant), &[]);

    Mock::given(method("GET"))
        .and(path("/api/legacy/reports"))
        .and(header("Authorization", format!("Bearer {token}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&destination)
        .await;

    let app = TestApp::new(&destination.uri(), &idp.uri()).await;
    let response = app.get("/api/legacy/reports", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

/// An anonymous request on an unpolicied exchange route has nothing to
/// exchange and is forwarded without an Authorization header.
#[tokio::test]
async fn anonymous_on_open_route_forwards_without_authorization() {
    let destination = MockServer::start().await;
    let idp = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&idp)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/public/schedule"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&destination)
        .await;

    let app = TestApp::new(&destination.uri(), &idp.uri()).await;
    let response = app.get("/api/public/schedule", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let received = destination.received_requests().await.unwrap();
    assert!(received[0].headers.get("authorization").is_none());
    assert!(received[0].headers.get("x-tenant-id").is_none());
}

/// Client-supplied identity headers are stripped, never trusted.
#[tokio::test]
async fn spoofed_identity_headers_are_replaced() {
    let destination = MockServer::start().await;
    let idp = MockServer::start().await;
    mock_exchange_success(&idp, "competition-service").await;

    let tenant = Uuid::new_v4();
    Mock::given(method("GET"))
        .and(path("/api/entries"))
        .and(header("X-Tenant-ID", tenant.to_string()))
        .and(header("X-User-ID", "user-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&destination)
        .await;

    let app = TestApp::new(&destination.uri(), &idp.uri()).await;
    let token = token_with("user-42", Some(tenant), &[]);

    let request = axum::http::Request::builder()
        .uri("/api/entries")
        .header("Authorization", format!("Bearer {token}"))
        .header("X-Tenant-ID", Uuid::new_v4().to_string())
        .header("X-User-ID", "somebody-else")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = app.request(request).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn expired_token_is_unauthorized() {
    let destination = MockServer::start().await;
    let idp = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&destination)
        .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&idp)
        .await;

    let app = TestApp::new(&destination.uri(), &idp.uri()).await;
    let token = expired_token("user-42", Uuid::new_v4());

    let response = app.get("/api/entries", Some(&token)).await;
    assert_error_response(response, StatusCode::UNAUTHORIZED, "unauthorized").await;
}

/// A token minted for a downstream audience is not accepted by the gateway.
#[tokio::test]
async fn wrong_audience_token_is_unauthorized() {
    let destination = MockServer::start().await;
    let idp = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&destination)
        .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&idp)
        .await;

    let app = TestApp::new(&destination.uri(), &idp.uri()).await;
    let token = token_for_audience("user-42", "competition-service");

    let response = app.get("/api/entries", Some(&token)).await;
    assert_error_response(response, StatusCode::UNAUTHORIZED, "unauthorized").await;
}

/// Repeating the same request yields the same authorization decision.
#[tokio::test]
async fn authorization_decisions_are_idempotent() {
    let destination = MockServer::start().await;
    let idp = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&destination)
        .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&idp)
        .await;

    let app = TestApp::new(&destination.uri(), &idp.uri()).await;
    let token = token_with("user-42", Some(Uuid::new_v4()), &["entrant"]);

    for _ in 0..3 {
        let response = app.get("/api/competitions", Some(&token)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}

#[tokio::test]
async fn unrouted_path_is_not_found() {
    let destination = MockServer::start().await;
    let idp = MockServer::start().await;

    let app = TestApp::new(&destination.uri(), &idp.uri()).await;
    let response = app.get("/metrics", None).await;
    assert_error_response(response, StatusCode::NOT_FOUND, "not_found").await;
}

/// Downstream statuses pass through unmodified, success or not.
#[tokio::test]
async fn downstream_status_passes_through() {
    let destination = MockServer::start().await;
    let idp = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/public/teapot"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"error": "maintenance"})))
        .mount(&destination)
        .await;

    let app = TestApp::new(&destination.uri(), &idp.uri()).await;
    let response = app.get("/api/public/teapot", None).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"], "maintenance");
}

/// Request method and body are preserved across the proxy.
#[tokio::test]
async fn post_body_is_forwarded() {
    let destination = MockServer::start().await;
    let idp = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/public/feedback"))
        .and(body_string_contains("great show"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
        .expect(1)
        .mount(&destination)
        .await;

    let app = TestApp::new(&destination.uri(), &idp.uri()).await;
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/public/feedback")
        .header("Content-Type", "application/json")
        .body(axum::body::Body::from(r#"{"comment": "great show"}"#))
        .unwrap();

    let response = app.request(request).await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

/// Query strings survive forwarding.
#[tokio::test]
async fn query_string_is_preserved() {
    let destination = MockServer::start().await;
    let idp = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/public/schedule"))
        .and(wiremock::matchers::query_param("day", "saturday"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&destination)
        .await;

    let app = TestApp::new(&destination.uri(), &idp.uri()).await;
    let response = app.get("/api/public/schedule?day=saturday", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unreachable_destination_is_bad_gateway() {
    let app = TestApp::with_unreachable_clusters().await;
    let response = app.get("/api/public/schedule", None).await;
    assert_error_response(response, StatusCode::BAD_GATEWAY, "bad_gateway").await;
}

#[tokio::test]
async fn slow_destination_is_gateway_timeout() {
    let destination = MockServer::start().await;
    let idp = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/public/slow"))
        .respond_with(
            ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(3)),
        )
        .mount(&destination)
        .await;

    let mut config = test_config(&destination.uri(), &idp.uri());
    config.clusters.get_mut("competition").unwrap().timeout_secs = 1;
    let app = TestApp::with_config(config).await;

    let response = app.get("/api/public/slow", None).await;
    assert_error_response(response, StatusCode::GATEWAY_TIMEOUT, "gateway_timeout").await;
}
