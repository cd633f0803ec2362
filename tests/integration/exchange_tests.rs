//! Token exchange client tests against a mock identity provider

use serde_json::json;
use wiremock::matchers::{body_string_contains, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use showgate::config::IdentityProviderConfig;
use showgate::services::token_exchange::{ExchangeError, TokenExchangeClient};

fn exchange_client(idp_url: &str) -> TokenExchangeClient {
    let config = IdentityProviderConfig {
        discovery_url: None,
        token_endpoint: Some(format!("{idp_url}/oauth/token")),
        client_id: "showgate".to_string(),
        client_secret: "s3cret".to_string(),
        timeout_secs: 5,
    };
    TokenExchangeClient::new(&config, format!("{idp_url}/oauth/token")).unwrap()
}

#[tokio::test]
async fn successful_exchange_returns_access_token() {
    let idp = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(header_exists("authorization"))
        .and(body_string_contains("grant-type%3Atoken-exchange"))
        .and(body_string_contains("subject_token=original-token"))
        .and(body_string_contains("audience=judging-service"))
        .and(body_string_contains("requested_token_type="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "scoped-token",
            "token_type": "Bearer",
            "expires_in": 300,
        })))
        .expect(1)
        .mount(&idp)
        .await;

    let result = exchange_client(&idp.uri())
        .exchange("original-token", "judging-service")
        .await
        .unwrap();

    assert_eq!(result.access_token, "scoped-token");
    assert_eq!(result.expires_in, Some(300));

    // The gateway authenticates as a confidential client.
    let received = idp.received_requests().await.unwrap();
    let auth = received[0].headers.get("authorization").unwrap();
    assert!(auth.to_str().unwrap().starts_with("Basic "));
}

#[tokio::test]
async fn provider_rejection_surfaces_error_code() {
    let idp = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})),
        )
        .mount(&idp)
        .await;

    let result = exchange_client(&idp.uri())
        .exchange("revoked-token", "judging-service")
        .await;

    match result {
        Err(ExchangeError::Rejected { status, error }) => {
            assert_eq!(status, 400);
            assert_eq!(error, "invalid_grant");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn rejection_without_body_still_reports_status() {
    let idp = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&idp)
        .await;

    let result = exchange_client(&idp.uri())
        .exchange("some-token", "judging-service")
        .await;

    match result {
        Err(ExchangeError::Rejected { status, error }) => {
            assert_eq!(status, 503);
            assert_eq!(error, "unknown");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn success_without_access_token_is_malformed() {
    let idp = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token_type": "Bearer"})))
        .mount(&idp)
        .await;

    let result = exchange_client(&idp.uri())
        .exchange("some-token", "judging-service")
        .await;

    assert!(matches!(result, Err(ExchangeError::MalformedResponse)));
}

#[tokio::test]
async fn non_json_success_body_is_malformed() {
    let idp = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&idp)
        .await;

    let result = exchange_client(&idp.uri())
        .exchange("some-token", "judging-service")
        .await;

    assert!(matches!(result, Err(ExchangeError::MalformedResponse)));
}
