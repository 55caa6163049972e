//! Integration tests for authenticated request dispatch
//!
//! Requests are authenticated and then sent with `reqwest` to a `wiremock`
//! server that stands in for the App Store Connect API.

use std::time::Duration;

use asc_auth::{Credential, RequestAuthenticator};
use asc_auth_test_utils::{
    p256_test_key, verify_jwt_signature, TestKey, TokenAssertions, TEST_ISSUER_ID, TEST_KEY_ID,
};
use reqwest::StatusCode;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

/// Matches requests whose bearer token verifies against `public_key`.
struct SignedBy {
    public_key: Vec<u8>,
}

impl Match for SignedBy {
    fn matches(&self, request: &Request) -> bool {
        request
            .headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|token| verify_jwt_signature(token, &self.public_key))
    }
}

fn new_authenticator() -> (RequestAuthenticator, TestKey) {
    let key = p256_test_key().unwrap();
    let credential = Credential::new(TEST_ISSUER_ID, TEST_KEY_ID, key.pem.as_bytes()).unwrap();
    (
        RequestAuthenticator::new(credential, Duration::from_secs(60)).unwrap(),
        key,
    )
}

async fn mount_apps_endpoint(server: &MockServer, key: &TestKey) {
    Mock::given(method("GET"))
        .and(path("/v1/apps"))
        .and(SignedBy {
            public_key: key.public_key.clone(),
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [],
            "links": { "self": "/v1/apps" }
        })))
        .mount(server)
        .await;

    Mock::given(path("/v1/apps"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "errors": [{ "status": "401", "code": "NOT_AUTHORIZED" }]
        })))
        .with_priority(10)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_authenticated_request_is_accepted() -> Result<(), anyhow::Error> {
    let server = MockServer::start().await;
    let (authenticator, key) = new_authenticator();
    mount_apps_endpoint(&server, &key).await;
    let client = reqwest::Client::new();

    let request = client.get(format!("{}/v1/apps", server.uri())).build()?;
    let request = authenticator.authenticate(request)?;
    let response = client.execute(request).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await?;
    assert!(body["data"].is_array());

    Ok(())
}

#[tokio::test]
async fn test_unauthenticated_request_is_rejected() -> Result<(), anyhow::Error> {
    let server = MockServer::start().await;
    let (_authenticator, key) = new_authenticator();
    mount_apps_endpoint(&server, &key).await;

    let response = reqwest::Client::new()
        .get(format!("{}/v1/apps", server.uri()))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn test_request_signed_by_other_key_is_rejected() -> Result<(), anyhow::Error> {
    let server = MockServer::start().await;
    let (authenticator, _key) = new_authenticator();
    let (_, other_key) = new_authenticator();
    mount_apps_endpoint(&server, &other_key).await;

    let client = reqwest::Client::new();
    let request = authenticator.authenticate(client.get(format!("{}/v1/apps", server.uri())))?;
    let response = request.send().await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn test_request_builder_is_authenticated() -> Result<(), anyhow::Error> {
    let server = MockServer::start().await;
    let (authenticator, key) = new_authenticator();
    mount_apps_endpoint(&server, &key).await;

    let builder = reqwest::Client::new()
        .get(format!("{}/v1/apps", server.uri()))
        .header("Accept", "application/json");
    let response = authenticator.authenticate(builder)?.send().await?;

    assert_eq!(response.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn test_stale_builder_authorization_is_replaced() -> Result<(), anyhow::Error> {
    let server = MockServer::start().await;
    let (authenticator, key) = new_authenticator();
    mount_apps_endpoint(&server, &key).await;

    let builder = reqwest::Client::new()
        .get(format!("{}/v1/apps", server.uri()))
        .header("Authorization", "Bearer stale");
    let response = authenticator.authenticate(builder)?.send().await?;

    assert_eq!(response.status(), StatusCode::OK);

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].headers.get_all("authorization").iter().count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_sequential_requests_reuse_cached_token() -> Result<(), anyhow::Error> {
    let server = MockServer::start().await;
    let (authenticator, key) = new_authenticator();

    Mock::given(method("GET"))
        .and(path("/v1/apps"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&server)
        .await;

    let client = reqwest::Client::new();
    for _ in 0..3 {
        let request = client.get(format!("{}/v1/apps", server.uri())).build()?;
        let response = client.execute(authenticator.authenticate(request)?).await?;
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(authenticator.tokens_minted(), 1);

    let received = server.received_requests().await.unwrap();
    let tokens: Vec<String> = received
        .iter()
        .map(|request| {
            request.headers["authorization"]
                .to_str()
                .unwrap()
                .strip_prefix("Bearer ")
                .unwrap()
                .to_string()
        })
        .collect();

    assert_eq!(tokens.len(), 3);
    assert!(tokens.iter().all(|token| token == &tokens[0]));
    tokens[0]
        .assert_valid_es256_jwt()
        .assert_key_id(TEST_KEY_ID)
        .assert_issuer(TEST_ISSUER_ID)
        .assert_verifies_with(&key.public_key);

    Ok(())
}
