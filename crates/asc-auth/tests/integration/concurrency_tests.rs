//! Integration tests for concurrent token access
//!
//! Many callers sharing one authenticator must observe a single signing
//! operation per refresh and never receive an expired token.

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::time::Duration;

use asc_auth::secret::ExposeSecret;
use asc_auth::{spawn_token_refresher, Credential, RequestAuthenticator};
use asc_auth_test_utils::{p256_test_key, TokenAssertions, TestKey, TEST_ISSUER_ID, TEST_KEY_ID};
use http::header::AUTHORIZATION;

const NOW: i64 = 1_700_000_000;

fn shared_authenticator() -> (Arc<RequestAuthenticator>, TestKey) {
    let key = p256_test_key().unwrap();
    let credential = Credential::new(TEST_ISSUER_ID, TEST_KEY_ID, key.pem.as_bytes()).unwrap();
    let authenticator = RequestAuthenticator::new(credential, Duration::from_secs(60)).unwrap();
    (Arc::new(authenticator), key)
}

fn api_request() -> http::Request<()> {
    http::Request::get("https://api.appstoreconnect.apple.com/v1/apps")
        .body(())
        .unwrap()
}

fn bearer(request: &http::Request<()>) -> String {
    request.headers()[AUTHORIZATION]
        .to_str()
        .unwrap()
        .strip_prefix("Bearer ")
        .unwrap()
        .to_string()
}

/// Authenticate from `threads` OS threads released together at `now`.
fn authenticate_from_threads(
    authenticator: &Arc<RequestAuthenticator>,
    threads: usize,
    now: i64,
) -> Vec<String> {
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let authenticator = Arc::clone(authenticator);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                let request = authenticator.authenticate_at(api_request(), now).unwrap();
                bearer(&request)
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn test_cold_start_threads_share_one_signature() {
    let (authenticator, key) = shared_authenticator();

    let tokens = authenticate_from_threads(&authenticator, 32, NOW);

    assert_eq!(authenticator.tokens_minted(), 1);
    let distinct: HashSet<_> = tokens.iter().collect();
    assert_eq!(distinct.len(), 1, "All threads should see the same token");
    tokens[0]
        .assert_issued_at(NOW)
        .assert_verifies_with(&key.public_key);
}

#[test]
fn test_stale_token_refreshed_once_under_contention() {
    let (authenticator, _key) = shared_authenticator();
    let original = authenticator.current_token_at(NOW).unwrap();

    let later = NOW + 1_150;
    let tokens = authenticate_from_threads(&authenticator, 32, later);

    assert_eq!(authenticator.tokens_minted(), 2);
    let distinct: HashSet<_> = tokens.iter().collect();
    assert_eq!(distinct.len(), 1);
    assert_ne!(tokens[0], original.value().expose_secret());
    tokens[0].assert_issued_at(later);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tasks_share_one_signature() {
    let (authenticator, key) = shared_authenticator();

    let tasks: Vec<_> = (0..64)
        .map(|_| {
            let authenticator = Arc::clone(&authenticator);
            tokio::spawn(async move {
                let request = authenticator.authenticate(api_request()).unwrap();
                bearer(&request)
            })
        })
        .collect();

    let mut tokens = Vec::with_capacity(tasks.len());
    for task in tasks {
        tokens.push(task.await.unwrap());
    }

    assert_eq!(authenticator.tokens_minted(), 1);
    let distinct: HashSet<_> = tokens.iter().collect();
    assert_eq!(distinct.len(), 1);

    let now = chrono::Utc::now().timestamp();
    let claims = authenticator.cached_token().unwrap().claims().unwrap();
    assert!(claims.exp > now, "Handed-out token must not be expired");
    tokens[0].assert_verifies_with(&key.public_key);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_refresher_and_callers_share_one_signature() {
    let (authenticator, _key) = shared_authenticator();
    let refresher = spawn_token_refresher(&authenticator);

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let authenticator = Arc::clone(&authenticator);
            tokio::spawn(async move { authenticator.current_token().unwrap() })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    // Let the refresher finish its first check if it has not already
    tokio::time::timeout(Duration::from_secs(5), async {
        while authenticator.cached_token().is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(authenticator.tokens_minted(), 1);
    refresher.abort();
}
