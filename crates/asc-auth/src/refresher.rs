//! Background task that keeps the token cache warm.
//!
//! Request-path refresh already guarantees a valid token; this task only moves
//! the signing cost off the request path. It sleeps until the current token
//! reaches its refresh boundary (`expires_at - refresh_skew`) and then asks the
//! authenticator for a token, which re-mints through the same single-flight
//! cache request paths use.
//!
//! # Features
//!
//! - Exponential backoff on signing failures (1s, 2s, 4s, ..., max 30s)
//! - Holds only a `Weak` reference: the task ends once the authenticator is
//!   dropped
//! - Abort the returned handle to stop it early
//!
//! # Example
//!
//! ```rust,ignore
//! let authenticator = Arc::new(RequestAuthenticator::from_config(&config)?);
//! let refresher = spawn_token_refresher(&authenticator);
//!
//! // ... dispatch requests ...
//!
//! refresher.abort();
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace, warn};

use crate::authenticator::RequestAuthenticator;

/// Initial backoff delay for retry.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Maximum backoff delay.
const MAX_BACKOFF_MS: u64 = 30_000;

/// Minimum sleep between refresh checks.
const MIN_SLEEP_SECS: i64 = 1;

/// Spawn the refresher on the current tokio runtime.
///
/// # Panics
///
/// Panics if called outside a tokio runtime, like `tokio::spawn`.
#[must_use]
pub fn spawn_token_refresher(authenticator: &Arc<RequestAuthenticator>) -> JoinHandle<()> {
    let weak = Arc::downgrade(authenticator);
    tokio::spawn(async move {
        refresh_loop(weak).await;
    })
}

/// Runs until the authenticator is dropped or the task is aborted.
#[instrument(skip_all)]
async fn refresh_loop(authenticator: Weak<RequestAuthenticator>) {
    let mut backoff = INITIAL_BACKOFF_MS;

    loop {
        // Upgrade only for the duration of one check so the task never keeps
        // the authenticator alive while sleeping
        let sleep_duration = {
            let Some(authenticator) = authenticator.upgrade() else {
                debug!(
                    target: "asc_auth.refresher",
                    "Authenticator dropped, stopping refresh loop"
                );
                break;
            };

            let now = chrono::Utc::now().timestamp();
            match authenticator.current_token_at(now) {
                Ok(token) => {
                    backoff = INITIAL_BACKOFF_MS;

                    let refresh_at = token.refresh_at(authenticator.refresh_skew());
                    let sleep_secs = (refresh_at - now).max(MIN_SLEEP_SECS);
                    trace!(
                        target: "asc_auth.refresher",
                        expires_at = token.expires_at(),
                        sleep_secs = sleep_secs,
                        "Token is warm"
                    );

                    Duration::from_secs(u64::try_from(sleep_secs).unwrap_or(1))
                }
                Err(e) => {
                    warn!(
                        target: "asc_auth.refresher",
                        key_id = %authenticator.credential().key_id(),
                        error = %e,
                        backoff_ms = backoff,
                        "Token refresh failed, will retry"
                    );

                    let delay = Duration::from_millis(backoff);
                    backoff = (backoff * 2).min(MAX_BACKOFF_MS);
                    delay
                }
            }
        };

        tokio::time::sleep(sleep_duration).await;
    }
}
