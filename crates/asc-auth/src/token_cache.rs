//! Current-token cache with single-flight regeneration.
//!
//! Holds the most recently minted [`Token`] and decides whether it can be
//! handed out again. A token is reused while
//! `now < expires_at - refresh_skew`; otherwise the caller-supplied generator
//! mints a replacement.
//!
//! # Concurrency
//!
//! The check-generate-store sequence runs under one mutex. Callers that find
//! the cache cold or stale while another caller is generating block on the
//! lock and then observe the freshly stored token, so concurrent refreshes
//! collapse into a single signing operation and an older token can never
//! overwrite a newer one.
//!
//! A failed generation leaves the previous state untouched; nothing partial is
//! ever stored.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::AuthError;
use crate::jwt::{decode_claims, Claims};
use crate::secret::{ExposeSecret, SecretString};

// =============================================================================
// Token
// =============================================================================

/// A minted bearer token and its expiry.
///
/// Superseded by a new value on refresh, never mutated.
#[derive(Clone)]
pub struct Token {
    value: SecretString,
    expires_at: i64,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Token {
    /// Wrap a compact token string and its expiry (Unix epoch seconds).
    #[must_use]
    pub fn new(value: String, expires_at: i64) -> Self {
        Self {
            value: SecretString::from(value),
            expires_at,
        }
    }

    /// The compact serialization.
    #[must_use]
    pub fn value(&self) -> &SecretString {
        &self.value
    }

    #[must_use]
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// The instant from which this token is no longer handed out.
    #[must_use]
    pub fn refresh_at(&self, refresh_skew: Duration) -> i64 {
        self.expires_at.saturating_sub(skew_secs(refresh_skew))
    }

    /// Whether the token may be handed out at `now`.
    #[must_use]
    pub fn is_fresh(&self, now: i64, refresh_skew: Duration) -> bool {
        now < self.refresh_at(refresh_skew)
    }

    /// Decode this token's claims.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Serialization` if the value is not a compact JWT.
    pub fn claims(&self) -> Result<Claims, AuthError> {
        decode_claims(self.value.expose_secret())
    }
}

fn skew_secs(skew: Duration) -> i64 {
    i64::try_from(skew.as_secs()).unwrap_or(i64::MAX)
}

// =============================================================================
// Token Cache
// =============================================================================

/// Mutex-guarded holder of the current token.
pub struct TokenCache {
    current: Mutex<Option<Token>>,
    refresh_skew: Duration,
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("current", &self.peek())
            .field("refresh_skew", &self.refresh_skew)
            .finish()
    }
}

impl TokenCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(refresh_skew: Duration) -> Self {
        Self {
            current: Mutex::new(None),
            refresh_skew,
        }
    }

    #[must_use]
    pub fn refresh_skew(&self) -> Duration {
        self.refresh_skew
    }

    /// Return the held token if still fresh at `now`, otherwise run
    /// `generator`, store its token as current and return it.
    ///
    /// `generator` runs with the cache locked and at most once per call.
    ///
    /// # Errors
    ///
    /// Propagates the generator's error; the cache keeps its previous state.
    pub fn current_or_refresh<F>(&self, now: i64, generator: F) -> Result<Token, AuthError>
    where
        F: FnOnce() -> Result<Token, AuthError>,
    {
        let mut current = self.lock();

        if let Some(token) = current
            .as_ref()
            .filter(|token| token.is_fresh(now, self.refresh_skew))
        {
            trace!(
                target: "asc_auth.token_cache",
                now = now,
                expires_at = token.expires_at(),
                "Token cache hit"
            );
            return Ok(token.clone());
        }

        let previous_expiry = current.as_ref().map(Token::expires_at);
        let token = generator()?;

        debug!(
            target: "asc_auth.token_cache",
            now = now,
            expires_at = token.expires_at(),
            previous_expires_at = ?previous_expiry,
            "Token refreshed"
        );

        *current = Some(token.clone());
        Ok(token)
    }

    /// The held token, fresh or not, without refreshing.
    #[must_use]
    pub fn peek(&self) -> Option<Token> {
        self.lock().clone()
    }

    /// Drop the held token; the next call regenerates.
    pub fn clear(&self) {
        *self.lock() = None;
    }

    /// The guarded value is only ever replaced by a complete token, so it is
    /// consistent even if a generator panicked while holding the lock.
    fn lock(&self) -> MutexGuard<'_, Option<Token>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
