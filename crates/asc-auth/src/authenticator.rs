//! Attaches App Store Connect bearer tokens to outgoing requests.
//!
//! [`RequestAuthenticator`] is the one entry point the request-dispatch layer
//! needs. It owns the [`Credential`] and the [`TokenCache`], mints a token
//! when the cache cannot serve one, and sets `Authorization: Bearer <token>`
//! on the request it is handed.
//!
//! # Example
//!
//! ```rust,ignore
//! use asc_auth::{AuthConfig, RequestAuthenticator};
//! use std::sync::Arc;
//!
//! let authenticator = Arc::new(RequestAuthenticator::from_config(&config)?);
//!
//! let request = client
//!     .get("https://api.appstoreconnect.apple.com/v1/apps")
//!     .build()?;
//! let request = authenticator.authenticate(request)?;
//! let response = client.execute(request).await?;
//! ```
//!
//! No network I/O happens here; retries belong to the transport.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use http::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tracing::{debug, instrument};

use crate::config::{validate_refresh_skew, AuthConfig};
use crate::credential::Credential;
use crate::error::AuthError;
use crate::jwt::build_signing_input;
use crate::secret::ExposeSecret;
use crate::token_cache::{Token, TokenCache};

// =============================================================================
// Request abstraction
// =============================================================================

/// A request value that can carry an `Authorization` header.
///
/// Requests are taken by value and handed back amended.
pub trait Authorize: Sized {
    /// Return `self` with `Authorization` set to `value`, replacing any
    /// existing value.
    #[must_use]
    fn with_authorization(self, value: HeaderValue) -> Self;
}

impl Authorize for reqwest::Request {
    fn with_authorization(mut self, value: HeaderValue) -> Self {
        self.headers_mut().insert(AUTHORIZATION, value);
        self
    }
}

impl Authorize for reqwest::RequestBuilder {
    /// `RequestBuilder::header` appends; `headers` replaces existing keys.
    fn with_authorization(self, value: HeaderValue) -> Self {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert(AUTHORIZATION, value);
        self.headers(headers)
    }
}

impl<B> Authorize for http::Request<B> {
    fn with_authorization(mut self, value: HeaderValue) -> Self {
        self.headers_mut().insert(AUTHORIZATION, value);
        self
    }
}

// =============================================================================
// Authenticator
// =============================================================================

/// Facade used by the request-dispatch layer. `Send + Sync`; share via `Arc`.
#[derive(Debug)]
pub struct RequestAuthenticator {
    credential: Credential,
    cache: TokenCache,
    minted: AtomicU64,
}

impl RequestAuthenticator {
    /// Create an authenticator with an empty cache.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if `refresh_skew` is not below the
    /// token lifetime and the configured maximum.
    pub fn new(credential: Credential, refresh_skew: Duration) -> Result<Self, AuthError> {
        validate_refresh_skew(refresh_skew)?;
        Ok(Self {
            credential,
            cache: TokenCache::new(refresh_skew),
            minted: AtomicU64::new(0),
        })
    }

    /// Build the credential and authenticator from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` or
    /// `AuthError::InvalidCredentialFormat`.
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let credential = Credential::from_config(config)?;
        Self::new(credential, config.refresh_skew)
    }

    #[must_use]
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    #[must_use]
    pub fn refresh_skew(&self) -> Duration {
        self.cache.refresh_skew()
    }

    /// The cached token, if any, without refreshing.
    #[must_use]
    pub fn cached_token(&self) -> Option<Token> {
        self.cache.peek()
    }

    /// Number of tokens signed since construction.
    #[must_use]
    pub fn tokens_minted(&self) -> u64 {
        self.minted.load(Ordering::Relaxed)
    }

    /// A token valid at `now` (Unix epoch seconds), minting one if needed.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Signing` or `AuthError::Serialization` if a new
    /// token was needed and could not be produced.
    #[instrument(skip_all, fields(key_id = %self.credential.key_id()))]
    pub fn current_token_at(&self, now: i64) -> Result<Token, AuthError> {
        self.cache.current_or_refresh(now, || self.mint(now))
    }

    /// [`current_token_at`](Self::current_token_at) with the system clock.
    ///
    /// # Errors
    ///
    /// See [`current_token_at`](Self::current_token_at).
    pub fn current_token(&self) -> Result<Token, AuthError> {
        self.current_token_at(chrono::Utc::now().timestamp())
    }

    /// `Bearer <token>` for a token valid at `now`, marked sensitive.
    ///
    /// # Errors
    ///
    /// See [`current_token_at`](Self::current_token_at); additionally
    /// `AuthError::InvalidHeader` if the token is not a valid header value.
    pub fn authorization_header_at(&self, now: i64) -> Result<HeaderValue, AuthError> {
        let token = self.current_token_at(now)?;
        bearer_header(&token)
    }

    /// [`authorization_header_at`](Self::authorization_header_at) with the
    /// system clock.
    ///
    /// # Errors
    ///
    /// See [`authorization_header_at`](Self::authorization_header_at).
    pub fn authorization_header(&self) -> Result<HeaderValue, AuthError> {
        self.authorization_header_at(chrono::Utc::now().timestamp())
    }

    /// Return `request` with `Authorization: Bearer <token>` set.
    ///
    /// # Errors
    ///
    /// On error the request is dropped rather than dispatched without
    /// credentials. See [`authorization_header_at`](Self::authorization_header_at).
    pub fn authenticate_at<R: Authorize>(&self, request: R, now: i64) -> Result<R, AuthError> {
        let header = self.authorization_header_at(now)?;
        Ok(request.with_authorization(header))
    }

    /// [`authenticate_at`](Self::authenticate_at) with the system clock.
    ///
    /// # Errors
    ///
    /// See [`authenticate_at`](Self::authenticate_at).
    pub fn authenticate<R: Authorize>(&self, request: R) -> Result<R, AuthError> {
        self.authenticate_at(request, chrono::Utc::now().timestamp())
    }

    /// Build, sign and assemble a token issued at `now`.
    fn mint(&self, now: i64) -> Result<Token, AuthError> {
        let input = build_signing_input(&self.credential, now)?;
        let signature = self.credential.signing_key().sign(input.as_bytes())?;
        let token = input.into_token(&signature);

        let minted = self.minted.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            target: "asc_auth.authenticator",
            key_id = %self.credential.key_id(),
            issued_at = now,
            expires_at = token.expires_at(),
            minted = minted,
            "Minted App Store Connect token"
        );

        Ok(token)
    }
}

fn bearer_header(token: &Token) -> Result<HeaderValue, AuthError> {
    let mut value = HeaderValue::try_from(format!("Bearer {}", token.value().expose_secret()))
        .map_err(|e| AuthError::InvalidHeader(e.to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}
