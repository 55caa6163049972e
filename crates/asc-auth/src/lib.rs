//! Bearer token minting and request authentication for the App Store Connect API.
//!
//! App Store Connect authenticates API calls with short-lived ES256 JWTs signed
//! by a team's private key. This crate turns the long-lived credentials
//! (issuer id, key id, `.p8` private key) into an `Authorization` header,
//! re-signing only when the cached token nears expiry.
//!
//! ```rust,ignore
//! use asc_auth::{AuthConfig, RequestAuthenticator};
//!
//! let authenticator = RequestAuthenticator::from_config(&config)?;
//! let request = authenticator.authenticate(request)?;
//! ```

#![warn(clippy::pedantic)]

/// Module for error types
pub mod error;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for credential and cache configuration
pub mod config;

/// Module for ES256 key parsing and signing
pub mod signer;

/// Module for credentials with eagerly validated keys
pub mod credential;

/// Module for JWT header, claims and compact serialization
pub mod jwt;

/// Module for the current-token cache
pub mod token_cache;

/// Module for attaching tokens to outgoing requests
pub mod authenticator;

/// Module for keeping the token cache warm in the background
pub mod refresher;

pub use authenticator::{Authorize, RequestAuthenticator};
pub use config::AuthConfig;
pub use credential::Credential;
pub use error::{AuthError, Result};
pub use refresher::spawn_token_refresher;
pub use token_cache::{Token, TokenCache};
