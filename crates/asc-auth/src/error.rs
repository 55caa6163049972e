//! Error types for token minting and request authentication.

use thiserror::Error;

use crate::config::ConfigError;
use crate::signer::KeyParseError;

/// Errors surfaced to the request-dispatch layer.
///
/// Messages never include key material or token values.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The configured private key is not a PEM-encoded P-256 EC key.
    ///
    /// Raised when the [`Credential`](crate::credential::Credential) is
    /// constructed, so misconfiguration is fatal at startup rather than on the
    /// first request.
    #[error("Invalid credential format: {0}")]
    InvalidCredentialFormat(#[source] KeyParseError),

    /// The signing primitive failed for an already-validated key.
    ///
    /// Never retried internally and never cached.
    #[error("Signing error: {0}")]
    Signing(String),

    /// Header or claims could not be encoded as JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The token could not be represented as an HTTP header value.
    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<ConfigError> for AuthError {
    fn from(err: ConfigError) -> Self {
        AuthError::Configuration(err.to_string())
    }
}

/// Result type alias using `AuthError`
pub type Result<T> = std::result::Result<T, AuthError>;
