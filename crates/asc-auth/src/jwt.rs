//! JWT assembly for App Store Connect bearer tokens.
//!
//! A token is the compact JWS serialization
//! `b64u(header) "." b64u(claims) "." b64u(signature)`, base64url without
//! padding. This module builds the first two segments (the signing input) and
//! appends the signature once the signer has produced it.
//!
//! # Usage
//!
//! ```rust,ignore
//! use asc_auth::jwt::build_signing_input;
//!
//! let input = build_signing_input(&credential, now)?;
//! let signature = credential.signing_key().sign(input.as_bytes())?;
//! let token = input.into_token(&signature);
//! ```

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};

use crate::credential::Credential;
use crate::error::AuthError;
use crate::signer::SIGNATURE_LEN;
use crate::token_cache::Token;

// =============================================================================
// Constants
// =============================================================================

/// JWS algorithm: ECDSA on P-256 with SHA-256.
pub const ALGORITHM: &str = "ES256";

/// `typ` header value.
pub const TOKEN_TYPE: &str = "JWT";

/// `aud` claim App Store Connect requires.
pub const AUDIENCE: &str = "appstoreconnect-v1";

/// Token lifetime; App Store Connect rejects tokens valid for longer.
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(20 * 60);

/// [`TOKEN_LIFETIME`] in whole seconds, for timestamp arithmetic.
pub const TOKEN_LIFETIME_SECS: i64 = 20 * 60;

// =============================================================================
// Header & Claims
// =============================================================================

/// JOSE header. Field order is the serialized order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JwtHeader {
    pub alg: String,
    pub kid: String,
    pub typ: String,
}

impl JwtHeader {
    #[must_use]
    pub fn es256(key_id: &str) -> Self {
        Self {
            alg: ALGORITHM.to_string(),
            kid: key_id.to_string(),
            typ: TOKEN_TYPE.to_string(),
        }
    }
}

/// App Store Connect claims. Field order is the serialized order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer id.
    pub iss: String,
    /// Issued-at (Unix epoch seconds).
    pub iat: i64,
    /// Expiration (Unix epoch seconds), always `iat + 1200`.
    pub exp: i64,
    /// Audience, always [`AUDIENCE`].
    pub aud: String,
}

impl Claims {
    #[must_use]
    pub fn new(issuer_id: &str, now: i64) -> Self {
        Self {
            iss: issuer_id.to_string(),
            iat: now,
            exp: now.saturating_add(TOKEN_LIFETIME_SECS),
            aud: AUDIENCE.to_string(),
        }
    }
}

// =============================================================================
// Signing input
// =============================================================================

/// `b64u(header) "." b64u(claims)`, plus the expiry those claims carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningInput {
    value: String,
    expires_at: i64,
}

impl SigningInput {
    /// The exact bytes handed to the signer.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.value.as_bytes()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Append the signature segment, completing the compact serialization.
    #[must_use]
    pub fn into_token(self, signature: &[u8; SIGNATURE_LEN]) -> Token {
        let mut value = self.value;
        value.push('.');
        URL_SAFE_NO_PAD.encode_string(signature, &mut value);
        Token::new(value, self.expires_at)
    }
}

/// Build the signing input for `credential` at `now` (Unix epoch seconds).
///
/// Pure apart from JSON encoding: no clock reads, no I/O.
///
/// # Errors
///
/// Returns `AuthError::Serialization` if header or claims fail to encode.
pub fn build_signing_input(credential: &Credential, now: i64) -> Result<SigningInput, AuthError> {
    let header = JwtHeader::es256(credential.key_id());
    let claims = Claims::new(credential.issuer_id(), now);

    let header_json = serde_json::to_vec(&header)
        .map_err(|e| AuthError::Serialization(format!("JWT header: {e}")))?;
    let claims_json = serde_json::to_vec(&claims)
        .map_err(|e| AuthError::Serialization(format!("JWT claims: {e}")))?;

    let mut value = URL_SAFE_NO_PAD.encode(header_json);
    value.push('.');
    URL_SAFE_NO_PAD.encode_string(claims_json, &mut value);

    Ok(SigningInput {
        value,
        expires_at: claims.exp,
    })
}

/// Decode the claims segment of a compact token without verifying it.
///
/// Used to introspect tokens this crate minted.
///
/// # Errors
///
/// Returns `AuthError::Serialization` if the token is not three segments or
/// the claims segment is not base64url JSON.
pub fn decode_claims(token: &str) -> Result<Claims, AuthError> {
    let mut parts = token.split('.');
    let (Some(_), Some(claims_b64), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::Serialization(
            "token is not a three-part compact JWT".to_string(),
        ));
    };

    let claims_json = URL_SAFE_NO_PAD
        .decode(claims_b64)
        .map_err(|e| AuthError::Serialization(format!("JWT claims encoding: {e}")))?;

    serde_json::from_slice(&claims_json)
        .map_err(|e| AuthError::Serialization(format!("JWT claims: {e}")))
}
