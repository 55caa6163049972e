//! Custom test assertions for expressive tests
//!
//! Provides trait-based assertions over compact App Store Connect tokens.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::crypto_fixtures::verify_jwt_signature;

/// JWT header structure
#[derive(Debug, Deserialize)]
struct JwtHeader {
    pub alg: String,
    pub typ: String,
    pub kid: String,
}

/// JWT claims structure
#[derive(Debug, Deserialize)]
struct JwtClaims {
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub aud: String,
}

/// Custom assertions for compact tokens
///
/// # Example
/// ```rust,ignore
/// token
///     .assert_valid_es256_jwt()
///     .assert_key_id("2X9R4HXF34")
///     .assert_issued_at(1_700_000_000)
///     .assert_verifies_with(&key.public_key);
/// ```
pub trait TokenAssertions {
    /// Assert the token is a well-formed ES256 JWT for App Store Connect
    fn assert_valid_es256_jwt(&self) -> &Self;

    /// Assert the `kid` header
    fn assert_key_id(&self, key_id: &str) -> &Self;

    /// Assert the `iss` claim
    fn assert_issuer(&self, issuer_id: &str) -> &Self;

    /// Assert `iat` and that `exp` is exactly 20 minutes later
    fn assert_issued_at(&self, iat: i64) -> &Self;

    /// Assert the signature verifies with the given public key
    fn assert_verifies_with(&self, public_key: &[u8]) -> &Self;
}

fn segment<T: DeserializeOwned>(token: &str, index: usize, what: &str) -> T {
    let part = token
        .split('.')
        .nth(index)
        .unwrap_or_else(|| panic!("JWT has no {what} segment"));
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .unwrap_or_else(|e| panic!("Failed to base64 decode JWT {what}: {e}"));
    serde_json::from_slice(&bytes)
        .unwrap_or_else(|e| panic!("Failed to parse JWT {what} JSON: {e}"))
}

impl TokenAssertions for str {
    fn assert_valid_es256_jwt(&self) -> &Self {
        let parts: Vec<_> = self.split('.').collect();
        assert_eq!(
            parts.len(),
            3,
            "JWT must have 3 parts (header.payload.signature), got {}",
            parts.len()
        );
        assert!(
            !self.contains('='),
            "JWT segments must be base64url without padding"
        );

        let header: JwtHeader = segment(self, 0, "header");
        assert_eq!(header.alg, "ES256", "Expected ES256 algorithm");
        assert_eq!(header.typ, "JWT", "Expected JWT type");
        assert!(!header.kid.is_empty(), "Expected a key id");

        let claims: JwtClaims = segment(self, 1, "claims");
        assert_eq!(claims.aud, "appstoreconnect-v1", "Unexpected audience");
        assert!(!claims.iss.is_empty(), "Expected an issuer");

        let signature = URL_SAFE_NO_PAD
            .decode(parts[2])
            .expect("Failed to base64 decode JWT signature");
        assert_eq!(signature.len(), 64, "ES256 signature must be 64 raw bytes");

        self
    }

    fn assert_key_id(&self, key_id: &str) -> &Self {
        let header: JwtHeader = segment(self, 0, "header");
        assert_eq!(
            header.kid, key_id,
            "Expected key_id '{}', got '{}'",
            key_id, header.kid
        );
        self
    }

    fn assert_issuer(&self, issuer_id: &str) -> &Self {
        let claims: JwtClaims = segment(self, 1, "claims");
        assert_eq!(
            claims.iss, issuer_id,
            "Expected issuer '{}', got '{}'",
            issuer_id, claims.iss
        );
        self
    }

    fn assert_issued_at(&self, iat: i64) -> &Self {
        let claims: JwtClaims = segment(self, 1, "claims");
        assert_eq!(claims.iat, iat, "Unexpected iat");
        assert_eq!(
            claims.exp - claims.iat,
            1200,
            "Token lifetime must be exactly 20 minutes"
        );
        self
    }

    fn assert_verifies_with(&self, public_key: &[u8]) -> &Self {
        assert!(
            verify_jwt_signature(self, public_key),
            "Token signature does not verify with the given public key"
        );
        self
    }
}
