//! Long-lived App Store Connect credentials.

use std::fmt;

use tracing::{debug, instrument};

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::secret::{ExposeSecret, SecretBox};
use crate::signer::SigningKey;

/// Issuer id, key id and private key, immutable for the process lifetime.
///
/// The private key is parsed when the credential is built, so a bad key fails
/// at startup instead of on the first request.
pub struct Credential {
    issuer_id: String,
    key_id: String,
    private_key: SecretBox<[u8]>,
    signing_key: SigningKey,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("issuer_id", &self.issuer_id)
            .field("key_id", &self.key_id)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

impl Credential {
    /// Build a credential, parsing `private_key` eagerly.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentialFormat` if `private_key` is not a
    /// PEM-encoded PKCS#8 P-256 key.
    #[instrument(skip_all)]
    pub fn new(
        issuer_id: impl Into<String>,
        key_id: impl Into<String>,
        private_key: &[u8],
    ) -> Result<Self, AuthError> {
        let key_id = key_id.into();

        let signing_key = SigningKey::parse(private_key).map_err(|e| {
            debug!(
                target: "asc_auth.credential",
                key_id = %key_id,
                error = %e,
                "Private key failed validation"
            );
            AuthError::InvalidCredentialFormat(e)
        })?;

        Ok(Self {
            issuer_id: issuer_id.into(),
            key_id,
            private_key: SecretBox::new(private_key.to_vec().into_boxed_slice()),
            signing_key,
        })
    }

    /// Build a credential from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the configuration is invalid, or
    /// `AuthError::InvalidCredentialFormat` if the key does not parse.
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        config.validate()?;
        Self::new(
            config.issuer_id.clone(),
            config.key_id.clone(),
            config.private_key.expose_secret().as_bytes(),
        )
    }

    #[must_use]
    pub fn issuer_id(&self) -> &str {
        &self.issuer_id
    }

    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Raw private key bytes as supplied.
    #[must_use]
    pub fn private_key(&self) -> &SecretBox<[u8]> {
        &self.private_key
    }

    #[must_use]
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}
