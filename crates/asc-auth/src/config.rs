//! Credential and cache configuration.
//!
//! The host process owns configuration loading. It either builds an
//! [`AuthConfig`] directly or hands over its variables as a map via
//! [`AuthConfig::from_vars`]; this crate never reads the process environment.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::jwt::TOKEN_LIFETIME;
use crate::secret::SecretString;

/// Default safety margin subtracted from a token's expiry before reuse.
pub const DEFAULT_REFRESH_SKEW: Duration = Duration::from_secs(60);

/// Upper bound for a configured refresh skew (10 minutes).
///
/// Keeps a misconfigured skew from silently shrinking the useful token
/// lifetime to a few seconds.
pub const MAX_REFRESH_SKEW: Duration = Duration::from_secs(600);

// A skew at or past the token lifetime would force a new signature on every
// call, so the maximum must stay below it.
const _: () = assert!(MAX_REFRESH_SKEW.as_secs() < TOKEN_LIFETIME.as_secs());

/// Variable holding the App Store Connect issuer id.
pub const ISSUER_ID_VAR: &str = "ASC_ISSUER_ID";
/// Variable holding the App Store Connect key id.
pub const KEY_ID_VAR: &str = "ASC_KEY_ID";
/// Variable holding the `.p8` private key (PEM text).
pub const PRIVATE_KEY_VAR: &str = "ASC_PRIVATE_KEY";
/// Optional variable overriding the refresh skew, in whole seconds.
pub const REFRESH_SKEW_VAR: &str = "ASC_TOKEN_REFRESH_SKEW_SECONDS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

/// Long-lived credentials plus cache tuning.
#[derive(Clone)]
pub struct AuthConfig {
    /// Issuer id from the App Store Connect "Keys" page.
    pub issuer_id: String,

    /// Key id of the private key.
    pub key_id: String,

    /// PKCS#8 PEM private key (`.p8` file contents).
    pub private_key: SecretString,

    /// Tokens are re-minted once `now >= expires_at - refresh_skew`.
    pub refresh_skew: Duration,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("issuer_id", &self.issuer_id)
            .field("key_id", &self.key_id)
            .field("private_key", &"[REDACTED]")
            .field("refresh_skew", &self.refresh_skew)
            .finish()
    }
}

impl AuthConfig {
    /// Create a configuration with the default refresh skew.
    #[must_use]
    pub fn new(issuer_id: String, key_id: String, private_key: SecretString) -> Self {
        Self {
            issuer_id,
            key_id,
            private_key,
            refresh_skew: DEFAULT_REFRESH_SKEW,
        }
    }

    /// Set the refresh skew.
    #[must_use]
    pub fn with_refresh_skew(mut self, skew: Duration) -> Self {
        self.refresh_skew = skew;
        self
    }

    /// Load configuration from a map of variables supplied by the host.
    ///
    /// # Errors
    ///
    /// - `ConfigError::MissingVar` if a required variable is absent
    /// - `ConfigError::InvalidValue` if the skew is not a whole number of
    ///   seconds or the loaded configuration fails [`AuthConfig::validate`]
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let required = |name: &str| {
            vars.get(name)
                .cloned()
                .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
        };

        let issuer_id = required(ISSUER_ID_VAR)?;
        let key_id = required(KEY_ID_VAR)?;
        let private_key = SecretString::from(required(PRIVATE_KEY_VAR)?);

        let refresh_skew = match vars.get(REFRESH_SKEW_VAR) {
            Some(raw) => {
                let secs = raw
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| ConfigError::InvalidValue {
                        name: REFRESH_SKEW_VAR.to_string(),
                        reason: e.to_string(),
                    })?;
                Duration::from_secs(secs)
            }
            None => DEFAULT_REFRESH_SKEW,
        };

        let config = Self {
            issuer_id,
            key_id,
            private_key,
            refresh_skew,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check identifiers and the refresh skew.
    ///
    /// The private key itself is validated when the credential is built.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if an identifier is empty or the
    /// skew is not below both [`MAX_REFRESH_SKEW`] and the token lifetime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: ISSUER_ID_VAR.to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        if self.key_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: KEY_ID_VAR.to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        validate_refresh_skew(self.refresh_skew)
    }
}

/// Reject a skew above [`MAX_REFRESH_SKEW`].
pub(crate) fn validate_refresh_skew(skew: Duration) -> Result<(), ConfigError> {
    if skew > MAX_REFRESH_SKEW {
        return Err(ConfigError::InvalidValue {
            name: REFRESH_SKEW_VAR.to_string(),
            reason: format!(
                "{}s exceeds maximum of {}s",
                skew.as_secs(),
                MAX_REFRESH_SKEW.as_secs()
            ),
        });
    }
    Ok(())
}
