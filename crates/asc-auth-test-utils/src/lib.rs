//! # ASC Auth Test Utilities
//!
//! Shared test utilities for the `asc-auth` crate.
//!
//! This crate provides:
//! - Crypto fixtures (`.p8`-style P-256 keys, wrong-curve keys, an independent
//!   ES256 verifier)
//! - Custom assertions (`TokenAssertions` trait)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use asc_auth_test_utils::*;
//!
//! #[test]
//! fn test_example() {
//!     let key = p256_test_key()?;
//!     let token = mint_somehow(&key.pem);
//!
//!     token
//!         .assert_valid_es256_jwt()
//!         .assert_key_id(TEST_KEY_ID)
//!         .assert_verifies_with(&key.public_key);
//! }
//! ```

pub mod assertions;
pub mod crypto_fixtures;

// Re-export commonly used items
pub use assertions::*;
pub use crypto_fixtures::*;
