//! ES256 key material and signing.
//!
//! App Store Connect issues private keys as `.p8` files: PEM-armoured PKCS#8
//! documents holding a P-256 ECDSA key. [`SigningKey::parse`] turns that text
//! into a `ring` key pair; [`SigningKey::sign`] produces the 64-byte `r || s`
//! signature JWS requires (RFC 7518 §3.4).
//!
//! `ring` returns ECDSA signatures ASN.1/DER encoded when asked for the ASN.1
//! variant. The conversion to the fixed-width JWS form is done explicitly by
//! [`der_signature_to_fixed`] so it can be tested on its own.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::error::AuthError;
use crate::secret::{ExposeSecret, SecretBox};

/// PEM label of a PKCS#8 private key.
pub const PKCS8_PEM_LABEL: &str = "PRIVATE KEY";

/// Length of a JWS ES256 signature (`r || s`).
pub const SIGNATURE_LEN: usize = 64;

/// Width of one P-256 scalar.
const SCALAR_LEN: usize = 32;

const DER_SEQUENCE: u8 = 0x30;
const DER_INTEGER: u8 = 0x02;

// =============================================================================
// Error Types
// =============================================================================

/// Reasons a private key is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyParseError {
    /// Key bytes are not UTF-8 text.
    #[error("private key is not valid UTF-8 text")]
    NotUtf8,

    /// No `-----BEGIN ...-----` / `-----END ...-----` pair was found.
    #[error("private key is missing PEM armour")]
    MissingPemArmour,

    /// PEM block is not PKCS#8 (e.g. SEC1 `EC PRIVATE KEY`).
    #[error("unsupported PEM label \"{0}\", expected \"PRIVATE KEY\" (PKCS#8)")]
    UnsupportedPemLabel(String),

    /// PEM body is not valid base64.
    #[error("private key body is not valid base64: {0}")]
    InvalidBase64(String),

    /// PKCS#8 document is malformed or not a P-256 ECDSA key.
    #[error("private key rejected: {0}")]
    Rejected(String),
}

/// Reasons a DER-encoded ECDSA signature cannot be converted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureFormatError {
    /// Input ends before a tag, length or value is complete.
    #[error("DER signature is truncated")]
    Truncated,

    /// Expected `SEQUENCE` or `INTEGER`, found another tag.
    #[error("unexpected DER tag 0x{0:02x}")]
    UnexpectedTag(u8),

    /// Length is in a form no ECDSA signature uses, or an integer is empty.
    #[error("invalid DER length encoding")]
    InvalidLength,

    /// `r` or `s` has more than 32 significant bytes.
    #[error("signature integer is wider than 32 bytes")]
    IntegerTooLarge,

    /// Bytes remain after the sequence or its second integer.
    #[error("trailing bytes after DER signature")]
    TrailingData,
}

// =============================================================================
// Signing Key
// =============================================================================

/// Parsed P-256 signing key.
pub struct SigningKey {
    key_pair: EcdsaKeyPair,
    rng: SystemRandom,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("algorithm", &"ES256")
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

impl SigningKey {
    /// Parse a PEM-encoded PKCS#8 P-256 private key.
    ///
    /// # Errors
    ///
    /// Returns a [`KeyParseError`] if the bytes are not UTF-8 PEM, the PEM
    /// label is not `PRIVATE KEY`, the body is not base64, or the PKCS#8
    /// document is not an ECDSA key on P-256.
    #[instrument(skip_all)]
    pub fn parse(pem: &[u8]) -> Result<Self, KeyParseError> {
        let text = std::str::from_utf8(pem).map_err(|_| KeyParseError::NotUtf8)?;
        let der = decode_pkcs8_pem(text)?;

        let rng = SystemRandom::new();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, der.expose_secret(), &rng)
                .map_err(|e| {
                    debug!(target: "asc_auth.signer", error = %e, "PKCS#8 key rejected");
                    KeyParseError::Rejected(e.to_string())
                })?;

        Ok(Self { key_pair, rng })
    }

    /// Sign `message` with ECDSA P-256 / SHA-256.
    ///
    /// The digest is computed by `ring`; the returned array is the fixed-width
    /// `r || s` form, each half big-endian and left-padded to 32 bytes.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Signing` if the primitive fails or yields a
    /// signature that cannot be converted.
    pub fn sign(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LEN], AuthError> {
        let signature = self.key_pair.sign(&self.rng, message).map_err(|e| {
            debug!(target: "asc_auth.signer", error = %e, "ECDSA signing failed");
            AuthError::Signing(format!("ECDSA signing failed: {e}"))
        })?;

        der_signature_to_fixed(signature.as_ref())
            .map_err(|e| AuthError::Signing(format!("Unexpected signature encoding: {e}")))
    }

    /// Uncompressed SEC1 public point (`0x04 || x || y`).
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        self.key_pair.public_key().as_ref()
    }
}

/// Strip PEM armour and decode the PKCS#8 body.
///
/// Text before the `BEGIN` line is ignored, as are blank lines and the
/// indentation some secret stores add.
fn decode_pkcs8_pem(text: &str) -> Result<SecretBox<[u8]>, KeyParseError> {
    let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());

    let label = lines
        .by_ref()
        .find_map(|line| {
            line.strip_prefix("-----BEGIN ")
                .and_then(|rest| rest.strip_suffix("-----"))
        })
        .ok_or(KeyParseError::MissingPemArmour)?;

    if label != PKCS8_PEM_LABEL {
        return Err(KeyParseError::UnsupportedPemLabel(label.to_string()));
    }

    let end_line = format!("-----END {label}-----");
    let mut body = String::new();
    let mut terminated = false;
    for line in lines {
        if line == end_line {
            terminated = true;
            break;
        }
        body.push_str(line);
    }

    if !terminated || body.is_empty() {
        return Err(KeyParseError::MissingPemArmour);
    }

    let der = STANDARD
        .decode(body.as_bytes())
        .map_err(|e| KeyParseError::InvalidBase64(e.to_string()))?;

    Ok(SecretBox::new(der.into_boxed_slice()))
}

// =============================================================================
// DER -> fixed-width conversion
// =============================================================================

/// Convert an ASN.1/DER ECDSA signature into the 64-byte JWS form.
///
/// Input is `SEQUENCE { INTEGER r, INTEGER s }`. DER integers are signed and
/// minimal, so each may carry a leading `0x00` (when the high bit is set) or
/// be shorter than 32 bytes; both are normalized to exactly 32 bytes.
///
/// # Errors
///
/// Returns a [`SignatureFormatError`] for wrong tags, bad lengths, integers
/// wider than 32 significant bytes, or trailing data.
pub fn der_signature_to_fixed(der: &[u8]) -> Result<[u8; SIGNATURE_LEN], SignatureFormatError> {
    let mut outer = DerReader::new(der);
    let sequence = outer.element(DER_SEQUENCE)?;
    outer.finish()?;

    let mut inner = DerReader::new(sequence);
    let r = inner.element(DER_INTEGER)?;
    let s = inner.element(DER_INTEGER)?;
    inner.finish()?;

    let mut fixed = [0u8; SIGNATURE_LEN];
    let (r_out, s_out) = fixed.split_at_mut(SCALAR_LEN);
    write_scalar(r, r_out)?;
    write_scalar(s, s_out)?;
    Ok(fixed)
}

/// Right-align a big-endian integer in `out`, dropping sign padding.
fn write_scalar(integer: &[u8], out: &mut [u8]) -> Result<(), SignatureFormatError> {
    if integer.is_empty() {
        return Err(SignatureFormatError::InvalidLength);
    }

    let mut digits = integer;
    while let Some((&0, rest)) = digits.split_first() {
        digits = rest;
    }

    let pad = out
        .len()
        .checked_sub(digits.len())
        .ok_or(SignatureFormatError::IntegerTooLarge)?;
    out.get_mut(pad..)
        .ok_or(SignatureFormatError::IntegerTooLarge)?
        .copy_from_slice(digits);
    Ok(())
}

/// Minimal DER reader, enough for an ECDSA signature.
struct DerReader<'a> {
    rest: &'a [u8],
}

impl<'a> DerReader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { rest: input }
    }

    fn byte(&mut self) -> Result<u8, SignatureFormatError> {
        let (&first, rest) = self
            .rest
            .split_first()
            .ok_or(SignatureFormatError::Truncated)?;
        self.rest = rest;
        Ok(first)
    }

    /// Short form, or the single-byte long form (`0x81 nn`, nn >= 0x80).
    fn length(&mut self) -> Result<usize, SignatureFormatError> {
        match self.byte()? {
            short @ 0x00..=0x7f => Ok(usize::from(short)),
            0x81 => match self.byte()? {
                long @ 0x80..=0xff => Ok(usize::from(long)),
                _ => Err(SignatureFormatError::InvalidLength),
            },
            _ => Err(SignatureFormatError::InvalidLength),
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], SignatureFormatError> {
        if len > self.rest.len() {
            return Err(SignatureFormatError::Truncated);
        }
        let (head, rest) = self.rest.split_at(len);
        self.rest = rest;
        Ok(head)
    }

    fn element(&mut self, tag: u8) -> Result<&'a [u8], SignatureFormatError> {
        let found = self.byte()?;
        if found != tag {
            return Err(SignatureFormatError::UnexpectedTag(found));
        }
        let len = self.length()?;
        self.take(len)
    }

    fn finish(&self) -> Result<(), SignatureFormatError> {
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(SignatureFormatError::TrailingData)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
