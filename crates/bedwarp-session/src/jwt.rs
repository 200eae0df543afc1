//! Compact JWS parsing and ES384 verification.
//!
//! Only the pieces the login flow needs: split a token into its three
//! segments, decode the payload, and check an ES384 signature over
//! `header.payload`.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use p384::ecdsa::signature::Verifier;
use p384::ecdsa::{Signature, VerifyingKey};
use serde_json::Value;

use crate::AuthError;

/// Base64url that accepts tokens with or without padding.
pub(crate) const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A token split into its segments. Borrowed from the input string.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CompactJws<'a> {
    signing_input: &'a str,
    payload: &'a str,
    signature: &'a str,
}

impl<'a> CompactJws<'a> {
    pub(crate) fn parse(token: &'a str) -> Result<Self, AuthError> {
        let mut parts = token.trim().splitn(3, '.');
        let (Some(header), Some(payload), Some(signature)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::MalformedToken("token does not have three segments".into()));
        };
        if header.is_empty() || payload.is_empty() || signature.contains('.') {
            return Err(AuthError::MalformedToken("token segments are malformed".into()));
        }
        let trimmed = token.trim();
        Ok(Self {
            signing_input: &trimmed[..header.len() + 1 + payload.len()],
            payload,
            signature,
        })
    }

    /// Decodes the payload segment as JSON.
    pub(crate) fn claims(&self) -> Result<Value, AuthError> {
        let raw = BASE64_URL
            .decode(self.payload)
            .map_err(|e| AuthError::MalformedToken(format!("payload is not base64url: {e}")))?;
        serde_json::from_slice(&raw)
            .map_err(|e| AuthError::MalformedToken(format!("payload is not JSON: {e}")))
    }

    /// Checks the ES384 signature against `key`. Any decoding problem
    /// with the signature counts as a failed verification.
    pub(crate) fn verify(&self, key: &VerifyingKey) -> Result<(), AuthError> {
        let raw = BASE64_URL
            .decode(self.signature)
            .map_err(|_| AuthError::SignatureInvalid)?;
        let signature = Signature::from_slice(&raw).map_err(|_| AuthError::SignatureInvalid)?;
        key.verify(self.signing_input.as_bytes(), &signature)
            .map_err(|_| AuthError::SignatureInvalid)
    }
}
