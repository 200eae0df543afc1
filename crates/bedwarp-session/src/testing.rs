//! Builders for login tokens that [`ChainAuthenticator`] accepts.
//!
//! Available under `cfg(test)` and the `test-util` feature.
//!
//! [`ChainAuthenticator`]: crate::ChainAuthenticator

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use p384::ecdsa::signature::Signer;
use p384::ecdsa::{Signature, SigningKey};
use p384::pkcs8::EncodePublicKey;
use serde_json::{json, Value};
use uuid::{Builder, Uuid};

use crate::jwt::BASE64_URL;

/// A fake client: a deterministic P-384 key plus profile claims.
pub struct TestIdentity {
    pub display_name: String,
    pub xuid: String,
    pub identity: Uuid,
    key: SigningKey,
}

/// A stable identity UUID derived from the profile, so the same name and
/// XUID always produce the same player.
fn identity_for(display_name: &str, xuid: &str) -> Uuid {
    let mut bytes = [0u8; 16];
    for (i, b) in display_name.bytes().chain([0]).chain(xuid.bytes()).enumerate() {
        let slot = &mut bytes[i % 16];
        *slot = slot.rotate_left(3) ^ b;
    }
    Builder::from_random_bytes(bytes).into_uuid()
}

impl TestIdentity {
    pub fn new(display_name: &str, xuid: &str) -> Self {
        Self::with_key_seed(display_name, xuid, 7)
    }

    /// Same as [`new`](Self::new) with a different key. `seed` must be
    /// non-zero.
    pub fn with_key_seed(display_name: &str, xuid: &str, seed: u8) -> Self {
        let key = match SigningKey::from_slice(&[seed; 48]) {
            Ok(key) => key,
            Err(e) => panic!("seed {seed} is not a valid P-384 scalar: {e}"),
        };
        Self {
            display_name: display_name.to_string(),
            xuid: xuid.to_string(),
            identity: identity_for(display_name, xuid),
            key,
        }
    }

    /// Base64 DER SubjectPublicKeyInfo, as it appears in
    /// `identityPublicKey`.
    pub fn public_key_base64(&self) -> String {
        match self.key.verifying_key().to_public_key_der() {
            Ok(der) => STANDARD.encode(der.as_bytes()),
            Err(e) => panic!("encoding test key: {e}"),
        }
    }

    pub fn extra_data(&self) -> Value {
        json!({
            "displayName": self.display_name,
            "XUID": self.xuid,
            "identity": self.identity.hyphenated().to_string(),
        })
    }

    /// A valid `(chain_data, skin_data)` pair for this client.
    pub fn login_tokens(&self) -> (String, String) {
        let chain = self.chain_with_claims(json!({
            "identityPublicKey": self.public_key_base64(),
            "extraData": self.extra_data(),
        }));
        let skin = self.sign(&json!({ "SkinId": "Standard_Custom", "ClientRandomId": 1 }));
        (chain, skin)
    }

    /// A chain document whose single token carries `claims`, signed by this
    /// client's key.
    pub fn chain_with_claims(&self, claims: Value) -> String {
        json!({ "chain": [self.sign(&claims)] }).to_string()
    }

    /// Signs `claims` as a compact ES384 JWS.
    pub fn sign(&self, claims: &Value) -> String {
        let header = json!({ "alg": "ES384", "x5u": self.public_key_base64() });
        let input = format!(
            "{}.{}",
            BASE64_URL.encode(header.to_string()),
            BASE64_URL.encode(claims.to_string()),
        );
        let signature: Signature = self.key.sign(input.as_bytes());
        format!("{input}.{}", BASE64_URL.encode(signature.to_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_stable_per_profile() {
        let a = TestIdentity::new("Steve", "1");
        let b = TestIdentity::with_key_seed("Steve", "1", 9);
        let c = TestIdentity::new("Alex", "1");

        assert_eq!(a.identity, b.identity);
        assert_ne!(a.identity, c.identity);
        assert_eq!(a.identity.get_version_num(), 4);
    }
}
