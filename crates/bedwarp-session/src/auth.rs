//! Identity verification for Bedrock logins.
//!
//! A login carries two documents. The chain data is JSON with a `chain`
//! array of signed tokens; the last one describes the client: its public
//! key (`identityPublicKey`) and profile claims (`extraData`). The skin
//! data is a separate token the client signs with that key. Verifying the
//! skin signature proves the client holds the key the chain names.
//!
//! [`Authenticator`] is the seam the proxy calls through;
//! [`ChainAuthenticator`] is the implementation that does the above.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use p384::ecdsa::VerifyingKey;
use p384::pkcs8::DecodePublicKey;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::jwt::CompactJws;
use crate::{AuthError, PlayerId};

/// The verified identity of a logging-in client.
#[derive(Clone)]
pub struct Identity {
    pub display_name: String,
    /// Xbox user id. Empty for offline clients.
    pub xuid: String,
    pub identity: Uuid,
    pub public_key: VerifyingKey,
}

impl Identity {
    /// The registry key for this client: the XUID when present,
    /// otherwise the identity UUID.
    pub fn player_id(&self) -> PlayerId {
        if self.xuid.is_empty() {
            PlayerId::new(self.identity.hyphenated().to_string())
        } else {
            PlayerId::new(self.xuid.clone())
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("display_name", &self.display_name)
            .field("xuid", &self.xuid)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// Verifies the identity documents of a login.
///
/// # Example
///
/// ```rust
/// use bedwarp_session::{AuthError, Authenticator, Identity};
///
/// /// Rejects everyone. Useful for putting a listener in maintenance.
/// struct Closed;
///
/// impl Authenticator for Closed {
///     async fn authenticate(
///         &self,
///         _chain_data: &str,
///         _skin_data: &str,
///     ) -> Result<Identity, AuthError> {
///         Err(AuthError::MalformedToken("listener closed".into()))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(
        &self,
        chain_data: &str,
        skin_data: &str,
    ) -> impl std::future::Future<Output = Result<Identity, AuthError>> + Send;
}

/// Verifies the client's self-signed chain and skin signature.
///
/// The chain's issuer signatures are not checked against a root key, so
/// this accepts offline clients as well as authenticated ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainAuthenticator;

impl ChainAuthenticator {
    /// Synchronous form of [`Authenticator::authenticate`].
    pub fn verify(&self, chain_data: &str, skin_data: &str) -> Result<Identity, AuthError> {
        let container: ChainContainer = serde_json::from_str(chain_data)
            .map_err(|e| AuthError::MalformedToken(format!("chain data: {e}")))?;
        let Some(last) = container.chain.last() else {
            return Err(AuthError::MalformedToken("chain is empty".into()));
        };
        let claims = CompactJws::parse(last)?.claims()?;

        let Some(Value::String(encoded_key)) = claims.get("identityPublicKey") else {
            return Err(AuthError::MissingIdentityKey);
        };
        let public_key = decode_public_key(encoded_key)?;

        // Any failure to even read the skin token is a verification failure.
        let skin = CompactJws::parse(skin_data).map_err(|_| AuthError::SignatureInvalid)?;
        skin.verify(&public_key)?;

        let extra = match claims.get("extraData") {
            Some(extra @ Value::Object(_)) => ExtraData::deserialize(extra)
                .map_err(|e| AuthError::MissingProfileClaims(e.to_string()))?,
            _ => return Err(AuthError::MissingProfileClaims("extraData is not an object".into())),
        };

        debug!(display_name = %extra.display_name, xuid = %extra.xuid, "identity verified");
        Ok(Identity {
            display_name: extra.display_name,
            xuid: extra.xuid,
            identity: extra.identity,
            public_key,
        })
    }
}

impl Authenticator for ChainAuthenticator {
    async fn authenticate(&self, chain_data: &str, skin_data: &str) -> Result<Identity, AuthError> {
        self.verify(chain_data, skin_data)
    }
}

#[derive(Deserialize)]
struct ChainContainer {
    chain: Vec<String>,
}

#[derive(Deserialize)]
struct ExtraData {
    #[serde(rename = "displayName")]
    display_name: String,
    #[serde(rename = "XUID", default)]
    xuid: String,
    identity: Uuid,
}

fn decode_public_key(encoded: &str) -> Result<VerifyingKey, AuthError> {
    let der = STANDARD
        .decode(encoded.trim())
        .map_err(|e| AuthError::InvalidIdentityKey(e.to_string()))?;
    VerifyingKey::from_public_key_der(&der).map_err(|e| AuthError::InvalidIdentityKey(e.to_string()))
}
