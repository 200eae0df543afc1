//! Error types for identity verification.

/// Why a login's identity could not be verified.
///
/// The client never sees these: every variant ends in the same generic
/// disconnect message. They exist for the server log.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The chain container or one of its tokens could not be parsed.
    #[error("malformed identity token: {0}")]
    MalformedToken(String),

    /// The last chain token has no string `identityPublicKey` claim.
    #[error("identity token has no identityPublicKey claim")]
    MissingIdentityKey,

    /// `identityPublicKey` is present but is not a P-384 public key.
    #[error("identityPublicKey is not a valid P-384 key: {0}")]
    InvalidIdentityKey(String),

    /// The skin token's signature does not verify against the identity key.
    #[error("skin data signature is invalid")]
    SignatureInvalid,

    /// The identity token has no usable `extraData` object.
    #[error("identity token has no extraData profile claims: {0}")]
    MissingProfileClaims(String),
}
