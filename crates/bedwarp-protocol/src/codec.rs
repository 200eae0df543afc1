//! The protocol version a listener speaks.
//!
//! A [`ProtocolCodec`] is chosen once when the listener starts and shared
//! read-only by every connection. It answers one question for the login
//! flow: does this client's protocol number match ours, and if not, which
//! side is behind?

use std::fmt;

use crate::ProtocolError;

/// An immutable protocol number plus the game version it corresponds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolCodec {
    protocol_version: i32,
    minecraft_version: &'static str,
}

impl ProtocolCodec {
    /// Bedrock 1.19.80.
    pub const V582: Self = Self::new(582, "1.19.80");

    pub const fn new(protocol_version: i32, minecraft_version: &'static str) -> Self {
        Self { protocol_version, minecraft_version }
    }

    pub fn protocol_version(&self) -> i32 {
        self.protocol_version
    }

    pub fn minecraft_version(&self) -> &'static str {
        self.minecraft_version
    }

    /// Compares a client's protocol number against ours.
    ///
    /// # Errors
    /// Returns [`ProtocolError::VersionMismatch`] when they differ. The
    /// caller decides what to do with it; the proxy only reports it.
    pub fn check_client(&self, client: i32) -> Result<(), ProtocolError> {
        if client == self.protocol_version {
            Ok(())
        } else {
            Err(ProtocolError::VersionMismatch { client, server: self.protocol_version })
        }
    }
}

impl Default for ProtocolCodec {
    fn default() -> Self {
        Self::V582
    }
}

impl fmt::Display for ProtocolCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (protocol {})", self.minecraft_version, self.protocol_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_1_19_80() {
        let codec = ProtocolCodec::default();
        assert_eq!(codec.protocol_version(), 582);
        assert_eq!(codec.minecraft_version(), "1.19.80");
        assert_eq!(codec.to_string(), "1.19.80 (protocol 582)");
    }

    #[test]
    fn test_check_client_matching() {
        assert!(ProtocolCodec::V582.check_client(582).is_ok());
    }

    #[test]
    fn test_check_client_newer() {
        let err = ProtocolCodec::V582.check_client(589).unwrap_err();
        assert!(err.client_is_newer());
        assert_eq!(err.to_string(), "protocol version mismatch: client 589, server 582");
    }

    #[test]
    fn test_check_client_older() {
        let err = ProtocolCodec::V582.check_client(575).unwrap_err();
        assert!(matches!(err, ProtocolError::VersionMismatch { client: 575, server: 582 }));
        assert!(!err.client_is_newer());
    }
}
