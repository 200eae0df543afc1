//! Error types for the protocol layer.
//!
//! A `ProtocolError` means the bytes themselves were wrong: truncated,
//! oversized, badly compressed, or carrying a value the packet does not
//! allow. Transport failures and identity problems live in their own
//! crates.

/// Errors that can occur while encoding or decoding game packets.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The buffer ended before the named field was complete.
    #[error("truncated {0}")]
    Truncated(&'static str),

    /// A variable-length integer ran past its maximum width.
    #[error("var-int is too long")]
    VarIntTooLong,

    /// A length-prefixed string was not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidString,

    /// A field carried a value the packet does not define.
    #[error("unknown {field} value {value}")]
    UnknownValue { field: &'static str, value: i64 },

    /// Inflating or deflating a batch failed.
    #[error("batch compression failed: {0}")]
    Compression(#[source] std::io::Error),

    /// A decompressed batch exceeded the configured limit.
    #[error("batch of {size} bytes exceeds limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    /// The packet id does not match the type being decoded.
    #[error("expected packet 0x{expected:02x}, got 0x{actual:02x}")]
    UnexpectedPacket { expected: u32, actual: u32 },

    /// The client speaks a different protocol version.
    ///
    /// Advisory: the proxy reports it to the client and keeps going.
    #[error("protocol version mismatch: client {client}, server {server}")]
    VersionMismatch { client: i32, server: i32 },
}

impl ProtocolError {
    /// Whether the client is newer than the server. Only meaningful for
    /// [`ProtocolError::VersionMismatch`].
    pub fn client_is_newer(&self) -> bool {
        matches!(self, Self::VersionMismatch { client, server } if client > server)
    }
}
