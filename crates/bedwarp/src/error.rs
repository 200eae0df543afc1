//! Unified error type for the proxy.

use std::time::Duration;

use bedwarp_protocol::packets::ResourcePackStatus;
use bedwarp_protocol::ProtocolError;
use bedwarp_session::AuthError;
use bedwarp_transport::TransportError;

use crate::PoolError;

/// Top-level error that wraps the errors of every layer.
///
/// The `#[from]` conversions let `?` lift sub-crate errors directly. A
/// connection handler that returns one of these has already told the
/// client whatever it is going to be told; the variant only feeds logs.
#[derive(Debug, thiserror::Error)]
pub enum BedwarpError {
    /// Binding, sending, or receiving failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The client sent bytes that are not a valid batch or packet.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The login's identity documents did not verify.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The worker pool could not run a task.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The client declined the (empty) resource pack offer.
    #[error("resource pack negotiation failed: client answered {0:?}")]
    ResourcePackRejected(ResourcePackStatus),

    /// The client sent nothing for the whole idle window of its state.
    #[error("idle for {timeout:?} while {state}")]
    Timeout { state: &'static str, timeout: Duration },

    /// A newer login with the same identity replaced this connection.
    #[error("logged in from another location")]
    Evicted,

    /// The proxy stopped while the connection was open.
    #[error("proxy is shutting down")]
    ShuttingDown,
}
