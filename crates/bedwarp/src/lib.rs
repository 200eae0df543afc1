//! # bedwarp
//!
//! A Bedrock login proxy. It listens where clients expect a server,
//! verifies each client's signed identity, walks it through the login and
//! resource pack exchange, and then transfers it to a backing server.
//!
//! The layers, bottom up:
//!
//! - [`bedwarp_transport`]: RakNet over UDP, behind the `Transport` and
//!   `Connection` traits.
//! - [`bedwarp_protocol`]: Bedrock batches and the packets the login
//!   sequence needs.
//! - [`bedwarp_session`]: identity verification, players, the registry.
//! - this crate: the per-connection state machine, the listener, and
//!   lifecycle.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bedwarp::prelude::*;
//!
//! # async fn run() -> Result<(), BedwarpError> {
//! let config = ServerConfig::builder().backend("127.0.0.1", 19133).build();
//! let proxy = ProxyServer::new(config).start().await?;
//! // ...
//! proxy.shutdown().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod hooks;
mod pool;
mod server;

pub use config::{BackendTarget, ServerConfig, ServerConfigBuilder, SessionTimeouts};
pub use error::BedwarpError;
pub use handler::reason;
pub use hooks::{LifecycleObserver, LoggingObserver};
pub use pool::{PoolError, WorkerPool};
pub use server::{ProxyHandle, ProxyServer};

pub use bedwarp_protocol;
pub use bedwarp_session;
pub use bedwarp_transport;

pub mod prelude {
    pub use crate::{
        reason, BackendTarget, BedwarpError, LifecycleObserver, LoggingObserver, ProxyHandle,
        ProxyServer, ServerConfig, SessionTimeouts,
    };
    pub use bedwarp_protocol::{ProtocolCodec, Visibility};
    pub use bedwarp_session::{
        AuthError, Authenticator, ChainAuthenticator, Identity, Player, PlayerId, SessionRegistry,
    };
    pub use bedwarp_transport::RakNetConfig;
}
