//! Proxy configuration.
//!
//! A [`ServerConfig`] is fixed once [`ProxyServer::start`] has been called.
//! Build one with [`ServerConfig::builder`] or start from
//! [`ServerConfig::default`] and overwrite fields.
//!
//! [`ProxyServer::start`]: crate::ProxyServer::start

use std::fmt;
use std::time::Duration;

use bedwarp_protocol::{ProtocolCodec, Visibility};
use bedwarp_transport::RakNetConfig;

/// Where authenticated clients are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    pub address: String,
    pub port: u16,
}

impl BackendTarget {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self { address: address.into(), port }
    }
}

impl Default for BackendTarget {
    fn default() -> Self {
        Self::new("127.0.0.1", 19133)
    }
}

impl fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// How long a connection may stay silent in each login state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    /// Until the login packet arrives.
    pub login: Duration,
    /// Until the client answers the resource pack offer.
    pub resource_packs: Duration,
    /// Until the client reports its local player as spawned.
    pub initialized: Duration,
    /// After the transfer, until the client leaves on its own.
    pub forwarded: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            login: Duration::from_secs(10),
            resource_packs: Duration::from_secs(30),
            initialized: Duration::from_secs(30),
            forwarded: Duration::from_secs(10),
        }
    }
}

/// Everything the proxy needs to run.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub bind_port: u16,
    /// First line of the server list entry.
    pub motd: String,
    /// Second line of the server list entry.
    pub sub_motd: String,
    pub max_players: u32,
    pub codec: ProtocolCodec,
    /// Game mode label shown in the server list.
    pub game_mode: String,
    pub backend: BackendTarget,
    /// Concurrent identity verifications.
    pub worker_threads: usize,
    pub timeouts: SessionTimeouts,
    pub keep_alive_period: Duration,
    /// How long shutdown waits for sessions and pool tasks before
    /// aborting them.
    pub shutdown_grace: Duration,
    pub raknet: RakNetConfig,
    /// What packet traces may show of login tokens.
    pub packet_visibility: Visibility,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            bind_port: 19132,
            motd: "bedwarp".to_string(),
            sub_motd: "bedwarp".to_string(),
            max_players: 1337,
            codec: ProtocolCodec::V582,
            game_mode: "Survival".to_string(),
            backend: BackendTarget::default(),
            worker_threads: 32,
            timeouts: SessionTimeouts::default(),
            keep_alive_period: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(5),
            raknet: RakNetConfig::default(),
            packet_visibility: Visibility::Redacted,
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }

    /// `address:port` for the UDP bind. IPv6 literals are bracketed.
    pub fn bind_addr(&self) -> String {
        if self.bind_address.contains(':') && !self.bind_address.starts_with('[') {
            format!("[{}]:{}", self.bind_address, self.bind_port)
        } else {
            format!("{}:{}", self.bind_address, self.bind_port)
        }
    }
}

/// Builder for [`ServerConfig`].
///
/// # Example
///
/// ```rust
/// use bedwarp::ServerConfig;
///
/// let config = ServerConfig::builder()
///     .bind("127.0.0.1", 19132)
///     .motd("Lobby")
///     .backend("play.example.net", 19132)
///     .build();
/// assert_eq!(config.bind_addr(), "127.0.0.1:19132");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the address and port to listen on.
    pub fn bind(mut self, address: &str, port: u16) -> Self {
        self.config.bind_address = address.to_string();
        self.config.bind_port = port;
        self
    }

    pub fn motd(mut self, motd: impl Into<String>) -> Self {
        self.config.motd = motd.into();
        self
    }

    pub fn sub_motd(mut self, sub_motd: impl Into<String>) -> Self {
        self.config.sub_motd = sub_motd.into();
        self
    }

    pub fn max_players(mut self, max_players: u32) -> Self {
        self.config.max_players = max_players;
        self
    }

    pub fn codec(mut self, codec: ProtocolCodec) -> Self {
        self.config.codec = codec;
        self
    }

    pub fn game_mode(mut self, game_mode: impl Into<String>) -> Self {
        self.config.game_mode = game_mode.into();
        self
    }

    /// Sets the server clients are transferred to.
    pub fn backend(mut self, address: impl Into<String>, port: u16) -> Self {
        self.config.backend = BackendTarget::new(address, port);
        self
    }

    /// Sets the worker pool size. Zero is raised to one.
    pub fn worker_threads(mut self, workers: usize) -> Self {
        self.config.worker_threads = workers.max(1);
        self
    }

    pub fn timeouts(mut self, timeouts: SessionTimeouts) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    pub fn keep_alive_period(mut self, period: Duration) -> Self {
        self.config.keep_alive_period = period;
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.shutdown_grace = grace;
        self
    }

    pub fn raknet(mut self, raknet: RakNetConfig) -> Self {
        self.config.raknet = raknet;
        self
    }

    pub fn packet_visibility(mut self, visibility: Visibility) -> Self {
        self.config.packet_visibility = visibility;
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}
