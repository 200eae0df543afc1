//! `ProxyServer` startup, the accept loop, and shutdown.
//!
//! This is the entry point for running the proxy. It ties the layers
//! together: RakNet transport → per-connection handler → session registry.
//! [`ProxyServer::start`] binds the listener and returns a [`ProxyHandle`];
//! nothing is global, so several proxies can run in one process on
//! different ports.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bedwarp_session::{Authenticator, ChainAuthenticator, SessionRegistry};
use bedwarp_tick::{Ticker, TickerConfig};
use bedwarp_transport::{
    Connection, ListenerEvents, Pong, RakNetTransport, Transport, TransportError,
};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, trace, warn};

use crate::handler::handle_connection;
use crate::{BedwarpError, LifecycleObserver, ServerConfig, WorkerPool};

/// Shared state passed to each connection handler task.
pub(crate) struct ProxyState<A> {
    pub(crate) config: ServerConfig,
    pub(crate) auth: Arc<A>,
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) pool: Arc<WorkerPool>,
    /// Flips to `true` once shutdown starts.
    pub(crate) shutdown: watch::Receiver<bool>,
}

impl<A: Authenticator> ProxyState<A> {
    pub(crate) fn new(
        config: ServerConfig,
        auth: A,
        registry: Arc<SessionRegistry>,
        pool: Arc<WorkerPool>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self { config, auth: Arc::new(auth), registry, pool, shutdown }
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Answers the listener's offline callbacks.
struct Advertiser {
    pong: Pong,
    registry: Arc<SessionRegistry>,
    shutting_down: Arc<AtomicBool>,
}

impl Advertiser {
    fn new(config: &ServerConfig, registry: Arc<SessionRegistry>, shutting_down: Arc<AtomicBool>) -> Self {
        let pong = Pong {
            motd: config.motd.clone(),
            sub_motd: config.sub_motd.clone(),
            protocol_version: u32::try_from(config.codec.protocol_version()).unwrap_or_default(),
            version: config.codec.minecraft_version().to_string(),
            max_player_count: config.max_players,
            game_type: config.game_mode.clone(),
            ipv4_port: config.bind_port,
            ..Pong::default()
        };
        Self { pong, registry, shutting_down }
    }
}

impl ListenerEvents for Advertiser {
    fn on_connection_request(&self, addr: SocketAddr) -> bool {
        let accept = !self.shutting_down.load(Ordering::Acquire);
        if !accept {
            debug!(%addr, "refusing connection during shutdown");
        }
        accept
    }

    fn on_query(&self, _addr: SocketAddr) -> Option<Pong> {
        let player_count = u32::try_from(self.registry.len()).unwrap_or(u32::MAX);
        Some(Pong { player_count, ..self.pong.clone() })
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A configured, not yet started proxy.
///
/// # Example
///
/// ```rust,no_run
/// use bedwarp::prelude::*;
///
/// # async fn run() -> Result<(), BedwarpError> {
/// let config = ServerConfig::builder()
///     .bind("0.0.0.0", 19132)
///     .backend("play.example.net", 19132)
///     .build();
/// let proxy = ProxyServer::new(config).observer(LoggingObserver).start().await?;
/// tokio::signal::ctrl_c().await.ok();
/// proxy.shutdown().await
/// # }
/// ```
pub struct ProxyServer<A: Authenticator = ChainAuthenticator> {
    config: ServerConfig,
    auth: A,
    observers: Vec<Arc<dyn LifecycleObserver>>,
}

impl ProxyServer {
    /// A proxy that verifies logins with [`ChainAuthenticator`].
    pub fn new(config: ServerConfig) -> Self {
        Self { config, auth: ChainAuthenticator, observers: Vec::new() }
    }
}

impl<A: Authenticator> ProxyServer<A> {
    /// Replaces the login verifier.
    pub fn authenticator<B: Authenticator>(self, auth: B) -> ProxyServer<B> {
        ProxyServer { config: self.config, auth, observers: self.observers }
    }

    /// Adds a lifecycle observer.
    pub fn observer(mut self, observer: impl LifecycleObserver) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the listener and starts accepting sessions.
    ///
    /// # Errors
    /// Fails with [`TransportError::Bind`] if the address is taken (for
    /// instance by a proxy already started on the same port). Observers
    /// are told through `on_started(true)` first.
    pub async fn start(self) -> Result<ProxyHandle, BedwarpError> {
        let ProxyServer { config, auth, observers } = self;
        info!(bind = %config.bind_addr(), codec = %config.codec, "starting proxy");

        let registry = Arc::new(SessionRegistry::new());
        let shutting_down = Arc::new(AtomicBool::new(false));
        let events = Arc::new(Advertiser::new(&config, Arc::clone(&registry), Arc::clone(&shutting_down)));

        let transport =
            match RakNetTransport::bind_with(&config.bind_addr(), events, config.raknet.clone()).await {
                Ok(transport) => transport,
                Err(e) => {
                    error!(bind = %config.bind_addr(), error = %e, "failed to bind listener");
                    for observer in &observers {
                        observer.on_started(true);
                    }
                    return Err(e.into());
                }
            };
        let local_addr = transport.local_addr();
        let guid = transport.guid();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pool = Arc::new(WorkerPool::new(config.worker_threads));
        let grace = config.shutdown_grace;
        let ticker = Ticker::new(TickerConfig::every(config.keep_alive_period));
        let backend = config.backend.clone();

        let state = Arc::new(ProxyState::new(
            config,
            auth,
            Arc::clone(&registry),
            Arc::clone(&pool),
            shutdown_rx.clone(),
        ));

        let accept = tokio::spawn(accept_loop(transport, state, Arc::clone(&shutting_down)));
        let keep_alive = tokio::spawn(keep_alive(ticker, Arc::clone(&registry), shutdown_rx));

        info!(%local_addr, %backend, "proxy listening");
        for observer in &observers {
            observer.on_started(false);
        }

        Ok(ProxyHandle {
            local_addr,
            guid,
            registry,
            pool,
            shutting_down,
            shutdown_tx,
            grace,
            accept: Some(accept),
            keep_alive: Some(keep_alive),
            observers,
        })
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A running proxy.
///
/// Dropping the handle stops the listener and every session without
/// waiting; [`shutdown`](Self::shutdown) does the same in order and waits.
pub struct ProxyHandle {
    local_addr: SocketAddr,
    guid: u64,
    registry: Arc<SessionRegistry>,
    pool: Arc<WorkerPool>,
    shutting_down: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    grace: std::time::Duration,
    accept: Option<JoinHandle<(RakNetTransport, JoinSet<()>)>>,
    keep_alive: Option<JoinHandle<()>>,
    observers: Vec<Arc<dyn LifecycleObserver>>,
}

impl ProxyHandle {
    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The server GUID in discovery replies.
    pub fn guid(&self) -> u64 {
        self.guid
    }

    /// Players that are logged in right now.
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn pool(&self) -> Arc<WorkerPool> {
        Arc::clone(&self.pool)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Stops the proxy.
    ///
    /// In order: stop accepting sessions, shut the worker pool down, let
    /// open sessions say goodbye (aborting them after the grace period),
    /// close the socket, clear the registry, and notify observers.
    pub async fn shutdown(mut self) -> Result<(), BedwarpError> {
        self.shutting_down.store(true, Ordering::Release);
        self.shutdown_tx.send_replace(true);
        info!(players = self.registry.len(), "proxy shutting down");

        let accepted = match self.accept.take() {
            Some(accept) => match accept.await {
                Ok(accepted) => Some(accepted),
                Err(e) => {
                    error!(error = %e, "accept loop failed");
                    None
                }
            },
            None => None,
        };

        self.pool.shutdown(self.grace).await;

        let mut result = Ok(());
        if let Some((transport, mut sessions)) = accepted {
            let drained = tokio::time::timeout(self.grace, async {
                while sessions.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                warn!(remaining = sessions.len(), "sessions outlived the grace period, aborting");
                sessions.shutdown().await;
            }
            result = transport.shutdown().await.map_err(BedwarpError::from);
        }

        if let Some(keep_alive) = self.keep_alive.take() {
            if let Err(e) = keep_alive.await {
                debug!(error = %e, "keep-alive task failed");
            }
        }

        let removed = self.registry.clear();
        for observer in &self.observers {
            observer.on_disable();
        }
        info!(removed = removed.len(), "proxy stopped");
        result
    }
}

impl Drop for ProxyHandle {
    fn drop(&mut self) {
        self.shutting_down.store(true, Ordering::Release);
        self.shutdown_tx.send_replace(true);
    }
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

/// Resolves once the shutdown flag is set or its sender is gone.
///
/// The borrow `wait_for` hands back is not `Send`, so it is dropped here
/// rather than surfacing in a `select!` output.
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Accepts sessions until shutdown, spawning a handler for each.
///
/// Returns the transport and the still-running sessions so shutdown can
/// drain them before the socket goes away.
async fn accept_loop<A: Authenticator>(
    mut transport: RakNetTransport,
    state: Arc<ProxyState<A>>,
    shutting_down: Arc<AtomicBool>,
) -> (RakNetTransport, JoinSet<()>) {
    let mut sessions = JoinSet::new();
    let mut shutdown = state.shutdown.clone();

    loop {
        tokio::select! {
            _ = stopped(&mut shutdown) => break,
            Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = finished {
                    if e.is_panic() {
                        error!(error = %e, "connection handler panicked");
                    }
                }
            }
            accepted = transport.accept() => match accepted {
                Ok(conn) => {
                    let conn_id = conn.id();
                    if shutting_down.load(Ordering::Acquire) {
                        debug!(%conn_id, "dropping session accepted during shutdown");
                        if let Err(e) = conn.close().await {
                            trace!(%conn_id, error = %e, "close failed");
                        }
                        continue;
                    }
                    let state = Arc::clone(&state);
                    sessions.spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            debug!(%conn_id, error = %e, "connection ended with error");
                        }
                    });
                }
                Err(TransportError::Shutdown) => break,
                Err(e) => error!(error = %e, "accept failed"),
            },
        }
    }

    debug!(open = sessions.len(), "accept loop stopped");
    (transport, sessions)
}

/// Logs the player count once per period until shutdown.
async fn keep_alive(
    mut ticker: Ticker,
    registry: Arc<SessionRegistry>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = stopped(&mut shutdown) => break,
            tick = ticker.wait_for_tick() => {
                trace!(tick = tick.count, players = registry.len(), "keep-alive");
                ticker.record_tick_end();
            }
        }
    }
    debug!(ticks = ticker.tick_count(), "keep-alive stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[derive(Default)]
    struct Counting {
        started: AtomicUsize,
        failed: AtomicUsize,
        disabled: AtomicUsize,
    }

    impl LifecycleObserver for Arc<Counting> {
        fn on_started(&self, failed: bool) {
            if failed {
                self.failed.fetch_add(1, Ordering::SeqCst);
            } else {
                self.started.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn on_disable(&self) {
            self.disabled.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn local() -> ServerConfig {
        ServerConfig::builder().bind("127.0.0.1", 0).build()
    }

    #[test]
    fn test_advertiser_reports_live_player_count() {
        let registry = Arc::new(SessionRegistry::new());
        let config = ServerConfig::builder().motd("Lobby").max_players(20).build();
        let advertiser = Advertiser::new(&config, registry, Arc::new(AtomicBool::new(false)));

        let pong = advertiser.on_query("127.0.0.1:1".parse().unwrap()).unwrap();

        assert_eq!(pong.motd, "Lobby");
        assert_eq!(pong.protocol_version, 582);
        assert_eq!(pong.version, "1.19.80");
        assert_eq!(pong.player_count, 0);
        assert_eq!(pong.max_player_count, 20);
        assert_eq!(pong.game_type, "Survival");
        assert_eq!(pong.ipv4_port, 19132);
    }

    #[test]
    fn test_advertiser_refuses_during_shutdown() {
        let shutting_down = Arc::new(AtomicBool::new(false));
        let advertiser = Advertiser::new(
            &ServerConfig::default(),
            Arc::new(SessionRegistry::new()),
            Arc::clone(&shutting_down),
        );
        let addr = "127.0.0.1:1".parse().unwrap();

        assert!(advertiser.on_connection_request(addr));
        shutting_down.store(true, Ordering::Release);
        assert!(!advertiser.on_connection_request(addr));
    }

    #[tokio::test]
    async fn test_start_and_shutdown_notify_observers() {
        let counting = Arc::new(Counting::default());
        let handle = ProxyServer::new(local())
            .observer(Arc::clone(&counting))
            .start()
            .await
            .unwrap();
        assert_ne!(handle.local_addr().port(), 0);
        assert_eq!(counting.started.load(Ordering::SeqCst), 1);

        let pool = handle.pool();
        handle.shutdown().await.unwrap();

        assert!(pool.is_terminated());
        assert_eq!(counting.disabled.load(Ordering::SeqCst), 1);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_accept_loop_is_send_and_stops_on_signal() {
        let config = local();
        let registry = Arc::new(SessionRegistry::new());
        let shutting_down = Arc::new(AtomicBool::new(false));
        let events = Arc::new(Advertiser::new(&config, Arc::clone(&registry), Arc::clone(&shutting_down)));
        let transport = RakNetTransport::bind_with(&config.bind_addr(), events, config.raknet.clone())
            .await
            .unwrap();
        let (stop, stop_rx) = watch::channel(false);
        let state = Arc::new(ProxyState::new(
            config,
            ChainAuthenticator,
            registry,
            Arc::new(WorkerPool::new(1)),
            stop_rx,
        ));

        let accept = accept_loop(transport, state, Arc::clone(&shutting_down));
        assert_send(&accept);
        let accept = tokio::spawn(accept);

        shutting_down.store(true, Ordering::Release);
        stop.send_replace(true);
        let (transport, sessions) = accept.await.unwrap();

        assert!(sessions.is_empty());
        transport.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_stopped_resolves_when_sender_dropped() {
        let (stop, mut stop_rx) = watch::channel(false);
        drop(stop);
        tokio::time::timeout(std::time::Duration::from_secs(1), stopped(&mut stop_rx))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_second_start_on_same_port_fails() {
        let first = ProxyServer::new(local()).start().await.unwrap();
        let port = first.local_addr().port();

        let counting = Arc::new(Counting::default());
        let second = ProxyServer::new(ServerConfig::builder().bind("127.0.0.1", port).build())
            .observer(Arc::clone(&counting))
            .start()
            .await;

        assert!(matches!(second, Err(BedwarpError::Transport(TransportError::Bind { .. }))));
        assert_eq!(counting.failed.load(Ordering::SeqCst), 1);
        first.shutdown().await.unwrap();
    }
}
