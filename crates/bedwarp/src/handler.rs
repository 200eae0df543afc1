//! Per-connection handler: login, resource packs, and handoff.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. RequestNetworkSettings → NetworkSettings, compression on
//!   2. Login → verify identity → register player → LoginSuccess + pack info
//!   3. Resource pack responses → pack stack, then StartGame + PlayerSpawn
//!   4. SetLocalPlayerAsInitialized → Transfer to the backing server
//!
//! Every wait is bounded by the idle timeout of the current state. Packets
//! that arrive in the wrong state are ignored.

use std::sync::Arc;
use std::time::Duration;

use bedwarp_protocol::packets::{
    Disconnect, Login, NetworkSettings, PlayStatus, PlayStatusKind, ResourcePackClientResponse,
    ResourcePackStack, ResourcePackStatus, ResourcePacksInfo, StartGame, Transfer,
};
use bedwarp_protocol::{decode_batch, encode_batch, Compression, InboundPacket, OutboundPacket};
use bedwarp_session::{Authenticator, Player, SessionHandle, SessionRegistry};
use bedwarp_transport::{Connection, ConnectionId, TransportError};
use tracing::{debug, info, trace, warn};

use crate::config::SessionTimeouts;
use crate::server::{stopped, ProxyState};
use crate::BedwarpError;

/// Disconnect message keys. The client translates them.
pub mod reason {
    pub const CANT_CONNECT: &str = "disconnectionScreen.internalError.cantConnect";
    pub const RESOURCE_PACK: &str = "disconnectionScreen.resourcePack";
    pub const TIMEOUT: &str = "disconnectionScreen.timeout";
    pub const LOGGED_IN_ELSEWHERE: &str = "disconnectionScreen.loggedinOtherLocation";
    pub const SERVER_CLOSED: &str = "disconnectionScreen.serverClosed";
}

/// Where a connection is in the login sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoginState {
    AwaitingLogin,
    AwaitingResourcePackResponse,
    Initialized,
    /// Terminal: the client has been told to reconnect elsewhere.
    Forwarded,
}

impl LoginState {
    fn name(self) -> &'static str {
        match self {
            Self::AwaitingLogin => "awaiting login",
            Self::AwaitingResourcePackResponse => "awaiting resource pack response",
            Self::Initialized => "initialized",
            Self::Forwarded => "forwarded",
        }
    }

    fn idle_timeout(self, timeouts: &SessionTimeouts) -> Duration {
        match self {
            Self::AwaitingLogin => timeouts.login,
            Self::AwaitingResourcePackResponse => timeouts.resource_packs,
            Self::Initialized => timeouts.initialized,
            Self::Forwarded => timeouts.forwarded,
        }
    }
}

/// Removes the player from the registry when the handler exits, panics
/// included. Only the entry this connection owns is touched.
struct Registration {
    registry: Arc<SessionRegistry>,
    player: Arc<Player>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let conn_id = self.player.session().conn_id();
        if self.registry.remove_session(self.player.id(), conn_id).is_some() {
            debug!(%conn_id, player_id = %self.player.id(), "registration removed");
        }
    }
}

/// What woke the handler up.
enum Event {
    Payload(Vec<u8>),
    Closed,
    Idle,
    Evicted,
    ShuttingDown,
}

struct LoginSession<'a, C, A: Authenticator> {
    conn: &'a C,
    state: &'a ProxyState<A>,
    conn_id: ConnectionId,
    phase: LoginState,
    compression: Compression,
    version_reported: bool,
    registration: Option<Registration>,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C, A>(
    conn: C,
    state: Arc<ProxyState<A>>,
) -> Result<(), BedwarpError>
where
    C: Connection<Error = TransportError>,
    A: Authenticator,
{
    let conn_id = conn.id();
    debug!(%conn_id, peer = %conn.peer_addr(), "handling new connection");

    let mut session = LoginSession {
        conn: &conn,
        state: &state,
        conn_id,
        phase: LoginState::AwaitingLogin,
        compression: Compression::None,
        version_reported: false,
        registration: None,
    };
    let result = session.run().await;

    if let Some(registration) = session.registration.take() {
        let player = &registration.player;
        let reason = match &result {
            Ok(()) => "client disconnected".to_string(),
            Err(e) => e.to_string(),
        };
        info!(
            %conn_id,
            player_id = %player.id(),
            reason = %reason,
            "{} has disconnected",
            player.display_name()
        );
        // Registration drops here.
    }

    if let Err(e) = conn.close().await {
        trace!(%conn_id, error = %e, "close failed");
    }
    result
}

impl<C, A> LoginSession<'_, C, A>
where
    C: Connection<Error = TransportError>,
    A: Authenticator,
{
    async fn run(&mut self) -> Result<(), BedwarpError> {
        let mut shutdown = self.state.shutdown.clone();

        loop {
            let idle = self.phase.idle_timeout(&self.state.config.timeouts);
            let player = self.registration.as_ref().map(|r| Arc::clone(&r.player));

            let event = tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => Event::ShuttingDown,
                _ = evicted(player.as_deref()) => Event::Evicted,
                received = tokio::time::timeout(idle, self.conn.recv()) => match received {
                    Ok(Ok(Some(data))) => Event::Payload(data),
                    Ok(Ok(None)) => Event::Closed,
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => Event::Idle,
                },
            };

            match event {
                Event::Payload(data) => self.on_payload(&data).await?,
                Event::Closed => {
                    debug!(conn_id = %self.conn_id, state = self.phase.name(), "connection closed by peer");
                    return Ok(());
                }
                Event::Idle => {
                    info!(conn_id = %self.conn_id, state = self.phase.name(), ?idle, "connection timed out");
                    if self.phase != LoginState::Forwarded {
                        self.disconnect(reason::TIMEOUT).await;
                    }
                    return Err(BedwarpError::Timeout { state: self.phase.name(), timeout: idle });
                }
                Event::Evicted => {
                    self.disconnect(reason::LOGGED_IN_ELSEWHERE).await;
                    return Err(BedwarpError::Evicted);
                }
                Event::ShuttingDown => {
                    self.disconnect(reason::SERVER_CLOSED).await;
                    return Err(BedwarpError::ShuttingDown);
                }
            }
        }
    }

    async fn on_payload(&mut self, data: &[u8]) -> Result<(), BedwarpError> {
        let packets = match decode_batch(data, self.compression) {
            Ok(packets) => packets,
            Err(e) => {
                debug!(conn_id = %self.conn_id, error = %e, "failed to decode batch");
                return Ok(());
            }
        };

        for raw in packets {
            let packet = match InboundPacket::decode(raw) {
                Ok(packet) => packet,
                Err(e) => {
                    debug!(conn_id = %self.conn_id, error = %e, "failed to decode packet");
                    continue;
                }
            };
            trace!(
                conn_id = %self.conn_id,
                packet = %packet.summary(self.state.config.packet_visibility),
                "received"
            );
            self.dispatch(packet).await?;
        }
        Ok(())
    }

    async fn dispatch(&mut self, packet: InboundPacket) -> Result<(), BedwarpError> {
        match (self.phase, packet) {
            (LoginState::AwaitingLogin, InboundPacket::RequestNetworkSettings(request))
                if !self.compression.is_enabled() =>
            {
                self.report_version(request.protocol_version).await?;
                self.send(&[NetworkSettings::default().into()]).await?;
                self.compression = Compression::deflate();
                debug!(conn_id = %self.conn_id, "compression enabled");
            }
            (LoginState::AwaitingLogin, InboundPacket::Login(login)) => self.login(login).await?,
            (LoginState::AwaitingResourcePackResponse, InboundPacket::ResourcePackClientResponse(response)) => {
                self.resource_pack_response(response).await?;
            }
            (LoginState::Initialized, InboundPacket::SetLocalPlayerAsInitialized(_)) => {
                self.hand_off().await?;
            }
            (_, InboundPacket::Unhandled { id }) => {
                trace!(conn_id = %self.conn_id, id, "ignoring unhandled packet");
            }
            (phase, packet) => {
                debug!(
                    conn_id = %self.conn_id,
                    state = phase.name(),
                    packet = packet.name(),
                    "ignoring packet out of sequence"
                );
            }
        }
        Ok(())
    }

    /// Tells a client on another protocol version which side is behind.
    /// Advisory and sent at most once; the login carries on regardless.
    async fn report_version(&mut self, client_version: i32) -> Result<(), BedwarpError> {
        let Err(mismatch) = self.state.config.codec.check_client(client_version) else {
            return Ok(());
        };
        if self.version_reported {
            return Ok(());
        }
        self.version_reported = true;

        let status = if mismatch.client_is_newer() {
            PlayStatusKind::LoginFailedServer
        } else {
            PlayStatusKind::LoginFailedClient
        };
        warn!(conn_id = %self.conn_id, error = %mismatch, "client on a different protocol");
        self.send(&[PlayStatus { status }.into()]).await
    }

    async fn login(&mut self, login: Login) -> Result<(), BedwarpError> {
        self.report_version(login.protocol_version).await?;

        let Login { chain_data, skin_data, .. } = login;
        let auth = Arc::clone(&self.state.auth);
        let verified = self
            .state
            .pool
            .run(async move { auth.authenticate(&chain_data, &skin_data).await })
            .await;

        let identity = match verified {
            Ok(Ok(identity)) => identity,
            Ok(Err(e)) => {
                warn!(conn_id = %self.conn_id, error = %e, "login rejected");
                self.disconnect(reason::CANT_CONNECT).await;
                return Err(e.into());
            }
            Err(e) => {
                warn!(conn_id = %self.conn_id, error = %e, "login could not be verified");
                self.disconnect(reason::CANT_CONNECT).await;
                return Err(e.into());
            }
        };

        let handle = SessionHandle::new(self.conn_id, self.conn.peer_addr());
        let player = Arc::new(Player::new(identity, handle));
        if let Some(previous) = self.state.registry.insert(Arc::clone(&player)) {
            previous.session().evict();
        }
        self.registration = Some(Registration {
            registry: Arc::clone(&self.state.registry),
            player: Arc::clone(&player),
        });
        debug!(conn_id = %self.conn_id, player_id = %player.id(), "player registered");

        self.send(&[
            PlayStatus { status: PlayStatusKind::LoginSuccess }.into(),
            ResourcePacksInfo::default().into(),
        ])
        .await?;
        self.phase = LoginState::AwaitingResourcePackResponse;
        Ok(())
    }

    async fn resource_pack_response(
        &mut self,
        response: ResourcePackClientResponse,
    ) -> Result<(), BedwarpError> {
        match response.status {
            ResourcePackStatus::HaveAllPacks => {
                self.send(&[ResourcePackStack::default().into()]).await
            }
            ResourcePackStatus::Completed => {
                if let Some(Registration { player, .. }) = &self.registration {
                    info!(
                        conn_id = %self.conn_id,
                        "Logged in {} ({}, {})",
                        player.display_name(),
                        player.xuid(),
                        player.identity()
                    );
                }
                self.send(&[self.start_game().into(), PlayStatus { status: PlayStatusKind::PlayerSpawn }.into()])
                    .await?;
                self.phase = LoginState::Initialized;
                Ok(())
            }
            other => {
                info!(conn_id = %self.conn_id, status = ?other, "resource packs refused");
                self.disconnect(reason::RESOURCE_PACK).await;
                Err(BedwarpError::ResourcePackRejected(other))
            }
        }
    }

    /// Points the client at the backing server.
    async fn hand_off(&mut self) -> Result<(), BedwarpError> {
        let backend = &self.state.config.backend;
        if let Some(Registration { player, .. }) = &self.registration {
            info!(
                conn_id = %self.conn_id,
                player_id = %player.id(),
                %backend,
                "transferring {}",
                player.display_name()
            );
        }
        self.send(&[Transfer { address: backend.address.clone(), port: backend.port }.into()])
            .await?;
        self.phase = LoginState::Forwarded;
        Ok(())
    }

    /// A minimal survival world around the spawn point.
    fn start_game(&self) -> StartGame {
        let entity = self.conn_id.into_inner();
        StartGame {
            entity_id: entity as i64,
            runtime_entity_id: entity,
            player_game_mode: 0,
            position: [0.0, 69.0, 0.0],
            pitch: 0.0,
            yaw: 0.0,
            seed: 0,
            dimension: 0,
            generator: 1,
            world_game_mode: 0,
            difficulty: 1,
            spawn_block: [0, 69, 0],
            level_id: String::new(),
            world_name: self.state.config.motd.clone(),
            game_version: self.state.config.codec.minecraft_version().to_string(),
        }
    }

    async fn send(&self, packets: &[OutboundPacket]) -> Result<(), BedwarpError> {
        for packet in packets {
            trace!(conn_id = %self.conn_id, packet = packet.name(), "sending");
        }
        let batch = encode_batch(packets.iter().map(OutboundPacket::encode), self.compression)?;
        self.conn.send(&batch).await?;
        Ok(())
    }

    /// Best effort: the connection may already be gone.
    async fn disconnect(&self, message: &str) {
        if let Err(e) = self.send(&[Disconnect::with_message(message).into()]).await {
            trace!(conn_id = %self.conn_id, error = %e, "disconnect message not delivered");
        }
    }
}

/// Completes when `player` is evicted. Pends forever before login.
async fn evicted(player: Option<&Player>) {
    match player {
        Some(player) => player.session().evicted().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use bedwarp_protocol::packets::{
        RequestNetworkSettings, SetLocalPlayerAsInitialized,
    };
    use bedwarp_protocol::{decode_packet, encode_packet, Packet};
    use bedwarp_session::testing::TestIdentity;
    use bedwarp_session::{AuthError, ChainAuthenticator, PlayerId};
    use bedwarp_transport::MemoryConnection;
    use bytes::Bytes;
    use serde_json::json;
    use tokio::sync::watch;
    use tokio::task::JoinHandle;

    use super::*;
    use crate::{ServerConfig, WorkerPool};

    const RECV_LIMIT: Duration = Duration::from_secs(120);

    // =====================================================================
    // Harness
    // =====================================================================

    struct Proxy {
        state: Arc<ProxyState<ChainAuthenticator>>,
        stop: watch::Sender<bool>,
    }

    impl Proxy {
        fn new() -> Self {
            let config = ServerConfig::builder().backend("10.0.0.5", 19140).worker_threads(4).build();
            let (stop, shutdown) = watch::channel(false);
            let state = ProxyState::new(
                config,
                ChainAuthenticator,
                Arc::new(SessionRegistry::new()),
                Arc::new(WorkerPool::new(4)),
                shutdown,
            );
            Self { state: Arc::new(state), stop }
        }

        fn registry(&self) -> &SessionRegistry {
            &self.state.registry
        }

        fn connect(&self) -> (Client, JoinHandle<Result<(), BedwarpError>>) {
            let (server, client) = MemoryConnection::pair();
            let task = tokio::spawn(handle_connection(server, Arc::clone(&self.state)));
            (Client::new(client), task)
        }
    }

    /// The client half of a memory connection, speaking batches.
    struct Client {
        conn: MemoryConnection,
        compression: Compression,
        pending: VecDeque<Bytes>,
    }

    impl Client {
        fn new(conn: MemoryConnection) -> Self {
            Self { conn, compression: Compression::None, pending: VecDeque::new() }
        }

        async fn send<P: Packet>(&self, packet: &P) {
            let batch = encode_batch([encode_packet(packet)], self.compression).unwrap();
            self.conn.send(&batch).await.unwrap();
        }

        /// Next packet from the server, or `None` once it hung up.
        async fn next(&mut self) -> Option<Bytes> {
            while self.pending.is_empty() {
                let data = tokio::time::timeout(RECV_LIMIT, self.conn.recv())
                    .await
                    .expect("server went quiet")
                    .unwrap()?;
                self.pending.extend(decode_batch(&data, self.compression).unwrap());
            }
            self.pending.pop_front()
        }

        async fn expect<P: Packet>(&mut self) -> P {
            let raw = self.next().await.expect("server hung up");
            decode_packet(raw).unwrap()
        }

        async fn expect_disconnect(&mut self, message: &str) {
            assert_eq!(self.expect::<Disconnect>().await.message, message);
            assert!(self.next().await.is_none(), "expected the connection to close");
        }

        async fn negotiate(&mut self) {
            self.send(&RequestNetworkSettings { protocol_version: 582 }).await;
            self.expect::<NetworkSettings>().await;
            self.compression = Compression::deflate();
        }

        async fn send_login(&self, chain_data: String, skin_data: String) {
            self.send(&Login { protocol_version: 582, chain_data, skin_data }).await;
        }

        /// Negotiates, logs in, and consumes the login replies.
        async fn log_in(&mut self, identity: &TestIdentity) {
            self.negotiate().await;
            self.log_in_negotiated(identity).await;
        }

        async fn log_in_negotiated(&mut self, identity: &TestIdentity) {
            let (chain, skin) = identity.login_tokens();
            self.send_login(chain, skin).await;
            assert_eq!(self.expect::<PlayStatus>().await.status, PlayStatusKind::LoginSuccess);
            self.expect::<ResourcePacksInfo>().await;
        }

        async fn respond(&self, status: ResourcePackStatus) {
            self.send(&ResourcePackClientResponse::new(status)).await;
        }
    }

    fn steve() -> TestIdentity {
        TestIdentity::new("Steve", "2535400000000001")
    }

    // =====================================================================
    // Login
    // =====================================================================

    #[tokio::test]
    async fn test_valid_login_registers_one_player() {
        let proxy = Proxy::new();
        let (mut client, _task) = proxy.connect();

        client.log_in(&steve()).await;

        assert_eq!(proxy.registry().len(), 1);
        let player = proxy.registry().get(&PlayerId::new("2535400000000001")).unwrap();
        assert_eq!(player.display_name(), "Steve");
    }

    #[tokio::test]
    async fn test_login_without_network_settings_is_uncompressed() {
        let proxy = Proxy::new();
        let (mut client, _task) = proxy.connect();

        let (chain, skin) = steve().login_tokens();
        client.send_login(chain, skin).await;

        assert_eq!(client.expect::<PlayStatus>().await.status, PlayStatusKind::LoginSuccess);
        assert_eq!(proxy.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_login_missing_chain_disconnects_without_registering() {
        let proxy = Proxy::new();
        let (mut client, task) = proxy.connect();
        client.negotiate().await;

        let (_, skin) = steve().login_tokens();
        client.send_login(json!({ "notchain": [] }).to_string(), skin).await;

        client.expect_disconnect(reason::CANT_CONNECT).await;
        let result = task.await.unwrap();
        assert!(matches!(result, Err(BedwarpError::Auth(AuthError::MalformedToken(_)))));
        assert!(proxy.registry().is_empty());
    }

    #[tokio::test]
    async fn test_login_non_string_identity_key_disconnects() {
        let proxy = Proxy::new();
        let (mut client, task) = proxy.connect();
        client.negotiate().await;

        let id = steve();
        let chain = id.chain_with_claims(json!({
            "identityPublicKey": 1234,
            "extraData": id.extra_data(),
        }));
        let (_, skin) = id.login_tokens();
        client.send_login(chain, skin).await;

        client.expect_disconnect(reason::CANT_CONNECT).await;
        assert!(matches!(
            task.await.unwrap(),
            Err(BedwarpError::Auth(AuthError::MissingIdentityKey))
        ));
        assert!(proxy.registry().is_empty());
    }

    #[tokio::test]
    async fn test_login_bad_skin_signature_disconnects() {
        let proxy = Proxy::new();
        let (mut client, task) = proxy.connect();
        client.negotiate().await;

        let (chain, _) = steve().login_tokens();
        let impostor = TestIdentity::with_key_seed("Steve", "2535400000000001", 9);
        let skin = impostor.sign(&json!({ "SkinId": "Standard_Custom" }));
        client.send_login(chain, skin).await;

        client.expect_disconnect(reason::CANT_CONNECT).await;
        assert!(matches!(
            task.await.unwrap(),
            Err(BedwarpError::Auth(AuthError::SignatureInvalid))
        ));
        assert!(proxy.registry().is_empty());
    }

    // =====================================================================
    // Protocol version
    // =====================================================================

    #[tokio::test]
    async fn test_newer_client_is_told_server_is_old_and_continues() {
        let proxy = Proxy::new();
        let (mut client, _task) = proxy.connect();

        client.send(&RequestNetworkSettings { protocol_version: 600 }).await;

        assert_eq!(client.expect::<PlayStatus>().await.status, PlayStatusKind::LoginFailedServer);
        client.expect::<NetworkSettings>().await;
        client.compression = Compression::deflate();

        let (chain, skin) = steve().login_tokens();
        client.send(&Login { protocol_version: 600, chain_data: chain, skin_data: skin }).await;
        // Reported once; the login itself goes through.
        assert_eq!(client.expect::<PlayStatus>().await.status, PlayStatusKind::LoginSuccess);
        assert_eq!(proxy.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_older_client_is_told_client_is_old() {
        let proxy = Proxy::new();
        let (mut client, _task) = proxy.connect();

        let (chain, skin) = steve().login_tokens();
        client.send(&Login { protocol_version: 560, chain_data: chain, skin_data: skin }).await;

        assert_eq!(client.expect::<PlayStatus>().await.status, PlayStatusKind::LoginFailedClient);
        assert_eq!(client.expect::<PlayStatus>().await.status, PlayStatusKind::LoginSuccess);
    }

    // =====================================================================
    // Resource packs and handoff
    // =====================================================================

    #[tokio::test]
    async fn test_full_sequence_ends_in_transfer() {
        let proxy = Proxy::new();
        let (mut client, _task) = proxy.connect();
        client.log_in(&steve()).await;

        client.respond(ResourcePackStatus::HaveAllPacks).await;
        let stack = client.expect::<ResourcePackStack>().await;
        assert_eq!(stack.game_version, "*");
        assert!(!stack.must_accept);

        client.respond(ResourcePackStatus::Completed).await;
        let start = client.expect::<StartGame>().await;
        assert_eq!(start.game_version, "1.19.80");
        assert_eq!(client.expect::<PlayStatus>().await.status, PlayStatusKind::PlayerSpawn);

        client.send(&SetLocalPlayerAsInitialized { runtime_entity_id: start.runtime_entity_id }).await;
        let transfer = client.expect::<Transfer>().await;
        assert_eq!(transfer, Transfer { address: "10.0.0.5".into(), port: 19140 });

        // Still registered until the client leaves.
        assert_eq!(proxy.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_completed_twice_initializes_once() {
        let proxy = Proxy::new();
        let (mut client, _task) = proxy.connect();
        client.log_in(&steve()).await;

        client.respond(ResourcePackStatus::Completed).await;
        client.respond(ResourcePackStatus::Completed).await;
        client.send(&SetLocalPlayerAsInitialized { runtime_entity_id: 1 }).await;

        client.expect::<StartGame>().await;
        client.expect::<PlayStatus>().await;
        // The second Completed produced nothing.
        client.expect::<Transfer>().await;
    }

    #[tokio::test]
    async fn test_refused_packs_disconnects_without_start_game() {
        let proxy = Proxy::new();
        let (mut client, task) = proxy.connect();
        client.log_in(&steve()).await;

        client.respond(ResourcePackStatus::Refused).await;

        client.expect_disconnect(reason::RESOURCE_PACK).await;
        assert!(matches!(
            task.await.unwrap(),
            Err(BedwarpError::ResourcePackRejected(ResourcePackStatus::Refused))
        ));
        assert!(proxy.registry().is_empty());
    }

    #[tokio::test]
    async fn test_send_packs_request_disconnects() {
        let proxy = Proxy::new();
        let (mut client, _task) = proxy.connect();
        client.log_in(&steve()).await;

        client.respond(ResourcePackStatus::SendPacks).await;

        client.expect_disconnect(reason::RESOURCE_PACK).await;
    }

    #[tokio::test]
    async fn test_none_status_disconnects_with_resource_pack_reason() {
        let proxy = Proxy::new();
        let (mut client, task) = proxy.connect();
        client.log_in(&steve()).await;

        client.respond(ResourcePackStatus::None).await;

        client.expect_disconnect(reason::RESOURCE_PACK).await;
        assert!(matches!(
            task.await.unwrap(),
            Err(BedwarpError::ResourcePackRejected(ResourcePackStatus::None))
        ));
        assert!(proxy.registry().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_status_byte_disconnects_with_resource_pack_reason() {
        let proxy = Proxy::new();
        let (mut client, _task) = proxy.connect();
        client.log_in(&steve()).await;

        client.respond(ResourcePackStatus::Unknown(7)).await;

        client.expect_disconnect(reason::RESOURCE_PACK).await;
    }

    #[tokio::test]
    async fn test_packet_out_of_sequence_is_ignored() {
        let proxy = Proxy::new();
        let (mut client, _task) = proxy.connect();

        client.send(&SetLocalPlayerAsInitialized { runtime_entity_id: 1 }).await;
        client.send(&ResourcePackClientResponse::new(ResourcePackStatus::Completed)).await;

        // The session is still waiting for a login.
        client.log_in(&steve()).await;
        assert_eq!(proxy.registry().len(), 1);
    }

    // =====================================================================
    // Disconnect and duplicates
    // =====================================================================

    #[tokio::test]
    async fn test_disconnect_removes_registration() {
        let proxy = Proxy::new();
        let (mut client, task) = proxy.connect();
        client.log_in(&steve()).await;
        let conn_id = proxy.registry().snapshot()[0].session().conn_id();

        client.conn.close().await.unwrap();
        task.await.unwrap().unwrap();

        assert!(proxy.registry().is_empty());
        // A second removal finds nothing.
        assert!(proxy
            .registry()
            .remove_session(&PlayerId::new("2535400000000001"), conn_id)
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_login_evicts_previous_connection() {
        let proxy = Proxy::new();
        let (mut first, first_task) = proxy.connect();
        first.log_in(&steve()).await;
        let first_conn = proxy.registry().snapshot()[0].session().conn_id();

        let (mut second, _second_task) = proxy.connect();
        second.log_in(&steve()).await;

        first.expect_disconnect(reason::LOGGED_IN_ELSEWHERE).await;
        assert!(matches!(first_task.await.unwrap(), Err(BedwarpError::Evicted)));

        // The evicted connection's cleanup left the new entry alone.
        assert_eq!(proxy.registry().len(), 1);
        let player = proxy.registry().get(&PlayerId::new("2535400000000001")).unwrap();
        assert!(!player.is_on(first_conn));
    }

    // =====================================================================
    // Timeouts and shutdown
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_silent_client_times_out() {
        let proxy = Proxy::new();
        let (mut client, task) = proxy.connect();

        client.expect_disconnect(reason::TIMEOUT).await;

        assert!(matches!(
            task.await.unwrap(),
            Err(BedwarpError::Timeout { state: "awaiting login", .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_after_login_removes_registration() {
        let proxy = Proxy::new();
        let (mut client, task) = proxy.connect();
        client.log_in(&steve()).await;

        client.expect_disconnect(reason::TIMEOUT).await;
        task.await.unwrap().unwrap_err();

        assert!(proxy.registry().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_signal_closes_session() {
        let proxy = Proxy::new();
        let (mut client, task) = proxy.connect();
        client.log_in(&steve()).await;

        proxy.stop.send_replace(true);

        client.expect_disconnect(reason::SERVER_CLOSED).await;
        assert!(matches!(task.await.unwrap(), Err(BedwarpError::ShuttingDown)));
        assert!(proxy.registry().is_empty());
    }

    #[tokio::test]
    async fn test_garbage_batch_is_skipped() {
        let proxy = Proxy::new();
        let (mut client, _task) = proxy.connect();
        client.negotiate().await;

        client.conn.send(&[0xff, 0x00, 0x13]).await.unwrap();

        client.log_in_negotiated(&steve()).await;
        assert_eq!(proxy.registry().len(), 1);
    }
}
