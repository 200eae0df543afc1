use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bedwarp_transport::{
    Connection, ListenerEvents, Pong, RakNetClient, RakNetConfig, RakNetTransport, Transport,
};

struct TestEvents {
    refuse: AtomicBool,
}

impl TestEvents {
    fn new() -> Arc<Self> {
        Arc::new(Self { refuse: AtomicBool::new(false) })
    }
}

impl ListenerEvents for TestEvents {
    fn on_connection_request(&self, _addr: SocketAddr) -> bool {
        !self.refuse.load(Ordering::Relaxed)
    }

    fn on_query(&self, _addr: SocketAddr) -> Option<Pong> {
        Some(Pong {
            motd: "Test Proxy".into(),
            sub_motd: "sub".into(),
            player_count: 3,
            max_player_count: 10,
            ..Pong::default()
        })
    }
}

async fn listen(events: Arc<TestEvents>) -> RakNetTransport {
    RakNetTransport::bind("127.0.0.1:0", events).await.unwrap()
}

async fn accept(transport: &mut RakNetTransport) -> bedwarp_transport::RakNetConnection {
    tokio::time::timeout(Duration::from_secs(5), transport.accept())
        .await
        .expect("accept timed out")
        .unwrap()
}

#[tokio::test]
async fn test_ping_returns_advertisement() {
    let transport = listen(TestEvents::new()).await;

    let ad = RakNetClient::ping(transport.local_addr()).await.unwrap();

    let fields: Vec<&str> = ad.split(';').collect();
    assert_eq!(fields[0], "MCPE");
    assert_eq!(fields[1], "Test Proxy");
    assert_eq!(fields[4], "3");
    assert_eq!(fields[5], "10");
    assert_eq!(fields[6], transport.guid().to_string());
}

#[tokio::test]
async fn test_handshake_yields_connection() {
    let mut transport = listen(TestEvents::new()).await;

    let client = RakNetClient::connect(transport.local_addr()).await.unwrap();
    let conn = accept(&mut transport).await;

    assert_eq!(conn.peer_addr(), client.local_addr().unwrap());
}

#[tokio::test]
async fn test_game_packets_flow_both_ways() {
    let mut transport = listen(TestEvents::new()).await;
    let mut client = RakNetClient::connect(transport.local_addr()).await.unwrap();
    let conn = accept(&mut transport).await;

    client.send_game(b"hello server").await.unwrap();
    assert_eq!(conn.recv().await.unwrap().unwrap(), b"hello server");

    conn.send(b"hello client").await.unwrap();
    assert_eq!(&client.recv_game().await.unwrap().unwrap()[..], b"hello client");
}

#[tokio::test]
async fn test_large_payload_is_split_and_reassembled() {
    let mut transport = listen(TestEvents::new()).await;
    let mut client = RakNetClient::connect(transport.local_addr()).await.unwrap();
    let conn = accept(&mut transport).await;

    let big: Vec<u8> = (0..6000u32).map(|i| (i % 251) as u8).collect();

    conn.send(&big).await.unwrap();
    assert_eq!(client.recv_game().await.unwrap().unwrap().to_vec(), big);

    client.send_game(&big).await.unwrap();
    assert_eq!(conn.recv().await.unwrap().unwrap(), big);
}

#[tokio::test]
async fn test_client_disconnect_ends_recv() {
    let mut transport = listen(TestEvents::new()).await;
    let client = RakNetClient::connect(transport.local_addr()).await.unwrap();
    let conn = accept(&mut transport).await;

    client.disconnect().await.unwrap();

    let next = tokio::time::timeout(Duration::from_secs(5), conn.recv()).await.unwrap();
    assert!(next.unwrap().is_none());
}

#[tokio::test]
async fn test_server_close_notifies_client() {
    let mut transport = listen(TestEvents::new()).await;
    let mut client = RakNetClient::connect(transport.local_addr()).await.unwrap();
    let conn = accept(&mut transport).await;

    conn.close().await.unwrap();
    conn.close().await.unwrap();

    assert!(client.recv_game().await.unwrap().is_none());
    assert!(conn.send(b"late").await.is_err());
}

#[tokio::test]
async fn test_refused_connection_gets_no_reply() {
    let events = TestEvents::new();
    events.refuse.store(true, Ordering::Relaxed);
    let transport = listen(events).await;

    let result = RakNetClient::connect(transport.local_addr()).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_shutdown_stops_accept_and_notifies_peers() {
    let mut transport = listen(TestEvents::new()).await;
    let mut client = RakNetClient::connect(transport.local_addr()).await.unwrap();
    let _conn = accept(&mut transport).await;

    transport.shutdown().await.unwrap();

    assert!(client.recv_game().await.unwrap().is_none());
    assert!(transport.accept().await.is_err());
}

#[tokio::test]
async fn test_silent_peer_times_out() {
    let config = RakNetConfig {
        peer_timeout: Duration::from_millis(200),
        ..RakNetConfig::default()
    };
    let mut transport =
        RakNetTransport::bind_with("127.0.0.1:0", TestEvents::new(), config).await.unwrap();
    let _client = RakNetClient::connect(transport.local_addr()).await.unwrap();
    let conn = accept(&mut transport).await;

    // The sweep runs once a second.
    let next = tokio::time::timeout(Duration::from_secs(5), conn.recv()).await.unwrap();
    assert!(next.unwrap().is_none());
}
