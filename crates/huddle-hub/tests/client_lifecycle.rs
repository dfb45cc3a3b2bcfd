//! Integration tests for the connection adapter, driven over in-memory
//! connections.
//!
//! Keepalive tests run with `start_paused = true`: Tokio's clock only
//! moves when every task is idle, and then jumps straight to the next
//! timer, so minutes of simulated time pass instantly and
//! deterministically.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use huddle_hub::{Client, ClientConfig, ClientTasks, Hub, HubHandle};
use huddle_protocol::{JsonCodec, RoomKey, UserId};
use huddle_transport::memory::{
    self, MemoryConnection, MemoryPeer, MemorySink, MemorySource,
};
use huddle_transport::{
    Connection, ConnectionId, Frame, FrameSink, TransportError,
};
use tokio::sync::Semaphore;

// =========================================================================
// Helpers
// =========================================================================

fn attach(
    hub: &HubHandle,
    room: &str,
    user: &str,
    config: &ClientConfig,
) -> (ClientTasks, MemoryPeer) {
    let (conn, peer) = memory::pair();
    let tasks = Client::spawn(
        conn,
        RoomKey::new(room),
        UserId::new(user),
        hub,
        JsonCodec,
        config,
    )
    .expect("hub should be running");
    (tasks, peer)
}

async fn connections(hub: &HubHandle) -> usize {
    hub.stats().await.expect("hub should answer").connections
}

/// A connection whose writes stall until the gate is opened, standing
/// in for a peer that stopped reading.
struct GatedConnection {
    inner: MemoryConnection,
    gate: Arc<Semaphore>,
}

struct GatedSink {
    inner: MemorySink,
    gate: Arc<Semaphore>,
}

impl Connection for GatedConnection {
    type Sink = GatedSink;
    type Source = MemorySource;

    fn id(&self) -> ConnectionId {
        self.inner.id()
    }

    fn split(self) -> (GatedSink, MemorySource) {
        let (inner, source) = self.inner.split();
        let gate = self.gate;
        (GatedSink { inner, gate }, source)
    }
}

impl FrameSink for GatedSink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        // A closed semaphore lets every writer through.
        let _ = self.gate.acquire().await;
        self.inner.send(frame).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner.close().await
    }
}

/// Polls until the hub reports `n` connections.
async fn wait_for_connections(hub: &HubHandle, n: usize) {
    for _ in 0..100 {
        if connections(hub).await == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("hub never reached {n} connections");
}

/// Reads frames until the next text frame and parses it as JSON.
async fn next_json(peer: &mut MemoryPeer) -> serde_json::Value {
    loop {
        match peer.recv().await.expect("connection should be open") {
            Frame::Text(text) => return serde_json::from_str(&text).unwrap(),
            Frame::Ping(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Collects every frame until the server closes its write half.
async fn drain_until_closed(peer: &mut MemoryPeer) -> Vec<Frame> {
    let mut frames = Vec::new();
    while let Some(frame) = peer.recv().await {
        frames.push(frame);
    }
    frames
}

// =========================================================================
// Routing through real adapters
// =========================================================================

#[tokio::test]
async fn test_message_from_one_peer_reaches_the_room() {
    let hub = Hub::spawn();
    let config = ClientConfig::default();
    let (_a, mut alice) = attach(&hub, "r1", "alice", &config);
    let (_b, mut bob) = attach(&hub, "r1", "bob", &config);
    let (_c, mut carol) = attach(&hub, "r2", "carol", &config);
    wait_for_connections(&hub, 3).await;

    alice.send_text(r#"{"type":"message","id":"r1","content":"hi"}"#);

    let at_bob = next_json(&mut bob).await;
    assert_eq!(at_bob["content"], "hi");
    assert_eq!(at_bob["sender"], "alice");
    // Broadcasts include the sender's own connection.
    assert_eq!(next_json(&mut alice).await["content"], "hi");

    connections(&hub).await;
    assert!(carol.try_recv().is_none());
}

#[tokio::test]
async fn test_sender_is_stamped_and_bare_message_goes_home() {
    let hub = Hub::spawn();
    let config = ClientConfig::default();
    let (_a, alice) = attach(&hub, "lobby", "alice", &config);
    let (_b, mut bob) = attach(&hub, "lobby", "bob", &config);
    wait_for_connections(&hub, 2).await;

    alice.send_text(r#"{"type":"message","sender":"mallory","content":"psst"}"#);

    let at_bob = next_json(&mut bob).await;
    assert_eq!(at_bob["sender"], "alice");
    assert_eq!(at_bob["id"], "lobby");
    assert_eq!(at_bob["content"], "psst");
}

#[tokio::test]
async fn test_notification_goes_to_recipient_room() {
    let hub = Hub::spawn();
    let config = ClientConfig::default();
    let (_a, alice) = attach(&hub, "r1", "alice", &config);
    let (_b, mut bob) = attach(&hub, "r2", "bob", &config);
    wait_for_connections(&hub, 2).await;

    alice.send_text(
        r#"{"type":"notification","recipient":"r2","content":"knock","id":"c-9"}"#,
    );

    let at_bob = next_json(&mut bob).await;
    assert_eq!(at_bob["type"], "notification");
    assert_eq!(at_bob["content"], "knock");
    assert_eq!(at_bob["id"], "c-9");
}

#[tokio::test]
async fn test_binary_frames_are_decoded_too() {
    let hub = Hub::spawn();
    let config = ClientConfig::default();
    let (_a, alice) = attach(&hub, "r1", "alice", &config);
    let (_b, mut bob) = attach(&hub, "r1", "bob", &config);
    wait_for_connections(&hub, 2).await;

    alice.send(Frame::Binary(
        br#"{"type":"message","id":"r1","content":"bytes"}"#.to_vec(),
    ));

    assert_eq!(next_json(&mut bob).await["content"], "bytes");
}

// =========================================================================
// Teardown
// =========================================================================

#[tokio::test]
async fn test_undecodable_frame_tears_down_only_that_connection() {
    let hub = Hub::spawn();
    let config = ClientConfig::default();
    let (a, mut alice) = attach(&hub, "r1", "alice", &config);
    let (_b, mut bob) = attach(&hub, "r1", "bob", &config);
    wait_for_connections(&hub, 2).await;

    alice.send_text("this is not json");
    a.join().await;

    assert_eq!(connections(&hub).await, 1);
    let frames = drain_until_closed(&mut alice).await;
    assert_eq!(frames.last(), Some(&Frame::Close));

    // Bob is unaffected.
    let (_c, carol) = attach(&hub, "r1", "carol", &config);
    wait_for_connections(&hub, 2).await;
    carol.send_text(r#"{"type":"message","id":"r1","content":"still up"}"#);
    assert_eq!(next_json(&mut bob).await["content"], "still up");
}

#[tokio::test]
async fn test_oversized_frame_tears_down_connection() {
    let hub = Hub::spawn();
    let config = ClientConfig {
        max_frame_size: 64,
        ..ClientConfig::default()
    };
    let (a, alice) = attach(&hub, "r1", "alice", &config);
    wait_for_connections(&hub, 1).await;

    let big = format!(
        r#"{{"type":"message","id":"r1","content":"{}"}}"#,
        "x".repeat(128)
    );
    alice.send_text(big);
    a.join().await;

    assert_eq!(connections(&hub).await, 0);
}

#[tokio::test]
async fn test_peer_hang_up_unregisters() {
    let hub = Hub::spawn();
    let config = ClientConfig::default();
    let (a, mut alice) = attach(&hub, "r1", "alice", &config);
    wait_for_connections(&hub, 1).await;

    alice.hang_up();
    a.join().await;

    assert_eq!(connections(&hub).await, 0);
}

#[tokio::test]
async fn test_close_frame_unregisters() {
    let hub = Hub::spawn();
    let config = ClientConfig::default();
    let (a, alice) = attach(&hub, "r1", "alice", &config);
    wait_for_connections(&hub, 1).await;

    alice.send(Frame::Close);
    a.join().await;

    assert_eq!(connections(&hub).await, 0);
}

#[tokio::test]
async fn test_unknown_kind_does_not_tear_down() {
    let hub = Hub::spawn();
    let config = ClientConfig::default();
    let (_a, alice) = attach(&hub, "r1", "alice", &config);
    let (_b, mut bob) = attach(&hub, "r1", "bob", &config);
    wait_for_connections(&hub, 2).await;

    alice.send_text(r#"{"type":"typing","id":"r1"}"#);
    alice.send_text(r#"{"type":"message","id":"r1","content":"after"}"#);

    assert_eq!(next_json(&mut bob).await["content"], "after");
    assert_eq!(connections(&hub).await, 2);
}

#[tokio::test]
async fn test_evicted_slow_client_stops_reading_and_closes() {
    let hub = Hub::spawn();
    let slow_config = ClientConfig {
        outbound_capacity: 1,
        ..ClientConfig::default()
    };
    let (conn, mut slow) = memory::pair();
    let gate = Arc::new(Semaphore::new(0));
    let gated = GatedConnection {
        inner: conn,
        gate: Arc::clone(&gate),
    };
    let slow_tasks = Client::spawn(
        gated,
        RoomKey::new("r1"),
        UserId::new("slow"),
        &hub,
        JsonCodec,
        &slow_config,
    )
    .unwrap();
    let (_b, mut bob) = attach(&hub, "r1", "bob", &ClientConfig::default());
    wait_for_connections(&hub, 2).await;

    // The slow writer stalls on the first frame; the rest overflow.
    for n in 0..5 {
        bob.send_text(format!(r#"{{"type":"message","id":"r1","content":"{n}"}}"#));
    }
    wait_for_connections(&hub, 1).await;

    // Evicted, so this must not reach the room.
    slow.send_text(r#"{"type":"message","id":"r1","content":"from-evicted"}"#);

    gate.close();
    slow_tasks.join().await;

    let frames = drain_until_closed(&mut slow).await;
    assert_eq!(frames.last(), Some(&Frame::Close));
    assert!(!slow.send_text(r#"{"type":"message","id":"r1"}"#));

    bob.send_text(r#"{"type":"message","id":"r1","content":"marker"}"#);
    loop {
        let content = next_json(&mut bob).await["content"].clone();
        assert_ne!(content, "from-evicted");
        if content == "marker" {
            break;
        }
    }
}

// =========================================================================
// Keepalive (simulated clock)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_peer_answering_pings_is_never_timed_out() {
    let hub = Hub::spawn();
    let config = ClientConfig::default();
    let (_a, mut alice) = attach(&hub, "r1", "alice", &config);
    wait_for_connections(&hub, 1).await;

    let pings = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&pings);
    let responder = tokio::spawn(async move {
        while let Some(frame) = alice.recv().await {
            if let Frame::Ping(data) = frame {
                counter.fetch_add(1, Ordering::Relaxed);
                alice.send(Frame::Pong(data));
            }
        }
    });

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(connections(&hub).await, 1);

    // Ten minutes at one ping per 54 s.
    let sent = pings.load(Ordering::Relaxed);
    assert!(sent >= 10, "only {sent} pings sent");
    responder.abort();
}

#[tokio::test(start_paused = true)]
async fn test_silent_peer_is_timed_out() {
    let hub = Hub::spawn();
    let config = ClientConfig::default();
    let (a, mut alice) = attach(&hub, "r1", "alice", &config);
    wait_for_connections(&hub, 1).await;

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert_eq!(connections(&hub).await, 1);

    a.join().await;
    assert_eq!(connections(&hub).await, 0);

    let frames = drain_until_closed(&mut alice).await;
    assert_eq!(frames.first(), Some(&Frame::Ping(Vec::new())));
    assert_eq!(frames.last(), Some(&Frame::Close));
}

#[tokio::test(start_paused = true)]
async fn test_data_without_pongs_still_times_out() {
    let hub = Hub::spawn();
    let config = ClientConfig::with_read_timeout(Duration::from_secs(10));
    let (a, alice) = attach(&hub, "r1", "alice", &config);
    wait_for_connections(&hub, 1).await;

    let chatter = tokio::spawn(async move {
        for _ in 0..30 {
            alice.send_text(r#"{"type":"message","id":"r1","content":"."}"#);
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    });

    a.join().await;
    assert_eq!(connections(&hub).await, 0);
    chatter.abort();
}
