//! Hub lifecycle and fan-out tests
//!
//! Clients are driven over the in-memory transport, each connection running
//! in its own task exactly as the WebSocket endpoint runs it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

use chat_hub::connection::memory::{self, MemoryPeer, MemoryStream};
use chat_hub::connection::{ClientId, ConnectionError, MessageSink, SendError, Upgrade};
use chat_hub::hub::Hub;
use chat_hub::shutdown::GracefulShutdown;

const WAIT: Duration = Duration::from_secs(5);

struct TestClient {
    id: ClientId,
    peer: MemoryPeer,
    task: JoinHandle<Result<(), ConnectionError>>,
}

/// Connect a client and wait until it is registered
async fn join(hub: &Arc<Hub>) -> TestClient {
    let (upgrade, peer) = memory::pair();
    let id = hub.issue_client_id();
    let task_hub = hub.clone();
    let task = tokio::spawn(async move { task_hub.connect(id, upgrade).await });

    wait_until(|| hub.registry().contains(id)).await;
    TestClient { id, peer, task }
}

async fn wait_until(condition: impl Fn() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

async fn next_message(peer: &mut MemoryPeer) -> String {
    timeout(WAIT, peer.recv())
        .await
        .expect("timed out waiting for a message")
        .expect("connection closed while waiting for a message")
}

/// Give in-flight deliveries a moment, then assert nothing else arrived
async fn assert_quiet(peer: &mut MemoryPeer) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(peer.try_recv(), None);
}

/// Transport whose writes always fail while reads come from a memory peer
struct BrokenWrites {
    stream: MemoryStream,
}

struct BrokenSink;

#[async_trait]
impl MessageSink for BrokenSink {
    async fn send_text(&mut self, _text: String) -> Result<(), ConnectionError> {
        Err(ConnectionError::Transport("broken pipe".to_string()))
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        Ok(())
    }
}

#[async_trait]
impl Upgrade for BrokenWrites {
    type Sink = BrokenSink;
    type Stream = MemoryStream;

    async fn accept(self) -> Result<(BrokenSink, MemoryStream), ConnectionError> {
        Ok((BrokenSink, self.stream))
    }
}

// =============================================================================
// Messaging
// =============================================================================

#[tokio::test]
async fn test_echo_and_broadcast() {
    let hub = Arc::new(Hub::default());
    let mut a = join(&hub).await;
    let mut b = join(&hub).await;

    assert!(a.peer.send("hi"));

    assert_eq!(next_message(&mut a.peer).await, "You wrote: hi");
    assert_eq!(
        next_message(&mut a.peer).await,
        format!("Client #{} says: hi", a.id)
    );
    assert_eq!(
        next_message(&mut b.peer).await,
        format!("Client #{} says: hi", a.id)
    );

    assert_quiet(&mut a.peer).await;
    assert_quiet(&mut b.peer).await;
}

#[tokio::test]
async fn test_own_messages_processed_in_order() {
    let hub = Arc::new(Hub::default());
    let mut a = join(&hub).await;

    for i in 0..20 {
        a.peer.send(format!("m{}", i));
    }

    for i in 0..20 {
        assert_eq!(next_message(&mut a.peer).await, format!("You wrote: m{}", i));
        assert_eq!(
            next_message(&mut a.peer).await,
            format!("Client #{} says: m{}", a.id, i)
        );
    }
}

#[tokio::test]
async fn test_connections_track_activity() {
    let hub = Arc::new(Hub::default());
    let mut a = join(&hub).await;
    let b = join(&hub).await;

    let before = hub.registry().connections();
    let ids: Vec<_> = before.iter().map(|info| info.client_id).collect();
    assert_eq!(ids, vec![a.id, b.id]);

    tokio::time::sleep(Duration::from_millis(20)).await;
    a.peer.send("hi");
    assert_eq!(next_message(&mut a.peer).await, "You wrote: hi");

    let after = hub.registry().connections();
    assert!(after[0].last_activity > before[0].last_activity);
    assert_eq!(after[0].connected_at, before[0].connected_at);
    assert_eq!(after[1].last_activity, before[1].last_activity);
}

#[tokio::test]
async fn test_personal_message() {
    let hub = Arc::new(Hub::default());
    let mut a = join(&hub).await;
    let mut b = join(&hub).await;

    assert_ok!(hub.send_personal_message(a.id, "just for you").await);
    assert_eq!(next_message(&mut a.peer).await, "just for you");
    assert_quiet(&mut b.peer).await;

    let unknown = ClientId::new(10_000);
    assert_eq!(
        hub.send_personal_message(unknown, "anyone?").await,
        Err(SendError::NotRegistered(unknown))
    );
}

// =============================================================================
// Departure
// =============================================================================

#[tokio::test]
async fn test_clean_disconnect_notifies_others() {
    let hub = Arc::new(Hub::default());
    let mut a = join(&hub).await;
    let mut b = join(&hub).await;

    a.peer.close(Some(1000));

    let result = timeout(WAIT, a.task).await.unwrap().unwrap();
    assert_ok!(result);
    assert_eq!(
        next_message(&mut b.peer).await,
        format!("Client #{} left the chat", a.id)
    );
    assert!(!hub.registry().contains(a.id));
    assert_eq!(hub.registry().len(), 1);

    // The departed client's transport was closed
    assert_eq!(timeout(WAIT, a.peer.recv()).await.unwrap(), None);
}

#[tokio::test]
async fn test_transport_error_cleans_up() {
    let hub = Arc::new(Hub::default());
    let a = join(&hub).await;
    let mut b = join(&hub).await;

    a.peer.abort("connection reset by peer");

    let result = timeout(WAIT, a.task).await.unwrap().unwrap();
    assert_eq!(
        assert_err!(result),
        ConnectionError::Transport("connection reset by peer".into())
    );
    assert_eq!(
        next_message(&mut b.peer).await,
        format!("Client #{} left the chat", a.id)
    );
    assert!(!hub.registry().contains(a.id));
}

#[tokio::test]
async fn test_write_failure_is_transport_error() {
    let hub = Arc::new(Hub::default());
    let mut b = join(&hub).await;

    let (upgrade, peer) = memory::pair();
    let (_sink, stream) = assert_ok!(upgrade.accept().await);
    let id = hub.issue_client_id();
    let task_hub = hub.clone();
    let task = tokio::spawn(async move { task_hub.connect(id, BrokenWrites { stream }).await });
    wait_until(|| hub.registry().contains(id)).await;

    // The echo cannot be written, which ends the connection
    assert!(peer.send("hi"));

    let result = timeout(WAIT, task).await.unwrap().unwrap();
    assert_eq!(
        assert_err!(result),
        ConnectionError::Transport("broken pipe".into())
    );
    assert!(!hub.registry().contains(id));

    // b saw the broadcast, then the departure
    assert_eq!(next_message(&mut b.peer).await, format!("Client #{} says: hi", id));
    assert_eq!(
        next_message(&mut b.peer).await,
        format!("Client #{} left the chat", id)
    );
}

#[tokio::test]
async fn test_cancelled_task_still_cleans_up() {
    let hub = Arc::new(Hub::default());
    let a = join(&hub).await;
    let mut b = join(&hub).await;

    a.task.abort();
    let _ = a.task.await;

    assert_eq!(
        next_message(&mut b.peer).await,
        format!("Client #{} left the chat", a.id)
    );
    assert!(!hub.registry().contains(a.id));

    let stats = hub.registry().stats();
    assert_eq!(stats.members as u64, stats.total_added - stats.total_removed);
}

#[tokio::test]
async fn test_hub_disconnect_announces_once() {
    let hub = Arc::new(Hub::default());
    let a = join(&hub).await;
    let mut b = join(&hub).await;

    assert!(hub.disconnect(a.id).await);
    assert!(!hub.disconnect(a.id).await);

    let result = timeout(WAIT, a.task).await.unwrap().unwrap();
    assert_ok!(result);

    assert_eq!(
        next_message(&mut b.peer).await,
        format!("Client #{} left the chat", a.id)
    );
    assert_quiet(&mut b.peer).await;
    assert_eq!(hub.registry().stats().total_removed, 1);
}

#[tokio::test]
async fn test_handshake_failure_is_silent() {
    let hub = Arc::new(Hub::default());
    let mut a = join(&hub).await;

    let (upgrade, _peer) = memory::pair();
    let result = hub
        .connect(hub.issue_client_id(), upgrade.reject("unsupported protocol"))
        .await;

    assert!(matches!(result, Err(ConnectionError::Handshake(_))));
    assert_eq!(hub.registry().len(), 1);
    assert_quiet(&mut a.peer).await;
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hundred_concurrent_clients() {
    const CLIENTS: usize = 100;
    let hub = Arc::new(Hub::default());

    let mut clients = join_all((0..CLIENTS).map(|_| join(&hub))).await;
    wait_until(|| hub.registry().len() == CLIENTS).await;

    for client in &clients {
        client.peer.send(format!("hello from {}", client.id));
    }

    let expected_senders: HashSet<ClientId> = clients.iter().map(|c| c.id).collect();

    let checks = clients.iter_mut().map(|client| {
        let expected_senders = expected_senders.clone();
        async move {
            let mut echoes = 0;
            let mut senders = HashSet::new();

            for _ in 0..=CLIENTS {
                let message = next_message(&mut client.peer).await;
                if message.starts_with("You wrote: ") {
                    assert_eq!(message, format!("You wrote: hello from {}", client.id));
                    echoes += 1;
                } else {
                    let id = message
                        .strip_prefix("Client #")
                        .and_then(|rest| rest.split(' ').next())
                        .and_then(|id| id.parse::<u64>().ok())
                        .map(ClientId::new)
                        .expect("unexpected message format");
                    assert_eq!(message, format!("Client #{} says: hello from {}", id, id));
                    assert!(senders.insert(id), "duplicate broadcast from {}", id);
                }
            }

            assert_eq!(echoes, 1);
            assert_eq!(senders, expected_senders);
            assert_quiet(&mut client.peer).await;
        }
    });
    join_all(checks).await;

    assert_eq!(hub.registry().len(), CLIENTS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_connect_during_broadcast() {
    let hub = Arc::new(Hub::default());
    let mut clients = join_all((0..50).map(|_| join(&hub))).await;

    let (report, mut late) = tokio::join!(hub.broadcast("announcement"), join(&hub));

    assert_eq!(report.failed, 0);
    assert!(report.recipients == 50 || report.recipients == 51);
    assert_eq!(hub.registry().len(), 51);
    assert!(hub.registry().contains(late.id));

    for client in &mut clients {
        assert_eq!(next_message(&mut client.peer).await, "announcement");
    }

    // The late client may or may not have been part of the snapshot
    late.peer.send("made it");
    let first = next_message(&mut late.peer).await;
    let echo = if first == "announcement" {
        next_message(&mut late.peer).await
    } else {
        first
    };
    assert_eq!(echo, "You wrote: made it");
}

#[tokio::test]
async fn test_member_count_matches_adds_minus_removes() {
    let hub = Arc::new(Hub::default());
    let mut live = Vec::new();

    for round in 0..30 {
        live.push(join(&hub).await);
        if round % 3 == 2 {
            let leaving = live.remove(0);
            leaving.peer.close(None);
            timeout(WAIT, leaving.task).await.unwrap().unwrap().unwrap();
        }

        let stats = hub.registry().stats();
        assert_eq!(stats.members, live.len());
        assert_eq!(stats.members as u64, stats.total_added - stats.total_removed);
    }
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn test_graceful_shutdown_closes_everyone() {
    let hub = Arc::new(Hub::default());
    let mut clients = join_all((0..3).map(|_| join(&hub))).await;

    let shutdown = GracefulShutdown::new(hub.clone(), WAIT);
    let result = shutdown.execute("test").await;

    assert!(result.drained);
    assert_eq!(result.connections_closed, 3);
    assert!(hub.registry().is_empty());

    for client in &mut clients {
        // Departure notices may have raced the close; the transport ends either way
        while timeout(WAIT, client.peer.recv()).await.unwrap().is_some() {}
    }
    for client in clients {
        assert_ok!(timeout(WAIT, client.task).await.unwrap().unwrap());
    }
}
