//! Integration tests for end-to-end host/guest replication.
//!
//! These tests bind real sockets on 127.0.0.1 and drive each engine's
//! event loop by hand, verifying the full sync pipeline.

use std::sync::Arc;
use std::time::Instant;

use nexus_collab::{
    Directory, MemoryDirectory, RoomCode, SyncConfig, SyncEngine, SyncStatus, TransportEvent,
};
use nexus_core::{GraphStore, NodeType};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{timeout, Duration};

struct Peer {
    engine: SyncEngine,
    events: UnboundedReceiver<TransportEvent>,
    store: GraphStore,
}

impl Peer {
    fn new() -> Self {
        let mut engine = SyncEngine::new(SyncConfig::default());
        let events = engine.take_event_rx().unwrap();
        Self {
            engine,
            events,
            store: GraphStore::new(),
        }
    }

    /// Feed transport events into the engine until `done` holds.
    async fn pump_until(&mut self, mut done: impl FnMut(&SyncEngine, &GraphStore) -> bool) {
        let Peer {
            engine,
            events,
            store,
        } = self;
        timeout(Duration::from_secs(5), async {
            while !done(&*engine, &*store) {
                let event = events.recv().await.expect("transport channel closed");
                engine.handle_event(store, event, Instant::now());
            }
        })
        .await
        .expect("timed out waiting for condition");
    }
}

fn directory() -> Arc<dyn Directory> {
    Arc::new(MemoryDirectory::new())
}

/// Host with a two-node world and a guest connected to it.
async fn connected_pair() -> (Peer, Peer, RoomCode) {
    let dir = directory();
    let mut host = Peer::new();
    host.store.set_world_name("Eldoria");
    let a = host.store.create_node(NodeType::Character, 0.0, 0.0);
    let b = host.store.create_node(NodeType::Location, 150.0, 80.0);
    host.store.create_link(&a.id, &b.id);

    let code = host.engine.host(dir.clone()).await.unwrap();

    let mut guest = Peer::new();
    guest.engine.join(code.clone(), dir).await.unwrap();

    host.pump_until(|e, _| e.connections().open_count() == 1).await;
    guest.pump_until(|_, s| s.node_count() == 2).await;
    (host, guest, code)
}

#[tokio::test]
async fn test_host_registers_room_endpoint() {
    let dir = directory();
    let mut host = Peer::new();
    let code = host.engine.host(dir.clone()).await.unwrap();
    assert_eq!(dir.resolve(&code.endpoint_name()), host.engine.local_addr());
    assert_eq!(host.engine.status(), &SyncStatus::Hosting { code });
}

#[tokio::test]
async fn test_guest_receives_full_state_on_connect() {
    let (host, guest, _) = connected_pair().await;
    assert_eq!(guest.store.serialize(), host.store.serialize());
    assert_eq!(guest.store.world_name(), "Eldoria");
    assert_eq!(guest.engine.status(), &SyncStatus::Connected { peers: 1 });
    assert_eq!(host.engine.status(), &SyncStatus::Connected { peers: 1 });
}

#[tokio::test]
async fn test_guest_edit_reaches_host() {
    let (mut host, mut guest, _) = connected_pair().await;

    let node = guest.store.create_node(NodeType::Faction, 10.0, 10.0);
    assert_eq!(guest.engine.broadcast_state(&guest.store), 1);

    host.pump_until(|_, s| s.node_count() == 3).await;
    assert!(host.store.node(&node.id).is_some());
    assert_eq!(host.store.serialize(), guest.store.serialize());
}

#[tokio::test]
async fn test_host_edit_reaches_guest() {
    let (mut host, mut guest, _) = connected_pair().await;

    let first = host.store.node_at(0).unwrap().id.clone();
    host.store.delete_node(&first);
    host.engine.broadcast_state(&host.store);

    guest.pump_until(|_, s| s.node_count() == 1).await;
    assert_eq!(guest.store.link_count(), 0);
}

#[tokio::test]
async fn test_join_unknown_room_reports_error() {
    let dir = directory();
    let mut guest = Peer::new();
    guest.engine.join("ZZZZZZ".parse().unwrap(), dir).await.unwrap();
    assert!(matches!(guest.engine.status(), SyncStatus::Joining { .. }));

    guest
        .pump_until(|e, _| matches!(e.status(), SyncStatus::Error(_)))
        .await;
    assert!(guest.store.is_empty());
}

#[tokio::test]
async fn test_wrong_endpoint_path_is_rejected() {
    let dir = directory();
    let mut host = Peer::new();
    host.engine.host(dir).await.unwrap();
    let addr = host.engine.local_addr().unwrap();

    let result = tokio_tungstenite::connect_async(format!("ws://{addr}/nexus-WRONG1?from=x")).await;
    assert!(result.is_err(), "dial to a different endpoint name should fail");
}

#[tokio::test]
async fn test_guest_leaving_returns_host_to_hosting() {
    let (mut host, mut guest, code) = connected_pair().await;
    guest.engine.leave();
    assert_eq!(guest.engine.status(), &SyncStatus::Offline);

    host.pump_until(|e, _| e.connections().open_count() == 0).await;
    assert_eq!(host.engine.status(), &SyncStatus::Hosting { code });
}

#[tokio::test]
async fn test_second_guest_gets_current_state() {
    let (mut host, _guest, code) = connected_pair().await;
    host.store.create_node(NodeType::Lore, 0.0, 0.0);

    let dir = directory();
    // A fresh directory does not know the room; reuse the host's address.
    dir.register(&code.endpoint_name(), host.engine.local_addr().unwrap())
        .unwrap();
    let mut late = Peer::new();
    late.engine.join(code, dir).await.unwrap();

    host.pump_until(|e, _| e.connections().open_count() == 2).await;
    late.pump_until(|_, s| s.node_count() == 3).await;
    assert_eq!(late.store.serialize(), host.store.serialize());
}
