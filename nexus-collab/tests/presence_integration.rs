//! Integration tests for cursor presence over real connections.

use std::sync::Arc;
use std::time::Instant;

use nexus_collab::{
    Directory, MemoryDirectory, PeerIdentity, SyncConfig, SyncEngine, TransportEvent,
    LIVENESS_WINDOW,
};
use nexus_core::{GraphStore, Point};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{timeout, Duration};

async fn pump_until(
    engine: &mut SyncEngine,
    events: &mut UnboundedReceiver<TransportEvent>,
    store: &mut GraphStore,
    mut done: impl FnMut(&SyncEngine) -> bool,
) {
    timeout(Duration::from_secs(5), async {
        while !done(&*engine) {
            let event = events.recv().await.expect("transport channel closed");
            engine.handle_event(store, event, Instant::now());
        }
    })
    .await
    .expect("timed out waiting for condition");
}

fn engine(id: &str, color: &str) -> (SyncEngine, UnboundedReceiver<TransportEvent>) {
    let mut engine = SyncEngine::with_identity(SyncConfig::default(), PeerIdentity::with_id(id, color));
    let rx = engine.take_event_rx().unwrap();
    (engine, rx)
}

#[tokio::test]
async fn test_cursor_creates_presence_on_host() {
    let dir: Arc<dyn Directory> = Arc::new(MemoryDirectory::new());
    let (mut host, mut host_rx) = engine("host", "#d4557a");
    let (mut guest, mut guest_rx) = engine("guest", "#20b870");
    let mut host_store = GraphStore::new();
    let mut guest_store = GraphStore::new();

    let code = host.host(dir.clone()).await.unwrap();
    guest.join(code, dir).await.unwrap();
    pump_until(&mut host, &mut host_rx, &mut host_store, |e| e.connections().open_count() == 1).await;
    pump_until(&mut guest, &mut guest_rx, &mut guest_store, |e| e.connections().open_count() == 1).await;

    assert_eq!(guest.broadcast_cursor(Point::new(42.0, -7.5)), 1);
    pump_until(&mut host, &mut host_rx, &mut host_store, |e| e.presence().get("guest").is_some()).await;

    let entry = host.presence().get("guest").unwrap();
    assert_eq!(entry.color, "#20b870");
    assert_eq!(entry.position, Point::new(42.0, -7.5));
    assert!(host_store.is_empty(), "presence must not touch the graph");

    // Host cursor flows the other way.
    host.broadcast_cursor(Point::new(1.0, 2.0));
    pump_until(&mut guest, &mut guest_rx, &mut guest_store, |e| e.presence().get("host").is_some()).await;
    assert!(guest.presence().get("guest").is_none());
}

#[tokio::test]
async fn test_presence_evicted_after_silence() {
    let dir: Arc<dyn Directory> = Arc::new(MemoryDirectory::new());
    let (mut host, mut host_rx) = engine("host", "#d4557a");
    let (mut guest, mut guest_rx) = engine("guest", "#20b870");
    let mut host_store = GraphStore::new();
    let mut guest_store = GraphStore::new();

    let code = host.host(dir.clone()).await.unwrap();
    guest.join(code, dir).await.unwrap();
    pump_until(&mut guest, &mut guest_rx, &mut guest_store, |e| e.connections().open_count() == 1).await;

    guest.broadcast_cursor(Point::ZERO);
    pump_until(&mut host, &mut host_rx, &mut host_store, |e| e.presence().get("guest").is_some()).await;

    let seen = host.presence().get("guest").unwrap().last_seen;
    assert!(host.sweep_presence(seen + Duration::from_millis(4000)).is_empty());
    let evicted = host.sweep_presence(seen + LIVENESS_WINDOW + Duration::from_millis(1));
    assert_eq!(evicted, vec!["guest".to_string()]);
    assert!(host.presence().is_empty());
}
