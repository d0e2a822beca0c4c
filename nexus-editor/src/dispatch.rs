//! Collects store notifications so the session can act on them after a
//! gesture returns, outside the store's borrow.

use nexus_core::{GraphEvent, GraphStore, ListenerId};
use tokio::sync::mpsc;

/// Everything the store reported since the last drain.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Pending {
    pub events: Vec<GraphEvent>,
    /// Any event at all; the view needs repainting.
    pub redraw: bool,
    /// At least one durable local change: broadcast and save.
    pub changed: bool,
    /// A peer replaced the graph wholesale.
    pub remote_replaced: bool,
}

#[derive(Debug)]
pub struct Dispatcher {
    listener: Option<ListenerId>,
    rx: mpsc::UnboundedReceiver<GraphEvent>,
}

impl Dispatcher {
    /// Subscribe to `store` and start collecting its events.
    pub fn attach(store: &mut GraphStore) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = store.subscribe(move |event| {
            // Receiver gone means the session is shutting down.
            let _ = tx.send(event.clone());
        });
        Self {
            listener: Some(listener),
            rx,
        }
    }

    pub fn detach(&mut self, store: &mut GraphStore) {
        if let Some(id) = self.listener.take() {
            store.unsubscribe(id);
        }
    }

    pub fn drain(&mut self) -> Pending {
        let mut pending = Pending::default();
        while let Ok(event) = self.rx.try_recv() {
            pending.redraw = true;
            pending.changed |= event.marks_change();
            pending.remote_replaced |= event == GraphEvent::RemoteReplaced;
            pending.events.push(event);
        }
        pending
    }
}
