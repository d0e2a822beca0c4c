//! Editor session: the single event loop that owns the graph store.
//!
//! ```text
//!  input ──► InteractionController ──► GraphStore ──► Dispatcher
//!                                                        │ flush()
//!              ┌─────────────────────────────────────────┤
//!              ▼                    ▼                    ▼
//!        Presenter (redraw)  SyncEngine (broadcast)  Persistence (save)
//!
//!  TransportEvent ──► SyncEngine::handle_event ──► flush()
//! ```
//!
//! Local durable changes are broadcast and saved. A snapshot received from
//! a peer only redraws; it is neither saved nor re-broadcast.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use nexus_collab::{
    Directory, MemoryDirectory, PresenceRoom, RoomCode, SyncConfig, SyncEngine, SyncError,
    SyncStatus, TransportEvent,
};
use nexus_core::{
    export_world, EditorOptions, EntityId, GraphStore, ImportError, NodeType, Persistence,
    Point, SavedWorld,
};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::controller::{HitTarget, InteractionController, Key, Modifiers, Outcome, Tool};
use crate::dispatch::Dispatcher;
use crate::form::{EditError, EditForm};

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Autosave file
    pub world_path: PathBuf,
    pub sync: SyncConfig,
    /// Fixed rendezvous entries (endpoint name → address)
    pub directory_entries: Vec<(String, SocketAddr)>,
    /// Viewport size in pixels, for centring the camera
    pub viewport: Point,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            world_path: PathBuf::from("nexus-world.json"),
            sync: SyncConfig::default(),
            directory_entries: Vec::new(),
            viewport: Point::new(1280.0, 800.0),
        }
    }
}

/// Where the session reports what the user should see.
pub trait Presenter {
    fn graph_changed(&mut self, _store: &GraphStore) {}
    fn status_changed(&mut self, _status: &SyncStatus) {}
    fn presence_changed(&mut self, _presence: &PresenceRoom) {}
    fn notice(&mut self, _message: &str) {}
    /// Export file contents requested from the keyboard.
    fn export_ready(&mut self, _json: &str) {}
}

/// Headless presenter that writes to the log.
#[derive(Debug, Default)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn graph_changed(&mut self, store: &GraphStore) {
        log::trace!(
            "World '{}': {} nodes, {} links",
            store.world_name(),
            store.node_count(),
            store.link_count()
        );
    }

    fn status_changed(&mut self, status: &SyncStatus) {
        log::info!("{status}");
    }

    fn presence_changed(&mut self, presence: &PresenceRoom) {
        log::debug!("{} remote cursors", presence.len());
    }

    fn notice(&mut self, message: &str) {
        log::warn!("{message}");
    }

    fn export_ready(&mut self, json: &str) {
        log::info!("Export ready ({} bytes)", json.len());
    }
}

pub struct Session {
    store: GraphStore,
    controller: InteractionController,
    engine: SyncEngine,
    dispatcher: Dispatcher,
    directory: Arc<dyn Directory>,
    persistence: Box<dyn Persistence>,
    options: EditorOptions,
    presenter: Box<dyn Presenter>,
    events: Option<UnboundedReceiver<TransportEvent>>,
    /// Camera or options changed since the last save.
    view_dirty: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("store", &self.store)
            .field("engine", &self.engine)
            .field("view_dirty", &self.view_dirty)
            .finish()
    }
}

impl Session {
    /// Load the saved world, falling back to an empty graph when there is
    /// none or it cannot be read.
    pub fn open(
        config: SessionConfig,
        persistence: Box<dyn Persistence>,
        mut presenter: Box<dyn Presenter>,
    ) -> Self {
        let saved = match persistence.load() {
            Ok(saved) => saved.unwrap_or_default(),
            Err(e) => {
                log::error!("Could not load saved world: {e}");
                presenter.notice(&format!("Saved world could not be read: {e}"));
                SavedWorld::default()
            }
        };
        log::info!(
            "Opened world '{}' ({} nodes, {} links)",
            saved.graph.world_name,
            saved.graph.nodes.len(),
            saved.graph.links.len()
        );

        let mut store = GraphStore::from_snapshot(saved.graph);
        let dispatcher = Dispatcher::attach(&mut store);
        let controller = InteractionController::new(saved.cam.unwrap_or_default(), config.viewport);
        let mut engine = SyncEngine::new(config.sync);
        let events = engine.take_event_rx();
        let directory: Arc<dyn Directory> =
            Arc::new(MemoryDirectory::with_entries(config.directory_entries));

        Self {
            store,
            controller,
            engine,
            dispatcher,
            directory,
            persistence,
            options: saved.opts.unwrap_or_default(),
            presenter,
            events,
            view_dirty: false,
        }
    }

    /// Use a shared rendezvous directory instead of the configured entries.
    pub fn with_directory(mut self, directory: Arc<dyn Directory>) -> Self {
        self.directory = directory;
        self
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn controller(&self) -> &InteractionController {
        &self.controller
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn options(&self) -> &EditorOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: EditorOptions) {
        if options != self.options {
            self.options = options;
            self.view_dirty = true;
            self.flush(Outcome::default());
        }
    }

    // ── Input ────────────────────────────────────────────────────

    pub fn pointer_down(&mut self, p: Point, target: HitTarget) {
        let out = self.controller.pointer_down(&mut self.store, p, target);
        self.flush(out);
    }

    /// Also streams the local cursor to peers.
    pub fn pointer_move(&mut self, p: Point) {
        let out = self.controller.pointer_move(&mut self.store, p);
        if self.engine.is_active() {
            self.engine.broadcast_cursor(self.controller.pointer_world());
        }
        // Camera is saved when the pan ends, not on every move.
        self.flush(Outcome {
            camera_moved: false,
            ..out
        });
    }

    pub fn pointer_up(&mut self) {
        let out = self.controller.pointer_up(&mut self.store);
        self.flush(out);
    }

    pub fn wheel(&mut self, p: Point, delta_y: f64) {
        let out = self.controller.wheel(p, delta_y);
        self.flush(out);
    }

    pub fn double_click(&mut self, p: Point, target: HitTarget) -> Option<EntityId> {
        let id = self.controller.double_click(&mut self.store, p, target);
        self.flush(Outcome::default());
        id
    }

    /// Sidebar "add" button: a node of `kind` at the viewport centre.
    pub fn create_node(&mut self, kind: NodeType) -> EntityId {
        let id = self.controller.create_node(&mut self.store, kind);
        self.flush(Outcome::default());
        id
    }

    /// Sidebar "go to": select the node and centre the camera on it.
    pub fn focus_node(&mut self, id: &EntityId) {
        let out = self.controller.focus_node(&self.store, id);
        self.flush(out);
    }

    pub fn key(&mut self, key: Key, mods: Modifiers) {
        let out = self.controller.key(&mut self.store, key, mods);
        self.flush(out);
    }

    pub fn set_tool(&mut self, tool: Tool) {
        let out = self.controller.set_tool(tool);
        self.flush(out);
    }

    pub fn start_connection_from(&mut self, id: &EntityId) {
        let out = self.controller.start_connection_from(&self.store, id);
        self.flush(out);
    }

    pub fn duplicate(&mut self, id: &EntityId) -> Option<EntityId> {
        let copy = self.controller.duplicate(&mut self.store, id);
        self.flush(Outcome::default());
        copy
    }

    pub fn commit_edit(&mut self, id: &EntityId, form: EditForm) -> Result<bool, EditError> {
        let result = self.controller.commit_edit(&mut self.store, id, form);
        self.flush(Outcome::default());
        result
    }

    pub fn set_link_label(&mut self, id: &EntityId, label: &str) -> bool {
        let changed = self.store.set_link_label(id, label);
        self.flush(Outcome::default());
        changed
    }

    pub fn rename_world(&mut self, name: &str) {
        self.store.set_world_name(name);
        self.flush(Outcome::default());
    }

    pub fn clear(&mut self) {
        self.store.clear();
        self.controller.reconcile(&self.store);
        self.flush(Outcome::default());
    }

    // ── Import / export ──────────────────────────────────────────

    /// Replace the world with an exported file. On error nothing changes.
    pub fn import_json(&mut self, json: &str) -> Result<(), ImportError> {
        if let Err(e) = self.store.import_json(json) {
            self.presenter.notice(&e.to_string());
            return Err(e);
        }
        self.controller.reconcile(&self.store);
        self.flush(Outcome::default());
        Ok(())
    }

    pub fn export_json(&self) -> serde_json::Result<String> {
        export_world(&self.store.serialize())
    }

    // ── Collaboration ────────────────────────────────────────────

    pub async fn host(&mut self) -> Result<RoomCode, SyncError> {
        let result = self.engine.host(self.directory.clone()).await;
        self.report_status();
        result
    }

    pub async fn join(&mut self, code: RoomCode) -> Result<(), SyncError> {
        let result = self.engine.join(code, self.directory.clone()).await;
        self.report_status();
        result
    }

    pub fn leave(&mut self) {
        self.engine.leave();
        self.report_status();
        self.presenter.presence_changed(self.engine.presence());
    }

    fn report_status(&mut self) {
        self.presenter.status_changed(self.engine.status());
    }

    pub fn handle_transport(&mut self, event: TransportEvent) {
        let handled = self.engine.handle_event(&mut self.store, event, Instant::now());
        if let Some(status) = &handled.status {
            self.presenter.status_changed(status);
        }
        if handled.presence_changed {
            self.presenter.presence_changed(self.engine.presence());
        }
        self.flush(Outcome::default());
    }

    /// Wait for and handle one transport event. Returns `false` once the
    /// event stream is gone.
    pub async fn process_next(&mut self) -> bool {
        let Some(events) = self.events.as_mut() else {
            return false;
        };
        match events.recv().await {
            Some(event) => {
                self.handle_transport(event);
                true
            }
            None => false,
        }
    }

    pub fn sweep(&mut self) {
        let evicted = self.engine.sweep_presence(Instant::now());
        if !evicted.is_empty() {
            log::debug!("Evicted {} silent peers", evicted.len());
            self.presenter.presence_changed(self.engine.presence());
        }
    }

    /// Drive transport events and presence sweeps until `shutdown`
    /// resolves, then leave the session and save.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) {
        let Some(mut events) = self.events.take() else {
            log::error!("Session event loop already running");
            return;
        };
        let mut sweep = tokio::time::interval(self.engine.sweep_interval());
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                Some(event) = events.recv() => self.handle_transport(event),
                _ = sweep.tick() => self.sweep(),
                _ = &mut shutdown => break,
            }
        }

        self.events = Some(events);
        self.leave();
        self.save();
    }

    // ── Change propagation ───────────────────────────────────────

    fn flush(&mut self, outcome: Outcome) {
        let pending = self.dispatcher.drain();
        if pending.remote_replaced {
            self.controller.reconcile(&self.store);
        }
        self.view_dirty |= outcome.camera_moved;

        if pending.changed {
            self.engine.broadcast_state(&self.store);
            self.save();
        } else if self.view_dirty {
            self.save();
        }

        if pending.redraw || outcome.redraw {
            self.presenter.graph_changed(&self.store);
        }

        if outcome.export_requested {
            match self.export_json() {
                Ok(json) => self.presenter.export_ready(&json),
                Err(e) => self.presenter.notice(&format!("Export failed: {e}")),
            }
        }
    }

    /// Write the world, camera and options. Failures are reported, not
    /// propagated; the session keeps running.
    pub fn save(&mut self) {
        let world = SavedWorld {
            graph: self.store.serialize(),
            cam: Some(*self.controller.camera()),
            opts: Some(self.options.clone()),
        };
        match self.persistence.save(&world) {
            Ok(()) => self.view_dirty = false,
            Err(e) => {
                log::error!("Autosave failed: {e}");
                self.presenter.notice(&format!("Autosave failed: {e}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::{Camera, GraphSnapshot, MemoryStore, PersistError};
    use std::sync::Mutex;

    /// Persistence that records every save for inspection.
    #[derive(Clone, Default)]
    struct Recorder {
        saves: Arc<Mutex<Vec<SavedWorld>>>,
        initial: Option<SavedWorld>,
    }

    impl Recorder {
        fn count(&self) -> usize {
            self.saves.lock().unwrap().len()
        }

        fn last(&self) -> SavedWorld {
            self.saves.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl Persistence for Recorder {
        fn save(&mut self, world: &SavedWorld) -> Result<(), PersistError> {
            self.saves.lock().unwrap().push(world.clone());
            Ok(())
        }

        fn load(&self) -> Result<Option<SavedWorld>, PersistError> {
            Ok(self.initial.clone())
        }
    }

    #[derive(Clone, Default)]
    struct Notes(Arc<Mutex<Vec<String>>>);

    impl Presenter for Notes {
        fn notice(&mut self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    fn session(recorder: &Recorder) -> (Session, Notes) {
        let notes = Notes::default();
        let s = Session::open(
            SessionConfig::default(),
            Box::new(recorder.clone()),
            Box::new(notes.clone()),
        );
        (s, notes)
    }

    #[test]
    fn test_drag_saves_once() {
        let recorder = Recorder::default();
        let (mut s, _) = session(&recorder);
        let id = s.double_click(Point::new(0.0, 0.0), HitTarget::Canvas).unwrap();
        assert_eq!(recorder.count(), 1);

        s.pointer_down(Point::ZERO, HitTarget::Node(id.clone()));
        for i in 1..=5 {
            s.pointer_move(Point::new(i as f64 * 10.0, 0.0));
        }
        assert_eq!(recorder.count(), 1);
        s.pointer_up();
        assert_eq!(recorder.count(), 2);
        assert_eq!(recorder.last().graph.nodes[0].x, 50.0);
    }

    #[test]
    fn test_pan_saves_camera_on_release() {
        let recorder = Recorder::default();
        let (mut s, _) = session(&recorder);
        s.pointer_down(Point::ZERO, HitTarget::Canvas);
        s.pointer_move(Point::new(25.0, 5.0));
        s.pointer_move(Point::new(50.0, 10.0));
        assert_eq!(recorder.count(), 0);
        s.pointer_up();
        assert_eq!(recorder.count(), 1);
        assert_eq!(
            recorder.last().cam,
            Some(Camera {
                pan_x: 50.0,
                pan_y: 10.0,
                zoom: 1.0
            })
        );
    }

    #[test]
    fn test_invalid_import_leaves_graph() {
        let recorder = Recorder::default();
        let (mut s, notes) = session(&recorder);
        s.double_click(Point::ZERO, HitTarget::Canvas);
        let before = s.store().serialize();

        assert!(s.import_json("{ not json").is_err());
        assert_eq!(s.store().serialize(), before);
        assert_eq!(recorder.count(), 1);
        assert_eq!(notes.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_import_replaces_and_saves() {
        let recorder = Recorder::default();
        let (mut s, _) = session(&recorder);
        let json = r#"{"worldName":"Eldoria","nodes":[{"id":"a","type":"location","name":"Keep"}],"links":[]}"#;
        s.import_json(json).unwrap();
        assert_eq!(s.store().world_name(), "Eldoria");
        assert_eq!(recorder.last().graph.nodes.len(), 1);
    }

    #[tokio::test]
    async fn test_remote_snapshot_does_not_save() {
        let dir: Arc<dyn Directory> = Arc::new(MemoryDirectory::new());
        let mut host = Session::open(
            SessionConfig::default(),
            Box::new(MemoryStore::new()),
            Box::new(LogPresenter),
        )
        .with_directory(dir.clone());
        host.rename_world("Remote");
        host.create_node(NodeType::Event);
        host.create_node(NodeType::Lore);

        let recorder = Recorder::default();
        let (guest, _) = session(&recorder);
        let mut guest = guest.with_directory(dir);
        let id = guest.double_click(Point::ZERO, HitTarget::Canvas).unwrap();
        guest.pointer_down(Point::ZERO, HitTarget::Node(id));
        let saves = recorder.count();

        let code = host.host().await.unwrap();
        guest.join(code).await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while host.engine().connections().open_count() == 0 {
                assert!(host.process_next().await);
            }
            while guest.store().world_name() != "Remote" {
                assert!(guest.process_next().await);
            }
        })
        .await
        .unwrap();

        assert_eq!(guest.store().node_count(), 2);
        assert_eq!(recorder.count(), saves);
        assert_eq!(guest.controller().selected_node(), None);
    }

    #[test]
    fn test_create_node_of_type_saves_and_selects() {
        let recorder = Recorder::default();
        let (mut s, _) = session(&recorder);
        let id = s.create_node(NodeType::Location);
        let node = s.store().node(&id).unwrap();
        assert_eq!(node.kind, NodeType::Location);
        // Default viewport is 1280x800 under the identity camera.
        assert_eq!(node.position(), Point::new(640.0, 400.0));
        assert_eq!(s.controller().selected_node(), Some(&id));
        assert_eq!(recorder.count(), 1);
    }

    #[test]
    fn test_focus_node_centres_and_saves_camera() {
        let recorder = Recorder::default();
        let (mut s, _) = session(&recorder);
        let id = s.double_click(Point::new(100.0, 50.0), HitTarget::Canvas).unwrap();
        s.key(Key::Escape, Modifiers::NONE);
        s.focus_node(&id);
        assert_eq!(s.controller().selected_node(), Some(&id));
        assert_eq!(s.controller().camera().pan(), Point::new(540.0, 350.0));
        assert_eq!(recorder.last().cam.unwrap().pan_x, 540.0);
    }

    #[test]
    fn test_ctrl_s_hands_export_to_presenter() {
        let exports = Arc::new(Mutex::new(Vec::new()));
        struct Exports(Arc<Mutex<Vec<String>>>);
        impl Presenter for Exports {
            fn export_ready(&mut self, json: &str) {
                self.0.lock().unwrap().push(json.to_string());
            }
        }

        let mut s = Session::open(
            SessionConfig::default(),
            Box::new(MemoryStore::new()),
            Box::new(Exports(exports.clone())),
        );
        s.rename_world("Eldoria");
        s.key(Key::Char('s'), Modifiers::CTRL);

        let exports = exports.lock().unwrap();
        assert_eq!(exports.len(), 1);
        let snapshot = nexus_core::import_world(&exports[0]).unwrap();
        assert_eq!(snapshot.world_name, "Eldoria");
    }

    #[test]
    fn test_malformed_saved_world_opens_empty() {
        let notes = Notes::default();
        let s = Session::open(
            SessionConfig::default(),
            Box::new(MemoryStore::with_raw("{ broken")),
            Box::new(notes.clone()),
        );
        assert!(s.store().is_empty());
        assert_eq!(notes.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_saved_world_restores_camera_and_options() {
        let mut opts = EditorOptions::default();
        opts.theme = "dark".into();
        let recorder = Recorder {
            initial: Some(SavedWorld {
                graph: GraphSnapshot::default(),
                cam: Some(Camera {
                    pan_x: 5.0,
                    pan_y: 6.0,
                    zoom: 2.0,
                }),
                opts: Some(opts.clone()),
            }),
            ..Default::default()
        };
        let (s, _) = session(&recorder);
        assert_eq!(s.controller().camera().zoom, 2.0);
        assert_eq!(s.options(), &opts);
    }
}
