//! Interaction controller: the tool and gesture state machine that turns
//! pointer, wheel and keyboard input into graph store mutations.
//!
//! Pointer positions are absolute viewport pixels; the controller converts
//! them to world space with its camera and viewport origin. Hit testing is
//! the presentation layer's job, which reports what was under the pointer
//! as a [`HitTarget`].

use nexus_core::camera::{WHEEL_ZOOM_IN, WHEEL_ZOOM_OUT};
use nexus_core::{screen_to_world, Camera, EntityId, GraphStore, NodeType, Point};

use crate::form::{EditError, EditForm};

/// Arrow-key nudge distance in world units.
pub const NUDGE_STEP: f64 = 8.0;
/// Nudge distance with Shift held.
pub const NUDGE_STEP_LARGE: f64 = 40.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Tool {
    #[default]
    Select,
    Connect,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Gesture {
    #[default]
    Idle,
    /// Connect tool with a source chosen, waiting for a target.
    ConnectArmed { source: EntityId },
    /// `origin` is the node's position and `grab` the world-space pointer
    /// when the drag started, so every move computes an absolute position.
    DraggingNode {
        id: EntityId,
        origin: Point,
        grab: Point,
        moved: bool,
    },
    PanningCamera { start_pointer: Point, start_pan: Point },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    None,
    Node(EntityId),
    Link(EntityId),
}

/// What was under the pointer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HitTarget {
    Node(EntityId),
    Link(EntityId),
    Canvas,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Escape,
    Delete,
    Backspace,
    Tab,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Char(char),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        ctrl: false,
    };
    pub const SHIFT: Modifiers = Modifiers {
        shift: true,
        ctrl: false,
    };
    pub const CTRL: Modifiers = Modifiers {
        shift: false,
        ctrl: true,
    };
}

/// View-level effects of an input. Graph changes are reported separately
/// through the store's events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Selection, gesture or camera changed.
    pub redraw: bool,
    /// Camera changed and should be persisted.
    pub camera_moved: bool,
    /// Ctrl-S: the user asked for an export file.
    pub export_requested: bool,
}

impl Outcome {
    fn redraw() -> Self {
        Self {
            redraw: true,
            ..Self::default()
        }
    }

    fn camera() -> Self {
        Self {
            redraw: true,
            camera_moved: true,
            ..Self::default()
        }
    }

    fn export() -> Self {
        Self {
            export_requested: true,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct InteractionController {
    tool: Tool,
    gesture: Gesture,
    selection: Selection,
    camera: Camera,
    /// Top-left of the viewport in the coordinates pointer events use.
    origin: Point,
    viewport: Point,
    /// Last pointer position, world space.
    pointer: Point,
    /// Rubber-band end while armed, world space.
    rubber_band: Option<Point>,
}

impl InteractionController {
    pub fn new(camera: Camera, viewport: Point) -> Self {
        Self {
            tool: Tool::Select,
            gesture: Gesture::Idle,
            selection: Selection::None,
            camera,
            origin: Point::ZERO,
            viewport,
            pointer: Point::ZERO,
            rubber_band: None,
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selected_node(&self) -> Option<&EntityId> {
        match &self.selection {
            Selection::Node(id) => Some(id),
            _ => None,
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn pointer_world(&self) -> Point {
        self.pointer
    }

    /// Armed source and the current rubber-band end, if connecting.
    pub fn rubber_band(&self) -> Option<(&EntityId, Point)> {
        match (&self.gesture, self.rubber_band) {
            (Gesture::ConnectArmed { source }, Some(end)) => Some((source, end)),
            _ => None,
        }
    }

    pub fn set_viewport(&mut self, origin: Point, size: Point) {
        self.origin = origin;
        self.viewport = size;
    }

    fn to_world(&self, p: Point) -> Point {
        screen_to_world(p, &self.camera, self.origin)
    }

    // ── Tools ────────────────────────────────────────────────────

    /// Switch tools. Any switch cancels an armed connection.
    pub fn set_tool(&mut self, tool: Tool) -> Outcome {
        self.cancel_connection();
        self.tool = tool;
        log::debug!("Tool: {tool:?}");
        Outcome::redraw()
    }

    fn cancel_connection(&mut self) -> bool {
        if matches!(self.gesture, Gesture::ConnectArmed { .. }) {
            self.gesture = Gesture::Idle;
            self.rubber_band = None;
            true
        } else {
            false
        }
    }

    /// Context-menu "connect from here".
    pub fn start_connection_from(&mut self, store: &GraphStore, id: &EntityId) -> Outcome {
        let Some(node) = store.node(id) else {
            return Outcome::default();
        };
        self.tool = Tool::Connect;
        self.gesture = Gesture::ConnectArmed { source: id.clone() };
        self.selection = Selection::Node(id.clone());
        self.rubber_band = Some(node.position());
        Outcome::redraw()
    }

    // ── Pointer ──────────────────────────────────────────────────

    pub fn pointer_down(&mut self, store: &mut GraphStore, p: Point, target: HitTarget) -> Outcome {
        let world = self.to_world(p);
        self.pointer = world;

        let target = match target {
            HitTarget::Node(id) if store.node(&id).is_none() => HitTarget::Canvas,
            HitTarget::Link(id) if store.link(&id).is_none() => HitTarget::Canvas,
            t => t,
        };

        match (self.tool, target) {
            (Tool::Connect, HitTarget::Node(id)) => {
                match std::mem::take(&mut self.gesture) {
                    Gesture::ConnectArmed { source } if source == id => {
                        log::debug!("Connection cancelled");
                    }
                    Gesture::ConnectArmed { source } => {
                        store.create_link(&source, &id);
                    }
                    _ => {
                        self.gesture = Gesture::ConnectArmed { source: id.clone() };
                        self.selection = Selection::Node(id);
                        self.rubber_band = Some(world);
                        return Outcome::redraw();
                    }
                }
                self.rubber_band = None;
                Outcome::redraw()
            }
            (Tool::Connect, HitTarget::Canvas) if self.cancel_connection() => Outcome::redraw(),
            (Tool::Select, HitTarget::Node(id)) => {
                let origin = store.node(&id).map(|n| n.position()).unwrap_or(world);
                self.selection = Selection::Node(id.clone());
                self.gesture = Gesture::DraggingNode {
                    id,
                    origin,
                    grab: world,
                    moved: false,
                };
                Outcome::redraw()
            }
            (_, HitTarget::Link(id)) => {
                self.cancel_connection();
                self.selection = Selection::Link(id);
                Outcome::redraw()
            }
            (_, HitTarget::Canvas) => {
                self.selection = Selection::None;
                self.gesture = Gesture::PanningCamera {
                    start_pointer: p,
                    start_pan: self.camera.pan(),
                };
                Outcome::redraw()
            }
        }
    }

    pub fn pointer_move(&mut self, store: &mut GraphStore, p: Point) -> Outcome {
        let world = self.to_world(p);
        self.pointer = world;

        match &mut self.gesture {
            Gesture::DraggingNode {
                id,
                origin,
                grab,
                moved,
            } => {
                let x = origin.x + (world.x - grab.x);
                let y = origin.y + (world.y - grab.y);
                if store.drag_node(id, x, y) {
                    *moved = true;
                }
                Outcome::redraw()
            }
            Gesture::PanningCamera {
                start_pointer,
                start_pan,
            } => {
                self.camera.pan_x = start_pan.x + (p.x - start_pointer.x);
                self.camera.pan_y = start_pan.y + (p.y - start_pointer.y);
                Outcome::camera()
            }
            Gesture::ConnectArmed { .. } => {
                self.rubber_band = Some(world);
                Outcome::redraw()
            }
            Gesture::Idle => Outcome::default(),
        }
    }

    /// Ends a drag or pan. A drag that moved its node emits the single
    /// durable change notification here.
    pub fn pointer_up(&mut self, store: &mut GraphStore) -> Outcome {
        match std::mem::take(&mut self.gesture) {
            Gesture::DraggingNode { moved, .. } => {
                if moved {
                    store.end_gesture();
                }
                Outcome::default()
            }
            Gesture::PanningCamera { .. } => Outcome::camera(),
            armed @ Gesture::ConnectArmed { .. } => {
                self.gesture = armed;
                Outcome::default()
            }
            Gesture::Idle => Outcome::default(),
        }
    }

    /// Wheel zoom about the pointer. Positive `delta_y` zooms out.
    pub fn wheel(&mut self, p: Point, delta_y: f64) -> Outcome {
        if delta_y == 0.0 {
            return Outcome::default();
        }
        let factor = if delta_y > 0.0 { WHEEL_ZOOM_OUT } else { WHEEL_ZOOM_IN };
        let local = Point::new(p.x - self.origin.x, p.y - self.origin.y);
        self.camera.zoom_at(local, factor);
        Outcome::camera()
    }

    /// Double-click on empty canvas creates a character node there.
    pub fn double_click(&mut self, store: &mut GraphStore, p: Point, target: HitTarget) -> Option<EntityId> {
        if target != HitTarget::Canvas {
            return None;
        }
        let world = self.to_world(p);
        let node = store.create_node(NodeType::Character, world.x, world.y);
        self.selection = Selection::Node(node.id.clone());
        Some(node.id)
    }

    // ── Keyboard ─────────────────────────────────────────────────

    pub fn key(&mut self, store: &mut GraphStore, key: Key, mods: Modifiers) -> Outcome {
        match key {
            Key::Escape => {
                if !self.cancel_connection() {
                    self.selection = Selection::None;
                }
                Outcome::redraw()
            }
            Key::Char('s') | Key::Char('S') if mods.ctrl => Outcome::export(),
            Key::Char('s') | Key::Char('S') => self.set_tool(Tool::Select),
            Key::Char('c') | Key::Char('C') if !mods.ctrl => self.set_tool(Tool::Connect),
            Key::Delete | Key::Backspace => self.delete_selected(store),
            Key::Tab => self.cycle_selection(store, mods.shift),
            Key::ArrowUp | Key::ArrowDown | Key::ArrowLeft | Key::ArrowRight => {
                let step = if mods.shift { NUDGE_STEP_LARGE } else { NUDGE_STEP };
                let (dx, dy) = match key {
                    Key::ArrowUp => (0.0, -step),
                    Key::ArrowDown => (0.0, step),
                    Key::ArrowLeft => (-step, 0.0),
                    _ => (step, 0.0),
                };
                self.nudge(store, dx, dy)
            }
            Key::Char(_) => Outcome::default(),
        }
    }

    pub fn delete_selected(&mut self, store: &mut GraphStore) -> Outcome {
        match std::mem::take(&mut self.selection) {
            Selection::Node(id) => {
                store.delete_node(&id);
            }
            Selection::Link(id) => {
                store.delete_link(&id);
            }
            Selection::None => return Outcome::default(),
        }
        self.reconcile(store);
        Outcome::redraw()
    }

    fn nudge(&mut self, store: &mut GraphStore, dx: f64, dy: f64) -> Outcome {
        let Some(id) = self.selected_node().cloned() else {
            return Outcome::default();
        };
        let Some(pos) = store.node(&id).map(|n| n.position()) else {
            return Outcome::default();
        };
        store.move_node(&id, pos.x + dx, pos.y + dy);
        Outcome::redraw()
    }

    /// Tab / Shift-Tab through nodes in insertion order, wrapping, and
    /// centre the camera on the new selection.
    fn cycle_selection(&mut self, store: &GraphStore, backwards: bool) -> Outcome {
        let n = store.node_count();
        if n == 0 {
            return Outcome::default();
        }
        let current = self.selected_node().and_then(|id| store.node_index(id));
        let next = match (current, backwards) {
            (Some(i), false) => (i + 1) % n,
            (Some(i), true) => (i + n - 1) % n,
            (None, false) => 0,
            (None, true) => n - 1,
        };
        let Some(id) = store.node_at(next).map(|n| n.id.clone()) else {
            return Outcome::default();
        };
        self.focus_node(store, &id)
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Select a node and centre the camera on it.
    pub fn focus_node(&mut self, store: &GraphStore, id: &EntityId) -> Outcome {
        let Some(node) = store.node(id) else {
            return Outcome::default();
        };
        self.selection = Selection::Node(id.clone());
        self.camera.center_on(node.position(), self.viewport);
        Outcome::camera()
    }

    /// Create a node of `kind` under the centre of the viewport and select it.
    pub fn create_node(&mut self, store: &mut GraphStore, kind: NodeType) -> EntityId {
        let centre = Point::new(
            self.origin.x + self.viewport.x / 2.0,
            self.origin.y + self.viewport.y / 2.0,
        );
        let world = self.to_world(centre);
        let node = store.create_node(kind, world.x, world.y);
        self.selection = Selection::Node(node.id.clone());
        node.id
    }

    /// Validate and apply an edit form. On error the store is untouched.
    pub fn commit_edit(&mut self, store: &mut GraphStore, id: &EntityId, form: EditForm) -> Result<bool, EditError> {
        let update = form.into_update()?;
        Ok(store.update_node(id, update))
    }

    /// Context-menu "duplicate". The copy becomes the selection.
    pub fn duplicate(&mut self, store: &mut GraphStore, id: &EntityId) -> Option<EntityId> {
        let copy = store.duplicate_node(id)?;
        self.selection = Selection::Node(copy.id.clone());
        Some(copy.id)
    }

    /// Drop references to entities that no longer exist, e.g. after a
    /// remote snapshot replaced the graph.
    pub fn reconcile(&mut self, store: &GraphStore) {
        let stale_selection = match &self.selection {
            Selection::Node(id) => store.node(id).is_none(),
            Selection::Link(id) => store.link(id).is_none(),
            Selection::None => false,
        };
        if stale_selection {
            self.selection = Selection::None;
        }

        let stale_gesture = match &self.gesture {
            Gesture::ConnectArmed { source } => store.node(source).is_none(),
            Gesture::DraggingNode { id, .. } => store.node(id).is_none(),
            _ => false,
        };
        if stale_gesture {
            log::debug!("Cancelling gesture on a removed node");
            self.gesture = Gesture::Idle;
            self.rubber_band = None;
        }
    }
}
