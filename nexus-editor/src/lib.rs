//! # nexus-editor — interaction layer and session loop
//!
//! - [`controller`] — tool/gesture state machine over the graph store
//! - [`form`] — validated node edit form
//! - [`dispatch`] — buffers store notifications for the session
//! - [`session`] — event loop wiring input, sync and autosave together

pub mod controller;
pub mod dispatch;
pub mod form;
pub mod session;

pub use controller::{
    Gesture, HitTarget, InteractionController, Key, Modifiers, Outcome, Selection, Tool,
};
pub use dispatch::{Dispatcher, Pending};
pub use form::{EditError, EditForm};
pub use session::{LogPresenter, Presenter, Session, SessionConfig};
