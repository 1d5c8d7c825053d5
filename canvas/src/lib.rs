//! Client-side reconciliation engine for the shared drawing surface.
//!
//! The engine owns a participant's view of the canvas: it turns local
//! gestures into wire [`actions::Action`]s, applies actions received from the
//! room without re-sending them, and keeps a linear undo/redo stack of
//! full-canvas snapshots. It has no transport and no renderer; the host
//! drains [`engine::EngineCore::take_outbound`] into its socket and
//! [`engine::EngineCore::drain_events`] into its renderer.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | Top-level [`engine::EngineCore`], events, errors |
//! | [`doc`] | Ordered in-memory document store |
//! | [`history`] | Snapshot undo/redo stack |
//! | [`ids`] | Session-scoped object id generation |
//! | [`input`] | Tools, tool settings, and the gesture state machine |

pub mod doc;
pub mod engine;
pub mod history;
pub mod ids;
pub mod input;

pub use engine::{CanvasEvent, EngineConfig, EngineCore, EngineError};
pub use input::Tool;
