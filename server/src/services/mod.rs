//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own room lifecycle and fan-out so route handlers can stay
//! focused on protocol translation and auth plumbing.

pub mod registry;
pub mod room;
pub mod sweep;
