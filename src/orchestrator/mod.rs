//! Session orchestration modules.
//!
//! Covers the per-session status broadcast channel, the session state
//! machine, admission control and routing, and retention-based eviction.

pub mod channel;
pub mod retention;
pub mod session_manager;
pub mod state_machine;
