//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `EntryState`: Where a popped queue entry is in the per-entry state machine
//! - `DropReason`: Why an entry left the state machine early
//! - `HostState`: Per-host request timing used by the politeness throttle

mod entry_state;
mod host_state;

// Re-export main types
pub use entry_state::{DropReason, EntryState};
pub use host_state::HostState;
