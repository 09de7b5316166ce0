//! Hot reload: file watching and rebuild coalescing.
//!
//! ```text
//! notify ─► bridge thread ─► Debouncer ─► observes()? ─► RebuildGate ─► build()
//! ```
//!
//! The watcher starts before the initial build, so changes made while it
//! runs are queued rather than lost.

mod debouncer;
mod gate;
mod watcher;

pub use gate::{Admission, RebuildGate};
pub use watcher::watch;
