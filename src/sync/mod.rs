//! Snapshot synchronization.
//!
//! The controller owns the committed snapshot and the fetch lifecycle; the
//! persisted module maps snapshots to and from the key-value store.

pub mod controller;
pub mod persisted;

pub use controller::{wait_idle, RefreshHandle, RefreshOutcome, SyncError, SyncState, WatchController};
pub use persisted::{LAST_UPDATE_KEY, NETWORK_KEY, VAULTS_KEY};
