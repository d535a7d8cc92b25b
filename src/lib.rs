//! vaultwatch library.
//!
//! Snapshot synchronization for vault/strategy data, strategy-group risk
//! scoring and the report layer used by the `vaultwatch` binary.

pub mod cli;
pub mod codec;
pub mod config;
pub mod filter;
pub mod models;
pub mod report;
pub mod risk;
pub mod source;
pub mod storage;
pub mod sync;

pub use config::Config;
pub use models::{RiskGroup, Snapshot, Strategy, Vault};
pub use sync::{RefreshOutcome, SyncError, WatchController};
