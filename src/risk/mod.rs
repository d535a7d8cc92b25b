//! Strategy-group risk scoring.
//!
//! Groups are defined by static include/exclude name patterns plus curated
//! sub-scores; this module classifies the current snapshot into those
//! groups and derives the composite scores.

pub mod aggregator;
pub mod criteria;
pub mod scoring;

pub use aggregator::{compute_risk_groups, risk_matrix, sort_groups, RiskMatrix, RiskSortKey, MATRIX_SIZE};
pub use criteria::{builtin_criteria, criteria_for_chain, load_criteria, resolve_criteria};
pub use scoring::{ScoringConfig, ScoringError};
