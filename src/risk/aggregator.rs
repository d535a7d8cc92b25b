//! Risk group aggregation.
//!
//! Groups are rebuilt from scratch for every snapshot: classify strategies
//! into groups, score each group, then derive the debt shares that depend on
//! the whole set.

use crate::filter::strategy_name_matches;
use crate::models::{effective_chain, ChainId, RiskGroup, RiskGroupCriteria, Snapshot, Strategy};
use crate::risk::criteria::criteria_for_chain;
use crate::risk::scoring::{
    age_days, criteria_url_params, impact_score, median, ScoringConfig,
};
use serde::Serialize;
use std::cmp::Ordering;
use tracing::debug;

/// Side length of the impact/likelihood matrix.
pub const MATRIX_SIZE: usize = 6;

/// Keys the group list can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskSortKey {
    Name,
    Tvl,
    Impact,
    Median,
}

/// Whether `strategy` belongs to the group defined by `criteria`.
///
/// Exclusion wins over inclusion.
pub fn classify(strategy: &Strategy, criteria: &RiskGroupCriteria) -> bool {
    let patterns = &criteria.criteria;
    if patterns
        .exclude
        .iter()
        .any(|pattern| strategy_name_matches(strategy, pattern))
    {
        return false;
    }
    patterns
        .include
        .iter()
        .any(|pattern| strategy_name_matches(strategy, pattern))
}

/// Score a classified group in place.
fn score_group(group: &mut RiskGroup, criteria: &RiskGroupCriteria, scoring: &ScoringConfig, now_seconds: i64) {
    // Groups without a known activation have no age; they are scored on the curated sub-scores alone.
    group.longevity_score = (group.oldest_activation > 0)
        .then(|| scoring.longevity_score(age_days(group.oldest_activation, now_seconds)));

    let mut sub_scores = group.scores.values().to_vec();
    sub_scores.extend(group.longevity_score);
    group.median_score = median(&sub_scores);
    group.tvl_impact = scoring.tvl_impact(group.tvl);
    group.impact_score = impact_score(group.tvl_impact, group.median_score);
    group.url_params = criteria_url_params(&criteria.criteria);
}

/// Build and score every risk group configured for `chain_id`.
pub fn compute_risk_groups(
    snapshot: &Snapshot,
    chain_id: ChainId,
    criteria: &[RiskGroupCriteria],
    scoring: &ScoringConfig,
    now_seconds: i64,
) -> Vec<RiskGroup> {
    let chain_id = effective_chain(chain_id);
    let mut groups: Vec<RiskGroup> = criteria_for_chain(criteria, chain_id)
        .into_iter()
        .map(|c| {
            let mut group = RiskGroup::empty(c);
            for (_, strategy) in snapshot.strategies() {
                if classify(strategy, c) {
                    group.add_member(strategy);
                }
            }
            score_group(&mut group, c, scoring, now_seconds);
            group
        })
        .collect();

    let total_tvl: f64 = groups.iter().map(|g| g.tvl).sum();
    for group in &mut groups {
        group.total_debt_ratio = if total_tvl > 0.0 {
            group.tvl / total_tvl * 100.0
        } else {
            0.0
        };
    }

    debug!(
        "Computed {} risk groups for chain {} (total TVL {:.2})",
        groups.len(),
        chain_id,
        total_tvl
    );
    groups
}

/// Sort groups by `key`.
pub fn sort_groups(groups: &mut [RiskGroup], key: RiskSortKey, descending: bool) {
    groups.sort_by(|a, b| {
        let ordering = match key {
            RiskSortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            RiskSortKey::Tvl => a.tvl.total_cmp(&b.tvl),
            RiskSortKey::Impact => a.impact_score.total_cmp(&b.impact_score),
            RiskSortKey::Median => a.median_score.total_cmp(&b.median_score),
        };
        let ordering = if descending { ordering.reverse() } else { ordering };
        ordering.then_with(|| a.name.cmp(&b.name))
    });
}

/// Count of groups per (TVL impact, rounded median score) cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RiskMatrix {
    /// `cells[impact][likelihood]`.
    pub cells: [[usize; MATRIX_SIZE]; MATRIX_SIZE],
}

impl RiskMatrix {
    pub fn count(&self, impact: usize, likelihood: usize) -> usize {
        self.cells
            .get(impact)
            .and_then(|row| row.get(likelihood))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.cells.iter().flatten().sum()
    }
}

/// Bucket groups into the impact/likelihood matrix.
pub fn risk_matrix(groups: &[RiskGroup]) -> RiskMatrix {
    let last = MATRIX_SIZE - 1;
    let mut matrix = RiskMatrix::default();
    for group in groups {
        let impact = (group.tvl_impact as usize).min(last);
        let likelihood = match group.median_score.round().partial_cmp(&0.0) {
            Some(Ordering::Greater) => (group.median_score.round() as usize).min(last),
            _ => 0,
        };
        matrix.cells[impact][likelihood] += 1;
    }
    matrix
}
