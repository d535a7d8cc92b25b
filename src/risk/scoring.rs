//! Scoring primitives for risk groups.
//!
//! Tier tables are configuration; the functions here only guarantee the
//! ordering properties the engine relies on.

use crate::models::PatternCriteria;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::form_urlencoded;

pub const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Error, PartialEq)]
pub enum ScoringError {
    #[error("{table} tiers must be sorted by threshold (tier {index})")]
    Unsorted { table: &'static str, index: usize },

    #[error("{table} tier scores must not decrease (tier {index})")]
    Decreasing { table: &'static str, index: usize },

    #[error("{table} tiers must not be empty")]
    Empty { table: &'static str },
}

/// Longevity tier: groups at least `min_days` old score `score`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LongevityTier {
    pub min_days: f64,
    pub score: f64,
}

/// TVL tier: groups with at least `min_tvl` USD get `impact`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TvlTier {
    pub min_tvl: f64,
    pub impact: u32,
}

/// Threshold tables for the computed sub-metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_longevity_tiers")]
    pub longevity_tiers: Vec<LongevityTier>,

    #[serde(default = "default_tvl_tiers")]
    pub tvl_tiers: Vec<TvlTier>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            longevity_tiers: default_longevity_tiers(),
            tvl_tiers: default_tvl_tiers(),
        }
    }
}

fn default_longevity_tiers() -> Vec<LongevityTier> {
    [(0.0, 1.0), (7.0, 2.0), (30.0, 3.0), (120.0, 4.0), (240.0, 5.0)]
        .into_iter()
        .map(|(min_days, score)| LongevityTier { min_days, score })
        .collect()
}

fn default_tvl_tiers() -> Vec<TvlTier> {
    [
        (0.0, 1),
        (1_000_000.0, 2),
        (10_000_000.0, 3),
        (50_000_000.0, 4),
        (100_000_000.0, 5),
    ]
    .into_iter()
    .map(|(min_tvl, impact)| TvlTier { min_tvl, impact })
    .collect()
}

fn check_tiers(
    table: &'static str,
    tiers: impl Iterator<Item = (f64, f64)>,
) -> Result<(), ScoringError> {
    let mut previous: Option<(f64, f64)> = None;
    let mut seen = 0;
    for (index, (threshold, score)) in tiers.enumerate() {
        if let Some((prev_threshold, prev_score)) = previous {
            if threshold.partial_cmp(&prev_threshold) != Some(std::cmp::Ordering::Greater) {
                return Err(ScoringError::Unsorted { table, index });
            }
            if score < prev_score {
                return Err(ScoringError::Decreasing { table, index });
            }
        }
        previous = Some((threshold, score));
        seen += 1;
    }
    if seen == 0 {
        return Err(ScoringError::Empty { table });
    }
    Ok(())
}

impl ScoringConfig {
    /// Reject tables that would break monotonicity.
    pub fn validate(&self) -> Result<(), ScoringError> {
        check_tiers(
            "longevity",
            self.longevity_tiers.iter().map(|t| (t.min_days, t.score)),
        )?;
        check_tiers(
            "tvl",
            self.tvl_tiers.iter().map(|t| (t.min_tvl, f64::from(t.impact))),
        )
    }

    /// Score for a group whose oldest member is `age_days` old.
    ///
    /// Non-decreasing in `age_days` for a validated table.
    pub fn longevity_score(&self, age_days: f64) -> f64 {
        self.longevity_tiers
            .iter()
            .take_while(|tier| age_days >= tier.min_days)
            .last()
            .or(self.longevity_tiers.first())
            .map_or(0.0, |tier| tier.score)
    }

    /// Impact class of an aggregate TVL. Zero TVL is always class 0.
    pub fn tvl_impact(&self, tvl: f64) -> u32 {
        if tvl <= 0.0 || tvl.is_nan() {
            return 0;
        }
        self.tvl_tiers
            .iter()
            .take_while(|tier| tvl >= tier.min_tvl)
            .last()
            .map_or(0, |tier| tier.impact)
    }
}

/// Age in days between an activation timestamp and `now_seconds`.
pub fn age_days(oldest_activation: u64, now_seconds: i64) -> f64 {
    let age = now_seconds.saturating_sub(i64::try_from(oldest_activation).unwrap_or(i64::MAX));
    age.max(0) as f64 / SECONDS_PER_DAY
}

/// Median of `values`; the mean of the two middle values for even counts.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Composite impact score; never decreases when either input grows.
pub fn impact_score(tvl_impact: u32, median_score: f64) -> f64 {
    f64::from(tvl_impact) * median_score.max(0.0)
}

/// Query-string form of a group's criteria, for deep links.
pub fn criteria_url_params(criteria: &PatternCriteria) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    if !criteria.exclude.is_empty() {
        serializer.append_pair("exclude", &criteria.exclude.join(","));
    }
    if !criteria.include.is_empty() {
        serializer.append_pair("include", &criteria.include.join(","));
    }
    serializer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median() {
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]), 4.0);
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
        assert_eq!(median(&[5.0, 1.0, 3.0]), 3.0);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn test_impact_score_is_monotonic() {
        let medians = [0.0, 0.5, 1.0, 2.5, 3.0, 4.5, 5.0];
        for impact in 0..5u32 {
            for window in medians.windows(2) {
                assert!(impact_score(impact, window[1]) >= impact_score(impact, window[0]));
            }
            for median in medians {
                assert!(impact_score(impact + 1, median) >= impact_score(impact, median));
            }
        }
        assert!(impact_score(2, -1.0) >= impact_score(1, -1.0));
    }

    #[test]
    fn test_longevity_score_is_non_decreasing() {
        let config = ScoringConfig::default();
        let mut previous = f64::MIN;
        for day in 0..400 {
            let score = config.longevity_score(day as f64);
            assert!(score >= previous, "score dropped at day {}", day);
            previous = score;
        }
        assert_eq!(config.longevity_score(0.0), 1.0);
        assert_eq!(config.longevity_score(365.0), 5.0);
    }

    #[test]
    fn test_tvl_impact() {
        let config = ScoringConfig::default();
        assert_eq!(config.tvl_impact(0.0), 0);
        assert_eq!(config.tvl_impact(10.0), 1);
        assert_eq!(config.tvl_impact(2_000_000.0), 2);
        assert_eq!(config.tvl_impact(75_000_000.0), 4);
        assert_eq!(config.tvl_impact(1e12), 5);
    }

    #[test]
    fn test_validate() {
        assert!(ScoringConfig::default().validate().is_ok());

        let mut config = ScoringConfig::default();
        config.longevity_tiers.swap(1, 2);
        assert!(matches!(
            config.validate(),
            Err(ScoringError::Unsorted { table: "longevity", .. })
        ));

        let mut config = ScoringConfig::default();
        config.tvl_tiers[4].impact = 0;
        assert!(matches!(
            config.validate(),
            Err(ScoringError::Decreasing { table: "tvl", index: 4 })
        ));

        let mut config = ScoringConfig::default();
        config.tvl_tiers.clear();
        assert_eq!(config.validate(), Err(ScoringError::Empty { table: "tvl" }));
    }

    #[test]
    fn test_age_days() {
        assert_eq!(age_days(1_000, 1_000 + 86_400 * 3), 3.0);
        assert_eq!(age_days(2_000, 1_000), 0.0);
    }

    #[test]
    fn test_criteria_url_params() {
        let criteria = PatternCriteria {
            include: vec!["Curve".to_string(), "Convex Finance".to_string()],
            exclude: vec!["stETH".to_string()],
        };
        assert_eq!(
            criteria_url_params(&criteria),
            "exclude=stETH&include=Curve%2CConvex+Finance"
        );
        assert_eq!(criteria_url_params(&PatternCriteria::default()), "");
    }
}
