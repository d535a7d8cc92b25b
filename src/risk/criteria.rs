//! Loading of the static risk-group definitions.

use crate::config::RiskConfig;
use crate::models::{effective_chain, ChainId, RiskGroupCriteria};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

/// Definitions shipped with the binary.
const BUILTIN_CRITERIA: &str = include_str!("../../data/risks.json");

/// Load a JSON array of risk-group definitions.
pub fn load_criteria(path: &Path) -> Result<Vec<RiskGroupCriteria>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read risk criteria: {}", path.display()))?;

    let criteria: Vec<RiskGroupCriteria> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse risk criteria: {}", path.display()))?;

    Ok(criteria)
}

/// Definitions used when no criteria file is configured.
pub fn builtin_criteria() -> Result<Vec<RiskGroupCriteria>> {
    serde_json::from_str(BUILTIN_CRITERIA).context("Failed to parse built-in risk criteria")
}

/// The criteria file (or the built-in set) followed by inline groups.
pub fn resolve_criteria(config: &RiskConfig) -> Result<Vec<RiskGroupCriteria>> {
    let mut criteria = match config.criteria_file {
        Some(ref path) => load_criteria(path)?,
        None => builtin_criteria()?,
    };
    criteria.extend(config.groups.iter().cloned());
    debug!("Loaded {} risk group definitions", criteria.len());
    Ok(criteria)
}

/// Definitions that apply to `chain_id`.
pub fn criteria_for_chain(criteria: &[RiskGroupCriteria], chain_id: ChainId) -> Vec<&RiskGroupCriteria> {
    let chain_id = effective_chain(chain_id);
    criteria.iter().filter(|c| c.network == chain_id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RISK_JSON: &str = r#"[
        {
            "name": "Curve",
            "network": 1,
            "criteria": {"nameLike": ["curve", "crv"], "exclude": ["convex"]},
            "auditScore": 1, "codeReviewScore": 1, "testingScore": 2,
            "protocolSafetyScore": 2, "complexityScore": 3, "teamKnowledgeScore": 1
        },
        {
            "name": "Spookyswap",
            "network": 250,
            "criteria": {"include": ["spooky"], "exclude": []},
            "auditScore": 3, "codeReviewScore": 3, "testingScore": 3,
            "protocolSafetyScore": 3, "complexityScore": 3, "teamKnowledgeScore": 3
        }
    ]"#;

    #[test]
    fn test_load_criteria() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("risk.json");
        std::fs::write(&path, RISK_JSON).unwrap();

        let criteria = load_criteria(&path).unwrap();
        assert_eq!(criteria.len(), 2);
        assert_eq!(criteria[0].criteria.include, vec!["curve", "crv"]);
        assert_eq!(criteria[1].criteria.include, vec!["spooky"]);
        assert_eq!(criteria[1].scores.complexity_score, 3.0);
    }

    #[test]
    fn test_load_criteria_missing_file() {
        let err = load_criteria(Path::new("/nonexistent/risk.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read risk criteria"));
    }

    #[test]
    fn test_builtin_criteria_parse() {
        let criteria = builtin_criteria().unwrap();
        assert!(!criteria_for_chain(&criteria, 1).is_empty());
        assert!(!criteria_for_chain(&criteria, 250).is_empty());
    }

    #[test]
    fn test_resolve_criteria_appends_inline_groups() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("risk.json");
        std::fs::write(&path, RISK_JSON).unwrap();

        let mut inline: Vec<RiskGroupCriteria> = serde_json::from_str(RISK_JSON).unwrap();
        inline.truncate(1);
        inline[0].name = "Inline".to_string();
        let config = RiskConfig {
            criteria_file: Some(path),
            groups: inline,
        };

        let names: Vec<_> = resolve_criteria(&config)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Curve", "Spookyswap", "Inline"]);
    }

    #[test]
    fn test_criteria_for_chain() {
        let criteria: Vec<RiskGroupCriteria> = serde_json::from_str(RISK_JSON).unwrap();
        assert_eq!(criteria_for_chain(&criteria, 0)[0].name, "Curve");
        assert_eq!(criteria_for_chain(&criteria, 250)[0].name, "Spookyswap");
        assert!(criteria_for_chain(&criteria, 10).is_empty());
    }
}
