use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_EXCELLENT_MATCH_RATE: f64 = 0.90;
pub const DEFAULT_GOOD_MATCH_RATE: f64 = 0.70;
pub const DEFAULT_FAIR_MATCH_RATE: f64 = 0.50;
pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.80;
pub const DEFAULT_HEURISTIC_PREFIX_LEN: usize = 3;
pub const MIN_HEURISTIC_PREFIX_LEN: usize = 2;
pub const DEFAULT_TEMPLATE_ID_PATTERN: &str = r"^[A-Za-z]{2,4}\d+$";
pub const DEFAULT_BUILTIN_SURVEY_PREFIX: &str = "builtin";
pub const DEFAULT_FALLBACK_SURVEY_PREFIX: &str = "legacy";
pub const UNKNOWN_SURVEY_ID: &str = "unknown";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityThresholds {
    pub excellent: f64,
    pub good: f64,
    pub fair: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            excellent: DEFAULT_EXCELLENT_MATCH_RATE,
            good: DEFAULT_GOOD_MATCH_RATE,
            fair: DEFAULT_FAIR_MATCH_RATE,
        }
    }
}

/// Policy knobs for resolution, quality grading and legacy inference.
/// Every field may be omitted from a config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub quality_thresholds: QualityThresholds,
    pub overlap_threshold: f64,
    pub heuristic_prefix_len: usize,
    pub template_id_pattern: String,
    pub builtin_survey_prefix: String,
    pub fallback_survey_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quality_thresholds: QualityThresholds::default(),
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
            heuristic_prefix_len: DEFAULT_HEURISTIC_PREFIX_LEN,
            template_id_pattern: DEFAULT_TEMPLATE_ID_PATTERN.to_string(),
            builtin_survey_prefix: DEFAULT_BUILTIN_SURVEY_PREFIX.to_string(),
            fallback_survey_prefix: DEFAULT_FALLBACK_SURVEY_PREFIX.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid engine config: {}", path.display()))?;

        info!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let thresholds = &self.quality_thresholds;
        if !(0.0..=1.0).contains(&thresholds.fair)
            || !(0.0..=1.0).contains(&thresholds.good)
            || !(0.0..=1.0).contains(&thresholds.excellent)
        {
            bail!("quality thresholds must lie within [0, 1]");
        }
        if thresholds.fair > thresholds.good || thresholds.good > thresholds.excellent {
            bail!(
                "quality thresholds must be ordered fair <= good <= excellent (got {} / {} / {})",
                thresholds.fair,
                thresholds.good,
                thresholds.excellent
            );
        }
        if !(0.0..=1.0).contains(&self.overlap_threshold) {
            bail!(
                "overlap_threshold must lie within [0, 1] (got {})",
                self.overlap_threshold
            );
        }
        if self.heuristic_prefix_len < MIN_HEURISTIC_PREFIX_LEN {
            bail!(
                "heuristic_prefix_len must be at least {MIN_HEURISTIC_PREFIX_LEN} (got {})",
                self.heuristic_prefix_len
            );
        }
        self.compile_template_id_pattern()?;
        Ok(())
    }

    pub fn compile_template_id_pattern(&self) -> Result<Regex> {
        Regex::new(&self.template_id_pattern).with_context(|| {
            format!(
                "failed to compile template id pattern: {}",
                self.template_id_pattern
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_remaining_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "overlap_threshold": 0.6 }"#).expect("config parses");
        assert_eq!(config.overlap_threshold, 0.6);
        assert_eq!(config.heuristic_prefix_len, DEFAULT_HEURISTIC_PREFIX_LEN);
        assert_eq!(config.quality_thresholds, QualityThresholds::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_unordered_thresholds() {
        let config = EngineConfig {
            quality_thresholds: QualityThresholds {
                excellent: 0.5,
                good: 0.7,
                fair: 0.3,
            },
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_short_prefix_and_bad_pattern() {
        let short = EngineConfig {
            heuristic_prefix_len: 1,
            ..EngineConfig::default()
        };
        assert!(short.validate().is_err());

        let broken = EngineConfig {
            template_id_pattern: "([a-z".to_string(),
            ..EngineConfig::default()
        };
        assert!(broken.validate().is_err());
    }
}
