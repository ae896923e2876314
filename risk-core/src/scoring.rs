//! Risk Scoring
//!
//! Maps keyword counters to a bounded score and a score to a coarse level.
//! The agent uses this for local logging only; the collector re-derives the
//! level from the reported score and treats its own result as authoritative.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// THRESHOLDS
// ============================================================================

/// Upper bound of the score scale
pub const MAX_SCORE: f64 = 10.0;

/// Minimum score classified as `critical`
pub const CRITICAL_THRESHOLD: f64 = 8.0;

/// Minimum score classified as `high`
pub const HIGH_THRESHOLD: f64 = 6.0;

/// Minimum score classified as `medium`
pub const MEDIUM_THRESHOLD: f64 = 3.0;

// ============================================================================
// TYPES
// ============================================================================

/// Ordinal risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// High and critical windows warrant an alert
    pub fn is_alerting(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown level name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRiskLevel(pub String);

impl fmt::Display for UnknownRiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown risk level: {}", self.0)
    }
}

impl std::error::Error for UnknownRiskLevel {}

impl FromStr for RiskLevel {
    type Err = UnknownRiskLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(UnknownRiskLevel(s.to_string())),
        }
    }
}

// ============================================================================
// SCORING
// ============================================================================

/// Score a window of input events.
///
/// Linear in the flagged ratio: 0% flagged scores 0.0, 100% flagged scores 10.0.
/// Rounded to two decimals. An empty window scores 0.0.
pub fn score(flagged: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }

    let raw = flagged as f64 / total as f64 * MAX_SCORE;
    round2(raw).clamp(0.0, MAX_SCORE)
}

/// Classify a score. Evaluated highest-first, so each boundary belongs to the upper level.
pub fn level(score: f64) -> RiskLevel {
    if score >= CRITICAL_THRESHOLD {
        RiskLevel::Critical
    } else if score >= HIGH_THRESHOLD {
        RiskLevel::High
    } else if score >= MEDIUM_THRESHOLD {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Bring an arbitrary reported score into the valid range
pub fn normalize(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, MAX_SCORE)
}

/// Round half away from zero to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_reference_points() {
        assert_eq!(score(0, 0), 0.0);
        assert_eq!(score(5, 10), 5.0);
        assert_eq!(score(10, 10), 10.0);
        assert_eq!(score(0, 250), 0.0);
    }

    #[test]
    fn test_score_rounds_to_two_decimals() {
        // 1/3 * 10 = 3.333...
        assert_eq!(score(1, 3), 3.33);
        // 2/3 * 10 = 6.666...
        assert_eq!(score(2, 3), 6.67);
    }

    #[test]
    fn test_score_is_bounded() {
        assert_eq!(score(20, 10), 10.0);
    }

    #[test]
    fn test_score_monotonic_in_flagged() {
        let total = 37;
        let mut previous = 0.0;
        for flagged in 0..=total {
            let s = score(flagged, total);
            assert!(s >= previous, "score dropped at flagged={}", flagged);
            previous = s;
        }
    }

    #[test]
    fn test_level_boundaries() {
        assert_eq!(level(7.99), RiskLevel::High);
        assert_eq!(level(8.0), RiskLevel::Critical);
        assert_eq!(level(2.99), RiskLevel::Low);
        assert_eq!(level(3.0), RiskLevel::Medium);
        assert_eq!(level(6.0), RiskLevel::High);
        assert_eq!(level(5.99), RiskLevel::Medium);
        assert_eq!(level(0.0), RiskLevel::Low);
        assert_eq!(level(10.0), RiskLevel::Critical);
    }

    #[test]
    fn test_alerting_levels() {
        assert!(!RiskLevel::Low.is_alerting());
        assert!(!RiskLevel::Medium.is_alerting());
        assert!(RiskLevel::High.is_alerting());
        assert!(RiskLevel::Critical.is_alerting());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(-1.0), 0.0);
        assert_eq!(normalize(42.0), 10.0);
        assert_eq!(normalize(f64::NAN), 0.0);
        assert_eq!(normalize(6.5), 6.5);
    }

    #[test]
    fn test_level_parse_and_display() {
        for lvl in RiskLevel::ALL {
            assert_eq!(lvl.as_str().parse::<RiskLevel>(), Ok(lvl));
            assert_eq!(lvl.to_string(), lvl.as_str());
        }
        assert_eq!("CRITICAL".parse::<RiskLevel>(), Ok(RiskLevel::Critical));
        assert!("severe".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn test_level_serde_lowercase() {
        let json = serde_json::to_string(&RiskLevel::High).unwrap();
        assert_eq!(json, "\"high\"");
    }
}
