//! Mastery aggregation
//!
//! Folds per-subtopic knowledge probabilities into the coarse mastery signal
//! shown next to a concept. Knowledge probabilities are produced elsewhere;
//! this module only reads them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mean p_know at or above which a concept counts as mastered
pub const MASTERED_THRESHOLD: f64 = 0.80;

/// Mean p_know at or above which a concept counts as being learned
pub const LEARNING_THRESHOLD: f64 = 0.50;

/// Value reported when there is nothing to aggregate
pub const UNKNOWN_VALUE: f64 = -1.0;

/// Knowledge estimate for one concept subpart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeProbability {
    pub subtopic_id: String,
    pub p_know: f64,
    #[serde(default)]
    pub total_attempts: u32,
    #[serde(default)]
    pub correct_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl KnowledgeProbability {
    pub fn new(subtopic_id: impl Into<String>, p_know: f64) -> Self {
        Self {
            subtopic_id: subtopic_id.into(),
            p_know,
            total_attempts: 0,
            correct_attempts: 0,
            last_attempt_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MasteryBucket {
    Mastered,
    Learning,
    Weak,
    Unknown,
}

impl MasteryBucket {
    pub fn label(self) -> &'static str {
        match self {
            MasteryBucket::Mastered => "Mastered",
            MasteryBucket::Learning => "Learning",
            MasteryBucket::Weak => "Weak",
            MasteryBucket::Unknown => "Unknown",
        }
    }

    fn from_value(value: f64) -> Self {
        if value >= MASTERED_THRESHOLD {
            MasteryBucket::Mastered
        } else if value >= LEARNING_THRESHOLD {
            MasteryBucket::Learning
        } else {
            MasteryBucket::Weak
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterySummary {
    pub bucket: MasteryBucket,
    /// Mean p_know, or -1 when unknown
    pub value: f64,
}

impl MasterySummary {
    pub fn unknown() -> Self {
        Self {
            bucket: MasteryBucket::Unknown,
            value: UNKNOWN_VALUE,
        }
    }
}

/// Aggregate knowledge probabilities into a mastery bucket and mean value.
///
/// Probabilities outside `[0, 1]` are clamped and non-finite ones skipped;
/// if nothing usable remains the result is `Unknown`.
pub fn aggregate(probabilities: &[KnowledgeProbability]) -> MasterySummary {
    let (sum, count) = probabilities
        .iter()
        .map(|p| p.p_know)
        .filter(|p| p.is_finite())
        .fold((0.0, 0usize), |(sum, count), p| (sum + p.clamp(0.0, 1.0), count + 1));

    if count == 0 {
        return MasterySummary::unknown();
    }

    let value = sum / count as f64;
    MasterySummary {
        bucket: MasteryBucket::from_value(value),
        value,
    }
}
