//! Data models for review scheduling

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default stability (days) for a card that has never been reviewed
pub const DEFAULT_STABILITY: f64 = 1.0;

/// Default difficulty on the 0-10 scale
pub const DEFAULT_DIFFICULTY: f64 = 5.0;

/// A learner's self-assessed recall quality for one review
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Grade {
    /// Forgot the item
    Again,
    /// Recalled with serious difficulty
    Hard,
    /// Recalled after some hesitation
    Good,
    /// Recalled instantly
    Easy,
}

impl Grade {
    pub const ALL: [Grade; 4] = [Grade::Again, Grade::Hard, Grade::Good, Grade::Easy];

    /// Whether the item was recalled at all
    pub fn is_recalled(self) -> bool {
        self != Grade::Again
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::Again => "again",
            Grade::Hard => "hard",
            Grade::Good => "good",
            Grade::Easy => "easy",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseGradeError(pub String);

impl fmt::Display for ParseGradeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid grade '{}' (expected again/hard/good/easy or 1-4)", self.0)
    }
}

impl std::error::Error for ParseGradeError {}

impl FromStr for Grade {
    type Err = ParseGradeError;

    /// Accepts grade names (case-insensitive) or the button numbers 1-4
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "again" | "1" => Ok(Grade::Again),
            "hard" | "2" => Ok(Grade::Hard),
            "good" | "3" => Ok(Grade::Good),
            "easy" | "4" => Ok(Grade::Easy),
            _ => Err(ParseGradeError(s.to_string())),
        }
    }
}

/// Phase of a card in the spaced repetition lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CardPhase {
    /// Never reviewed
    #[default]
    New,
    /// In initial learning phase
    Learning,
    /// Regular spaced review
    Review,
    /// Failed and re-learning
    Relearning,
}

impl CardPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            CardPhase::New => "new",
            CardPhase::Learning => "learning",
            CardPhase::Review => "review",
            CardPhase::Relearning => "relearning",
        }
    }
}

/// Scheduling state for one (learner, item) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSchedulingState {
    pub item_id: Uuid,
    /// Days until recall probability decays to the reference threshold
    #[serde(default = "default_stability")]
    pub stability: f64,
    /// Intrinsic hardness on a 0-10 scale
    #[serde(default = "default_difficulty")]
    pub difficulty: f64,
    /// When the item is next due for review
    pub due_at: DateTime<Utc>,
    /// Consecutive successful reviews since the last lapse
    #[serde(default)]
    pub repetitions: u32,
    /// Lifetime count of failed reviews
    #[serde(default)]
    pub lapses: u32,
    #[serde(default)]
    pub state: CardPhase,
    /// Review instant that produced this state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reviewed_at: Option<DateTime<Utc>>,
}

fn default_stability() -> f64 {
    DEFAULT_STABILITY
}

fn default_difficulty() -> f64 {
    DEFAULT_DIFFICULTY
}

impl CardSchedulingState {
    /// State for an item on first exposure
    pub fn new(item_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            item_id,
            stability: DEFAULT_STABILITY,
            difficulty: DEFAULT_DIFFICULTY,
            due_at: now,
            repetitions: 0,
            lapses: 0,
            state: CardPhase::New,
            last_reviewed_at: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.due_at
    }
}

/// Kind of items a study session runs over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemType {
    #[default]
    Flashcard,
    Question,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Flashcard => "flashcard",
            ItemType::Question => "question",
        }
    }
}

/// An immutable record of one graded review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEvent {
    pub session_id: Uuid,
    pub item_id: Uuid,
    pub grade: Grade,
    pub graded_at: DateTime<Utc>,
    pub response_time_ms: i64,
}

/// One sitting of reviews
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    pub id: Uuid,
    pub item_type: ItemType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_scope: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_reviews: u32,
    #[serde(default)]
    pub correct_reviews: u32,
}

impl StudySession {
    pub fn new(id: Uuid, item_type: ItemType, course_scope: Option<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            item_type,
            course_scope,
            started_at,
            completed_at: None,
            total_reviews: 0,
            correct_reviews: 0,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Apply closing totals. Returns false if the session was already closed.
    pub fn close(&mut self, totals: &SessionTotals) -> bool {
        if self.is_closed() {
            return false;
        }
        self.total_reviews = totals.total_reviews;
        self.correct_reviews = totals.correct_reviews;
        self.completed_at = Some(totals.completed_at);
        true
    }
}

/// Totals written when a session is closed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTotals {
    pub total_reviews: u32,
    pub correct_reviews: u32,
    pub completed_at: DateTime<Utc>,
}

/// An item queued for review, with its scheduling state if it has one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItem {
    pub item_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<CardSchedulingState>,
}

impl ReviewItem {
    pub fn new(item_id: Uuid) -> Self {
        Self { item_id, state: None }
    }

    pub fn with_state(state: CardSchedulingState) -> Self {
        Self {
            item_id: state.item_id,
            state: Some(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_grade_ordering() {
        assert!(Grade::Again < Grade::Hard);
        assert!(Grade::Hard < Grade::Good);
        assert!(Grade::Good < Grade::Easy);
        assert!(!Grade::Again.is_recalled());
        assert!(Grade::Hard.is_recalled());
    }

    #[test]
    fn test_grade_parse() {
        assert_eq!("again".parse::<Grade>().unwrap(), Grade::Again);
        assert_eq!(" Good ".parse::<Grade>().unwrap(), Grade::Good);
        assert_eq!("4".parse::<Grade>().unwrap(), Grade::Easy);
        assert!("5".parse::<Grade>().is_err());
        assert!("meh".parse::<Grade>().is_err());
    }

    #[test]
    fn test_new_state_defaults() {
        let state = CardSchedulingState::new(Uuid::new_v4(), at(0));
        assert_eq!(state.stability, 1.0);
        assert_eq!(state.difficulty, 5.0);
        assert_eq!(state.state, CardPhase::New);
        assert!(state.is_due(at(0)));
        assert!(state.last_reviewed_at.is_none());
    }

    #[test]
    fn test_state_json_uses_camel_case() {
        let state = CardSchedulingState::new(Uuid::new_v4(), at(0));
        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("dueAt").is_some());
        assert!(json.get("itemId").is_some());
        assert_eq!(json["state"], "new");
        assert!(json.get("lastReviewedAt").is_none());
    }

    #[test]
    fn test_state_missing_fields_use_defaults() {
        let id = Uuid::new_v4();
        let json = format!(r#"{{"itemId":"{}","dueAt":"2024-01-01T00:00:00Z"}}"#, id);
        let state: CardSchedulingState = serde_json::from_str(&json).unwrap();
        assert_eq!(state.stability, DEFAULT_STABILITY);
        assert_eq!(state.difficulty, DEFAULT_DIFFICULTY);
        assert_eq!(state.state, CardPhase::New);
    }

    #[test]
    fn test_session_closes_once() {
        let mut session = StudySession::new(Uuid::new_v4(), ItemType::Flashcard, None, at(0));
        let first = SessionTotals { total_reviews: 3, correct_reviews: 2, completed_at: at(60) };
        let second = SessionTotals { total_reviews: 9, correct_reviews: 9, completed_at: at(120) };

        assert!(session.close(&first));
        assert!(!session.close(&second));
        assert_eq!(session.total_reviews, 3);
        assert_eq!(session.completed_at, Some(at(60)));
    }
}
