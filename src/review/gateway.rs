//! Persistence gateway
//!
//! The review core writes sessions, review events and scheduling states
//! through this trait. Implementations own the storage format and are
//! expected to apply last-write-wins per (learner, item).

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::mastery::KnowledgeProbability;

use super::models::{CardSchedulingState, ItemType, ReviewEvent, SessionTotals, StudySession};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Rejected by store: {0}")]
    Rejected(String),
}

impl GatewayError {
    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Io(_) | GatewayError::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Store that review state is persisted to
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Open a study session and return its id
    async fn create_session(&self, item_type: ItemType, course_scope: Option<&str>) -> Result<Uuid>;

    /// Store a session that was opened while the store was unreachable.
    /// A session that already exists is left as it is.
    async fn restore_session(&self, session: &StudySession) -> Result<()>;

    /// Close a session with its final totals
    async fn close_session(&self, session_id: Uuid, totals: &SessionTotals) -> Result<()>;

    /// Append a review event
    async fn record_review(&self, event: &ReviewEvent) -> Result<()>;

    /// Insert or replace the scheduling state of an item
    async fn upsert_scheduling_state(&self, item_id: Uuid, state: &CardSchedulingState) -> Result<()>;

    /// Knowledge probabilities for every subtopic under a scope
    async fn list_knowledge_probabilities(&self, scope: &str) -> Result<Vec<KnowledgeProbability>>;
}
