//! File-backed persistence gateway
//!
//! Directory structure per learner:
//! ```text
//! {root}/{learner}/
//! ├── sessions/
//! │   └── {session-id}.json   # StudySession records
//! ├── states/
//! │   └── {item-id}.json      # Card scheduling state
//! ├── knowledge/
//! │   └── {scope}.json        # Array of knowledge probabilities
//! └── reviews.jsonl           # Append-only review events
//! ```

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::mastery::KnowledgeProbability;

use super::gateway::{GatewayError, PersistenceGateway, Result};
use super::models::*;

/// Stores one learner's review data as JSON files
pub struct FileGateway {
    learner_dir: PathBuf,
}

impl FileGateway {
    pub fn new(root: PathBuf, learner_id: &str) -> Self {
        Self {
            learner_dir: root.join(learner_id),
        }
    }

    fn sessions_dir(&self) -> PathBuf {
        self.learner_dir.join("sessions")
    }

    fn states_dir(&self) -> PathBuf {
        self.learner_dir.join("states")
    }

    fn knowledge_dir(&self) -> PathBuf {
        self.learner_dir.join("knowledge")
    }

    fn reviews_path(&self) -> PathBuf {
        self.learner_dir.join("reviews.jsonl")
    }

    fn session_path(&self, session_id: Uuid) -> PathBuf {
        self.sessions_dir().join(format!("{}.json", session_id))
    }

    fn state_path(&self, item_id: Uuid) -> PathBuf {
        self.states_dir().join(format!("{}.json", item_id))
    }

    fn knowledge_path(&self, scope: &str) -> PathBuf {
        self.knowledge_dir().join(format!("{}.json", scope_file_name(scope)))
    }

    /// Create the learner's directories
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(self.sessions_dir())?;
        fs::create_dir_all(self.states_dir())?;
        fs::create_dir_all(self.knowledge_dir())?;
        Ok(())
    }

    // ==================== Sessions ====================

    pub fn get_session(&self, session_id: Uuid) -> Result<StudySession> {
        let path = self.session_path(session_id);
        if !path.exists() {
            return Err(GatewayError::SessionNotFound(session_id));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_session(&self, session: &StudySession) -> Result<()> {
        self.init()?;
        fs::write(self.session_path(session.id), serde_json::to_string_pretty(session)?)?;
        Ok(())
    }

    /// All sessions, newest first
    pub fn list_sessions(&self) -> Result<Vec<StudySession>> {
        let dir = self.sessions_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                let content = fs::read_to_string(&path)?;
                sessions.push(serde_json::from_str::<StudySession>(&content)?);
            }
        }

        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }

    // ==================== States ====================

    /// Stored state for an item, if it has ever been reviewed
    pub fn get_state(&self, item_id: Uuid) -> Result<Option<CardSchedulingState>> {
        let path = self.state_path(item_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn list_states(&self) -> Result<Vec<CardSchedulingState>> {
        let dir = self.states_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut states = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                let content = fs::read_to_string(&path)?;
                states.push(serde_json::from_str::<CardSchedulingState>(&content)?);
            }
        }
        Ok(states)
    }

    /// States due at `now`, oldest due first
    pub fn due_states(&self, now: DateTime<Utc>) -> Result<Vec<CardSchedulingState>> {
        let mut due: Vec<_> = self
            .list_states()?
            .into_iter()
            .filter(|s| s.is_due(now))
            .collect();
        due.sort_by(|a, b| a.due_at.cmp(&b.due_at));
        Ok(due)
    }

    fn write_state(&self, item_id: Uuid, state: &CardSchedulingState) -> Result<()> {
        if let Some(existing) = self.get_state(item_id)? {
            if existing.last_reviewed_at > state.last_reviewed_at {
                log::debug!(
                    "Ignoring stale state for item {} (stored review {:?}, incoming {:?})",
                    item_id,
                    existing.last_reviewed_at,
                    state.last_reviewed_at,
                );
                return Ok(());
            }
        }

        self.init()?;
        fs::write(self.state_path(item_id), serde_json::to_string_pretty(state)?)?;
        Ok(())
    }

    // ==================== Reviews ====================

    /// All recorded review events in append order
    pub fn list_reviews(&self) -> Result<Vec<ReviewEvent>> {
        let path = self.reviews_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(&path)?);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<ReviewEvent>(trimmed) {
                Ok(event) => events.push(event),
                Err(e) => log::warn!("Skipping malformed review line in {}: {}", path.display(), e),
            }
        }
        Ok(events)
    }

    fn append_review(&self, event: &ReviewEvent) -> Result<()> {
        fs::create_dir_all(&self.learner_dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.reviews_path())?;
        writeln!(file, "{}", serde_json::to_string(event)?)?;
        Ok(())
    }

    // ==================== Knowledge ====================

    /// Replace the knowledge probabilities stored for a scope
    pub fn put_knowledge(&self, scope: &str, probabilities: &[KnowledgeProbability]) -> Result<()> {
        self.init()?;
        fs::write(self.knowledge_path(scope), serde_json::to_string_pretty(probabilities)?)?;
        Ok(())
    }

    fn read_knowledge(&self, scope: &str) -> Result<Vec<KnowledgeProbability>> {
        let path = self.knowledge_path(scope);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Escape path separators so every scope maps to its own file inside the
/// knowledge dir. `%` is escaped as well so two scopes never share a name.
fn scope_file_name(scope: &str) -> String {
    let mut name = String::with_capacity(scope.len());
    for ch in scope.chars() {
        match ch {
            '%' => name.push_str("%25"),
            '/' => name.push_str("%2F"),
            '\\' => name.push_str("%5C"),
            _ => name.push(ch),
        }
    }
    name
}

#[async_trait]
impl PersistenceGateway for FileGateway {
    async fn create_session(&self, item_type: ItemType, course_scope: Option<&str>) -> Result<Uuid> {
        let session = StudySession::new(
            Uuid::new_v4(),
            item_type,
            course_scope.map(str::to_string),
            Utc::now(),
        );
        self.write_session(&session)?;
        Ok(session.id)
    }

    async fn restore_session(&self, session: &StudySession) -> Result<()> {
        if self.session_path(session.id).exists() {
            log::debug!("Session {} already stored", session.id);
            return Ok(());
        }
        self.write_session(session)
    }

    async fn close_session(&self, session_id: Uuid, totals: &SessionTotals) -> Result<()> {
        let mut session = self.get_session(session_id)?;
        if !session.close(totals) {
            log::debug!("Session {} already closed", session_id);
            return Ok(());
        }
        self.write_session(&session)
    }

    async fn record_review(&self, event: &ReviewEvent) -> Result<()> {
        self.append_review(event)
    }

    async fn upsert_scheduling_state(&self, item_id: Uuid, state: &CardSchedulingState) -> Result<()> {
        self.write_state(item_id, state)
    }

    async fn list_knowledge_probabilities(&self, scope: &str) -> Result<Vec<KnowledgeProbability>> {
        self.read_knowledge(scope)
    }
}
