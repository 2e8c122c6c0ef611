//! In-memory gateway for tests

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::mastery::KnowledgeProbability;

use super::gateway::{GatewayError, PersistenceGateway, Result};
use super::models::*;
use super::session::Clock;

#[derive(Default)]
struct Inner {
    sessions: HashMap<Uuid, StudySession>,
    reviews: Vec<ReviewEvent>,
    states: HashMap<Uuid, CardSchedulingState>,
    knowledge: HashMap<String, Vec<KnowledgeProbability>>,
    calls: usize,
    fail_next: usize,
    unavailable: bool,
}

/// Gateway that keeps everything in memory and can simulate outages
#[derive(Default)]
pub struct MemoryGateway {
    inner: Mutex<Inner>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway whose every call fails transiently
    pub fn unavailable() -> Self {
        let gateway = Self::default();
        gateway.set_unavailable(true);
        gateway
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unwrap().unavailable = unavailable;
    }

    /// Fail the next `n` calls transiently
    pub fn fail_next(&self, n: usize) {
        self.inner.lock().unwrap().fail_next = n;
    }

    pub fn calls(&self) -> usize {
        self.inner.lock().unwrap().calls
    }

    pub fn reviews(&self) -> Vec<ReviewEvent> {
        self.inner.lock().unwrap().reviews.clone()
    }

    pub fn state(&self, item_id: Uuid) -> Option<CardSchedulingState> {
        self.inner.lock().unwrap().states.get(&item_id).cloned()
    }

    pub fn session(&self, session_id: Uuid) -> Option<StudySession> {
        self.inner.lock().unwrap().sessions.get(&session_id).cloned()
    }

    pub fn sessions(&self) -> Vec<StudySession> {
        self.inner.lock().unwrap().sessions.values().cloned().collect()
    }

    pub fn put_knowledge(&self, scope: &str, probabilities: Vec<KnowledgeProbability>) {
        self.inner.lock().unwrap().knowledge.insert(scope.to_string(), probabilities);
    }

    /// Count the call and decide whether it should fail
    fn begin(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls += 1;
        if inner.unavailable {
            return Err(GatewayError::Unavailable("store offline".to_string()));
        }
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(GatewayError::Unavailable("transient failure".to_string()));
        }
        Ok(inner)
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn create_session(&self, item_type: ItemType, course_scope: Option<&str>) -> Result<Uuid> {
        let mut inner = self.begin()?;
        let session = StudySession::new(Uuid::new_v4(), item_type, course_scope.map(str::to_string), Utc::now());
        let id = session.id;
        inner.sessions.insert(id, session);
        Ok(id)
    }

    async fn restore_session(&self, session: &StudySession) -> Result<()> {
        self.begin()?
            .sessions
            .entry(session.id)
            .or_insert_with(|| session.clone());
        Ok(())
    }

    async fn close_session(&self, session_id: Uuid, totals: &SessionTotals) -> Result<()> {
        let mut inner = self.begin()?;
        let session = inner
            .sessions
            .get_mut(&session_id)
            .ok_or(GatewayError::SessionNotFound(session_id))?;
        session.close(totals);
        Ok(())
    }

    async fn record_review(&self, event: &ReviewEvent) -> Result<()> {
        self.begin()?.reviews.push(event.clone());
        Ok(())
    }

    async fn upsert_scheduling_state(&self, item_id: Uuid, state: &CardSchedulingState) -> Result<()> {
        let mut inner = self.begin()?;
        let stale = inner
            .states
            .get(&item_id)
            .map_or(false, |existing| existing.last_reviewed_at > state.last_reviewed_at);
        if !stale {
            inner.states.insert(item_id, state.clone());
        }
        Ok(())
    }

    async fn list_knowledge_probabilities(&self, scope: &str) -> Result<Vec<KnowledgeProbability>> {
        Ok(self.begin()?.knowledge.get(scope).cloned().unwrap_or_default())
    }
}

/// Poll `condition` until it holds or about two seconds pass
pub async fn wait_for<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
