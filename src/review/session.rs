//! Review session controller
//!
//! Runs one sitting over a fixed queue of items. The controller keeps the
//! current item, times each answer, applies the scheduling algorithm and hands
//! every result to the dispatcher without waiting on the store. A session
//! that is never finished simply never gets a completion time.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::algorithm::next_state;
use super::dispatch::{Dispatcher, PersistJob};
use super::gateway::PersistenceGateway;
use super::models::*;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum SessionError {
    #[error("No session is active")]
    NoActiveSession,

    #[error("Session {got} is not the active session {active}")]
    StaleSession { active: Uuid, got: Uuid },

    #[error("Item {got} is not the current item {current}")]
    NotCurrentItem { current: Uuid, got: Uuid },

    #[error("Session is already complete")]
    AlreadyComplete,
}

/// Identifies the session a grade belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHandle {
    id: Uuid,
    local: bool,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// True when the store could not open the session and the id was made up locally
    pub fn is_local(&self) -> bool {
        self.local
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub item_type: ItemType,
    pub course_scope: Option<String>,
    /// How long to wait for the store to open a session before going local
    pub create_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            item_type: ItemType::Flashcard,
            course_scope: None,
            create_timeout: Duration::from_secs(5),
        }
    }
}

/// Result of grading one item
#[derive(Debug, Clone)]
pub struct GradeOutcome {
    pub event: ReviewEvent,
    pub state: CardSchedulingState,
    /// Set when this grade finished the session
    pub completed: Option<SessionTotals>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total: usize,
    pub graded: usize,
    pub correct: usize,
    pub remaining: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_response_ms: Option<f64>,
}

pub struct ReviewController {
    gateway: Arc<dyn PersistenceGateway>,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    options: SessionOptions,
    queue: Vec<ReviewItem>,
    position: usize,
    grades: Vec<Grade>,
    events: Vec<ReviewEvent>,
    session: Option<StudySession>,
    handle: Option<SessionHandle>,
    shown_at: Option<DateTime<Utc>>,
}

impl ReviewController {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, dispatcher: Dispatcher, options: SessionOptions) -> Self {
        Self::with_clock(gateway, dispatcher, options, Arc::new(SystemClock))
    }

    pub fn with_clock(
        gateway: Arc<dyn PersistenceGateway>,
        dispatcher: Dispatcher,
        options: SessionOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateway,
            dispatcher,
            clock,
            options,
            queue: Vec::new(),
            position: 0,
            grades: Vec::new(),
            events: Vec::new(),
            session: None,
            handle: None,
            shown_at: None,
        }
    }

    /// Begin a sitting over `items`.
    ///
    /// An empty queue is ignored and returns `None`. If the store cannot open
    /// the session in time, a local id is used so grading is never blocked.
    pub async fn start_session(&mut self, items: Vec<ReviewItem>) -> Option<SessionHandle> {
        if items.is_empty() {
            log::debug!("Ignoring request to start a session with no items");
            return None;
        }

        let created = tokio::time::timeout(
            self.options.create_timeout,
            self.gateway
                .create_session(self.options.item_type, self.options.course_scope.as_deref()),
        )
        .await;

        let handle = match created {
            Ok(Ok(id)) => SessionHandle { id, local: false },
            Ok(Err(e)) => {
                let id = Uuid::new_v4();
                log::warn!("Failed to open study session, continuing locally as {}: {}", id, e);
                SessionHandle { id, local: true }
            }
            Err(_) => {
                let id = Uuid::new_v4();
                log::warn!(
                    "Opening study session timed out after {:?}, continuing locally as {}",
                    self.options.create_timeout,
                    id,
                );
                SessionHandle { id, local: true }
            }
        };

        let now = self.clock.now();
        log::info!("Started session {} with {} items", handle.id, items.len());

        self.queue = items;
        self.position = 0;
        self.grades.clear();
        self.events.clear();
        self.session = Some(StudySession::new(
            handle.id,
            self.options.item_type,
            self.options.course_scope.clone(),
            now,
        ));
        self.handle = Some(handle);
        self.shown_at = Some(now);

        // The store never saw a local id; queue the record ahead of any grade
        if handle.local {
            if let Some(session) = &self.session {
                self.dispatcher.submit(PersistJob::OpenSession {
                    session: session.clone(),
                });
            }
        }

        Some(handle)
    }

    /// Grade the current item.
    ///
    /// Nothing changes if the handle, session or item do not match.
    pub fn grade(&mut self, handle: &SessionHandle, item_id: Uuid, grade: Grade) -> Result<GradeOutcome, SessionError> {
        let active = self.handle.ok_or(SessionError::NoActiveSession)?;
        if active.id != handle.id {
            return Err(SessionError::StaleSession { active: active.id, got: handle.id });
        }
        let current = self.queue.get(self.position).ok_or(SessionError::AlreadyComplete)?;
        if current.item_id != item_id {
            return Err(SessionError::NotCurrentItem { current: current.item_id, got: item_id });
        }

        let now = self.clock.now();
        let shown_at = self.shown_at.unwrap_or(now);
        let response_time_ms = (now - shown_at).num_milliseconds().max(0);

        let state = current
            .state
            .clone()
            .unwrap_or_else(|| CardSchedulingState::new(item_id, shown_at));
        let next = next_state(&state, grade, now);

        let event = ReviewEvent {
            session_id: active.id,
            item_id,
            grade,
            graded_at: now,
            response_time_ms,
        };

        // Later repeats of the same item in this queue start from the new state
        for item in self.queue[self.position..].iter_mut().filter(|i| i.item_id == item_id) {
            item.state = Some(next.clone());
        }
        self.grades.push(grade);
        self.events.push(event.clone());

        self.dispatcher.submit(PersistJob::RecordReview { event: event.clone() });
        self.dispatcher.submit(PersistJob::UpsertState {
            item_id,
            state: next.clone(),
        });

        self.position += 1;
        self.shown_at = Some(now);

        let completed = if self.position == self.queue.len() {
            self.close(now)
        } else {
            None
        };

        Ok(GradeOutcome {
            event,
            state: next,
            completed,
        })
    }

    /// Start over on the same queue with a fresh session.
    ///
    /// States already handed to the store are left alone; the queue keeps
    /// the states produced so far.
    pub async fn restart(&mut self) -> Option<SessionHandle> {
        let items = std::mem::take(&mut self.queue);
        if items.is_empty() {
            return None;
        }
        self.start_session(items).await
    }

    /// Close the session exactly once
    fn close(&mut self, now: DateTime<Utc>) -> Option<SessionTotals> {
        let session = self.session.as_mut()?;
        let totals = SessionTotals {
            total_reviews: self.queue.len() as u32,
            correct_reviews: self.grades.iter().filter(|g| g.is_recalled()).count() as u32,
            completed_at: now,
        };
        if !session.close(&totals) {
            return None;
        }

        log::info!(
            "Completed session {}: {}/{} recalled",
            session.id,
            totals.correct_reviews,
            totals.total_reviews,
        );
        self.dispatcher.submit(PersistJob::CloseSession {
            session_id: session.id,
            totals,
        });
        Some(totals)
    }

    /// The item waiting for a grade
    pub fn current_item(&self) -> Option<&ReviewItem> {
        self.handle?;
        self.queue.get(self.position)
    }

    pub fn is_complete(&self) -> bool {
        self.session.as_ref().map_or(false, StudySession::is_closed)
    }

    pub fn handle(&self) -> Option<SessionHandle> {
        self.handle
    }

    pub fn session(&self) -> Option<&StudySession> {
        self.session.as_ref()
    }

    pub fn events(&self) -> &[ReviewEvent] {
        &self.events
    }

    pub fn stats(&self) -> SessionStats {
        let graded = self.grades.len();
        let average_response_ms = if self.events.is_empty() {
            None
        } else {
            let total: i64 = self.events.iter().map(|e| e.response_time_ms).sum();
            Some(total as f64 / self.events.len() as f64)
        };

        SessionStats {
            total: self.queue.len(),
            graded,
            correct: self.grades.iter().filter(|g| g.is_recalled()).count(),
            remaining: self.queue.len().saturating_sub(self.position),
            average_response_ms,
        }
    }
}
