//! Hand-off of persistence work from the session controller
//!
//! The controller never waits on the store. Each job is either spawned
//! straight at the gateway (best effort) or appended to the local outbox and
//! delivered later by the flusher.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::gateway::{self, PersistenceGateway};
use super::models::{CardSchedulingState, ReviewEvent, SessionTotals, StudySession};
use super::outbox::Outbox;

/// One unit of persistence work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PersistJob {
    /// Session opened under a local id, queued so the store learns about it
    OpenSession {
        session: StudySession,
    },
    RecordReview {
        event: ReviewEvent,
    },
    #[serde(rename_all = "camelCase")]
    UpsertState {
        item_id: Uuid,
        state: CardSchedulingState,
    },
    #[serde(rename_all = "camelCase")]
    CloseSession {
        session_id: Uuid,
        totals: SessionTotals,
    },
}

impl PersistJob {
    pub async fn apply(&self, gateway: &dyn PersistenceGateway) -> gateway::Result<()> {
        match self {
            PersistJob::OpenSession { session } => gateway.restore_session(session).await,
            PersistJob::RecordReview { event } => gateway.record_review(event).await,
            PersistJob::UpsertState { item_id, state } => {
                gateway.upsert_scheduling_state(*item_id, state).await
            }
            PersistJob::CloseSession { session_id, totals } => {
                gateway.close_session(*session_id, totals).await
            }
        }
    }

    /// Short description for log lines
    pub fn describe(&self) -> String {
        match self {
            PersistJob::OpenSession { session } => format!("open of session {}", session.id),
            PersistJob::RecordReview { event } => {
                format!("review of item {} in session {}", event.item_id, event.session_id)
            }
            PersistJob::UpsertState { item_id, .. } => format!("state of item {}", item_id),
            PersistJob::CloseSession { session_id, .. } => format!("close of session {}", session_id),
        }
    }
}

/// Where the controller sends persistence jobs
#[derive(Clone)]
pub enum Dispatcher {
    /// Spawn each job at the gateway; failures are logged and dropped
    BestEffort(Arc<dyn PersistenceGateway>),
    /// Append to the durable outbox
    Outbox(Arc<Outbox>),
}

impl Dispatcher {
    /// Submit a job without waiting for it to be persisted
    pub fn submit(&self, job: PersistJob) {
        match self {
            Dispatcher::BestEffort(gateway) => {
                let handle = match tokio::runtime::Handle::try_current() {
                    Ok(handle) => handle,
                    Err(_) => {
                        log::error!("No async runtime, dropping {}", job.describe());
                        return;
                    }
                };
                let gateway = Arc::clone(gateway);
                handle.spawn(async move {
                    if let Err(e) = job.apply(gateway.as_ref()).await {
                        log::warn!("Failed to persist {}: {}", job.describe(), e);
                    }
                });
            }
            Dispatcher::Outbox(outbox) => {
                if let Err(e) = outbox.append(&job) {
                    log::error!("Failed to queue {} in outbox: {}", job.describe(), e);
                }
            }
        }
    }
}
