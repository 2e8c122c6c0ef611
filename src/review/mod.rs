//! Adaptive review scheduling for Recall
//!
//! This module provides:
//! - The card scheduling algorithm (grade -> next state)
//! - The review session controller
//! - The persistence gateway trait and a file-backed implementation
//! - A durable outbox so graded reviews survive store outages

pub mod algorithm;
pub mod dispatch;
pub mod gateway;
pub mod models;
pub mod outbox;
pub mod session;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatch::{Dispatcher, PersistJob};
pub use gateway::{GatewayError, PersistenceGateway};
pub use models::*;
pub use outbox::{start_outbox_flusher, FlushReport, FlusherTiming, Outbox, OutboxFlusher};
pub use session::{Clock, ReviewController, SessionError, SessionHandle, SessionOptions, SessionStats, SystemClock};
pub use storage::FileGateway;
