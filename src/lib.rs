//! Recall: adaptive review scheduling core
//!
//! Decides when each item should next be reviewed for a learner, runs review
//! sessions over a queue of items, and folds knowledge estimates into a
//! mastery signal.

pub mod config;
pub mod mastery;
pub mod review;

pub use config::{ConfigError, PersistMode, ReviewConfig};
pub use mastery::{aggregate, KnowledgeProbability, MasteryBucket, MasterySummary};
