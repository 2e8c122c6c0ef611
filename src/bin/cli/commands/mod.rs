pub mod due;
pub mod mastery;
pub mod outbox;
pub mod preview;
pub mod review;
