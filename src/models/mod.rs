//! Data models for mistakebook.

mod question;
mod queue;

pub use question::{
    Difficulty, RecognitionResult, Subject, CONTENT_PLACEHOLDER, DEFAULT_CATEGORY,
};
pub use queue::{ImageQueueItem, QueueStatus};
