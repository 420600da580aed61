//! Batch queue types and events.

use std::time::Duration;

use crate::models::ImageQueueItem;

/// Progress reported once the image passed local validation.
pub const PROGRESS_VALIDATED: u8 = 20;
/// Progress reported once the upload payload is ready.
pub const PROGRESS_PREPARED: u8 = 40;
/// Progress reported once the providers answered.
pub const PROGRESS_RECOGNIZED: u8 = 80;

/// Tuning for one batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    /// Items in flight at once; also the chunk size.
    pub concurrency: usize,
    /// Automatic retries after the first attempt.
    pub max_retries: u32,
    /// Pause before each automatic retry.
    pub retry_backoff: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 2,
            max_retries: 1,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// Events emitted while a batch runs.
///
/// Purely observational; a slow or dropped receiver never affects the batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// An attempt on an item began (`attempt` is 1-based).
    ItemStarted {
        id: String,
        name: String,
        attempt: u32,
    },
    ItemProgress { id: String, progress: u8 },
    /// An attempt failed and another will follow after the backoff.
    ItemRetrying {
        id: String,
        retry_count: u32,
        error: String,
    },
    ItemSucceeded { id: String, questions: usize },
    /// The item reached its terminal failure.
    ItemFailed { id: String, error: String },
    /// Every item is terminal.
    Completed { succeeded: usize, failed: usize },
}

/// Outcome of a batch run.
#[derive(Debug)]
pub struct BatchReport {
    /// Items in submission order, all terminal.
    pub items: Vec<ImageQueueItem>,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.items.len()
    }
}
