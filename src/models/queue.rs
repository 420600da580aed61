//! Batch queue items.
//!
//! Queue items live only in memory for the duration of a batch; they are
//! never persisted.

use serde::{Deserialize, Serialize};

use super::question::RecognitionResult;
use crate::recognition::ImageInput;

/// Lifecycle state of a queue item.
///
/// `Pending -> Processing -> {Success | Failed}`, and `Failed -> Processing`
/// on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    #[default]
    Pending,
    Processing,
    Success,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Whether the item has reached a state the batch can move past.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One image submitted to a batch.
#[derive(Debug, Clone)]
pub struct ImageQueueItem {
    /// Unique within one batch submission.
    pub id: String,
    /// Source image, owned by the item until it reaches a terminal state.
    pub source: ImageInput,
    pub status: QueueStatus,
    /// 0..=100, non-decreasing within one attempt.
    pub progress: u8,
    /// Present iff `status == Success`.
    pub result: Option<Vec<RecognitionResult>>,
    /// User-facing message, present iff `status == Failed`.
    pub error: Option<String>,
    /// Automatic retries consumed so far.
    pub retry_count: u32,
}

impl ImageQueueItem {
    /// Create a pending item with a fresh id.
    pub fn new(source: ImageInput) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source,
            status: QueueStatus::Pending,
            progress: 0,
            result: None,
            error: None,
            retry_count: 0,
        }
    }

    /// Display name of the source image.
    pub fn name(&self) -> &str {
        self.source.name()
    }

    pub(crate) fn begin_attempt(&mut self) {
        self.status = QueueStatus::Processing;
        self.progress = 0;
        self.result = None;
        self.error = None;
    }

    /// Raise progress; never moves backwards within an attempt.
    pub(crate) fn advance(&mut self, progress: u8) {
        self.progress = self.progress.max(progress.min(100));
    }

    pub(crate) fn succeed(&mut self, results: Vec<RecognitionResult>) {
        self.status = QueueStatus::Success;
        self.progress = 100;
        self.result = Some(results);
        self.error = None;
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.status = QueueStatus::Failed;
        self.progress = 0;
        self.result = None;
        self.error = Some(message);
    }

    /// Prepare a failed (or any) item for a manual retry.
    pub(crate) fn reset_for_retry(&mut self) {
        self.retry_count = 0;
        self.error = None;
        self.result = None;
        self.progress = 0;
        self.status = QueueStatus::Pending;
    }
}
