//! Batch recognition queue.
//!
//! Images are processed in consecutive chunks of `concurrency` items. All
//! items of a chunk run concurrently on the current task and the next chunk
//! starts only once every item of the current one is terminal. Failed
//! attempts are retried in place, without waiting for the next chunk.

mod types;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::models::{ImageQueueItem, QueueStatus};
use crate::recognition::{
    prepare_validated, ImageInput, ProviderKind, RecognizeError, Recognizer, ValidationError,
};

pub use types::{
    BatchEvent, BatchOptions, BatchReport, PROGRESS_PREPARED, PROGRESS_RECOGNIZED,
    PROGRESS_VALIDATED,
};

/// Runs images through a [`Recognizer`] with bounded concurrency and retries.
pub struct BatchQueue {
    recognizer: Recognizer,
    provider: ProviderKind,
    options: BatchOptions,
    events: Option<UnboundedSender<BatchEvent>>,
}

impl BatchQueue {
    /// Create a new queue that prefers `provider` for every item.
    pub fn new(recognizer: Recognizer, provider: ProviderKind, options: BatchOptions) -> Self {
        Self {
            recognizer,
            provider,
            options,
            events: None,
        }
    }

    /// Send lifecycle events to `tx`.
    pub fn with_events(mut self, tx: UnboundedSender<BatchEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    fn emit(&self, event: BatchEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Recognize every image. Individual failures are recorded on their
    /// items; the batch itself always completes.
    pub async fn run_batch(&self, images: Vec<ImageInput>) -> BatchReport {
        let mut items: Vec<ImageQueueItem> = images.into_iter().map(ImageQueueItem::new).collect();
        let concurrency = self.options.concurrency.max(1);

        info!(
            "Starting batch of {} images (concurrency {}, max retries {})",
            items.len(),
            concurrency,
            self.options.max_retries
        );

        for (index, chunk) in items.chunks_mut(concurrency).enumerate() {
            debug!("Processing chunk {} ({} items)", index + 1, chunk.len());
            futures::future::join_all(chunk.iter_mut().map(|item| self.process_item(item))).await;
        }

        let succeeded = items
            .iter()
            .filter(|i| i.status == QueueStatus::Success)
            .count();
        let failed = items.len() - succeeded;

        info!("Batch complete: {} succeeded, {} failed", succeeded, failed);
        self.emit(BatchEvent::Completed { succeeded, failed });

        BatchReport {
            items,
            succeeded,
            failed,
        }
    }

    /// Manually retry one item, outside any batch. The retry budget starts
    /// over from zero.
    pub async fn retry_image(&self, item: &mut ImageQueueItem) {
        info!("Retrying {}", item.name());
        item.reset_for_retry();
        self.process_item(item).await;
    }

    async fn process_item(&self, item: &mut ImageQueueItem) {
        self.start_attempt(item);

        let max_bytes = self.recognizer.image_options().max_bytes;
        let mime = match item.source.validate(max_bytes) {
            Ok(mime) => mime,
            Err(e) => {
                self.reject(item, e);
                return;
            }
        };
        self.progress(item, PROGRESS_VALIDATED);

        let image = match prepare_validated(&item.source, mime, self.recognizer.image_options())
            .await
        {
            Ok(image) => image,
            Err(e) => {
                self.reject(item, e);
                return;
            }
        };
        self.progress(item, PROGRESS_PREPARED);

        loop {
            match self
                .recognizer
                .recognize_with_fallback(&image, self.provider)
                .await
            {
                Ok(results) => {
                    self.progress(item, PROGRESS_RECOGNIZED);
                    let questions = results.len();
                    item.succeed(results);
                    self.emit(BatchEvent::ItemProgress {
                        id: item.id.clone(),
                        progress: item.progress,
                    });
                    self.emit(BatchEvent::ItemSucceeded {
                        id: item.id.clone(),
                        questions,
                    });
                    return;
                }
                Err(e) if item.retry_count < self.options.max_retries => {
                    item.retry_count += 1;
                    warn!(
                        "{} failed ({}), retry {}/{}",
                        item.name(),
                        e,
                        item.retry_count,
                        self.options.max_retries
                    );
                    self.emit(BatchEvent::ItemRetrying {
                        id: item.id.clone(),
                        retry_count: item.retry_count,
                        error: e.to_string(),
                    });
                    tokio::time::sleep(self.options.retry_backoff).await;

                    self.start_attempt(item);
                    self.progress(item, PROGRESS_PREPARED);
                }
                Err(e) => {
                    let error = RecognizeError::ExhaustedRetries {
                        attempts: item.retry_count + 1,
                        last: e,
                    };
                    warn!("{} failed: {}", item.name(), error);
                    self.finish_failed(item, &error);
                    return;
                }
            }
        }
    }

    fn start_attempt(&self, item: &mut ImageQueueItem) {
        item.begin_attempt();
        self.emit(BatchEvent::ItemStarted {
            id: item.id.clone(),
            name: item.name().to_string(),
            attempt: item.retry_count + 1,
        });
    }

    fn progress(&self, item: &mut ImageQueueItem, progress: u8) {
        item.advance(progress);
        self.emit(BatchEvent::ItemProgress {
            id: item.id.clone(),
            progress: item.progress,
        });
    }

    /// Validation failures never consume a retry.
    fn reject(&self, item: &mut ImageQueueItem, error: ValidationError) {
        warn!("{} rejected: {}", item.name(), error);
        self.finish_failed(item, &RecognizeError::from(error));
    }

    fn finish_failed(&self, item: &mut ImageQueueItem, error: &RecognizeError) {
        let message = error.user_message();
        item.fail(message.clone());
        self.emit(BatchEvent::ItemFailed {
            id: item.id.clone(),
            error: message,
        });
    }
}
