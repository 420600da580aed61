//! Batch queue behaviour against in-process providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use mistakebook::models::{Difficulty, QueueStatus, RecognitionResult, Subject};
use mistakebook::recognition::{
    ImageInput, ImageOptions, PreparedImage, ProviderError, ProviderKind, ProviderSet,
    RecognitionProvider, Recognizer, MAX_IMAGE_BYTES,
};
use mistakebook::services::{BatchEvent, BatchOptions, BatchQueue};

const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Fails the first `failures` calls, then answers one question.
struct ScriptedProvider {
    kind: ProviderKind,
    failures: usize,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    fn new(kind: ProviderKind, failures: usize, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            kind,
            failures,
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    fn succeeding(kind: ProviderKind) -> Arc<Self> {
        Self::new(kind, 0, Duration::ZERO)
    }

    fn failing(kind: ProviderKind) -> Arc<Self> {
        Self::new(kind, usize::MAX, Duration::ZERO)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecognitionProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn availability_hint(&self) -> String {
        format!("{} test double", self.kind)
    }

    async fn recognize(
        &self,
        _image: &PreparedImage,
    ) -> Result<Vec<RecognitionResult>, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if call < self.failures {
            return Err(ProviderError::http(self.kind, "503 Service Unavailable"));
        }
        Ok(vec![RecognitionResult {
            content: format!("{} question", self.kind),
            subject: Subject::Math,
            category: "函数".to_string(),
            difficulty: Difficulty::Medium,
            answer: String::new(),
            explanation: None,
            confidence: 0.9,
        }])
    }
}

fn recognizer(
    dashscope: Arc<ScriptedProvider>,
    baidu: Arc<ScriptedProvider>,
    gemini: Arc<ScriptedProvider>,
) -> Recognizer {
    Recognizer::new(
        ProviderSet::new(dashscope, baidu, gemini),
        Duration::from_secs(30),
    )
    .with_image_options(ImageOptions::uncompressed())
}

fn png(name: &str) -> ImageInput {
    let mut bytes = PNG_MAGIC.to_vec();
    bytes.extend_from_slice(&[0u8; 64]);
    ImageInput::from_bytes(name, bytes)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<BatchEvent>) -> Vec<BatchEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn position(events: &[BatchEvent], pred: impl Fn(&BatchEvent) -> bool) -> usize {
    events
        .iter()
        .position(pred)
        .expect("event should have been emitted")
}

fn is_terminal_for(event: &BatchEvent, item: &str) -> bool {
    match event {
        BatchEvent::ItemSucceeded { id, .. } | BatchEvent::ItemFailed { id, .. } => id == item,
        _ => false,
    }
}

fn is_start_of(event: &BatchEvent, item: &str) -> bool {
    matches!(event, BatchEvent::ItemStarted { id, .. } if id == item)
}

#[tokio::test(start_paused = true)]
async fn test_batch_runs_in_waves_of_concurrency() {
    let dashscope = ScriptedProvider::new(ProviderKind::DashScope, 0, Duration::from_millis(100));
    let recognizer = recognizer(
        dashscope.clone(),
        ScriptedProvider::succeeding(ProviderKind::BaiduOcr),
        ScriptedProvider::succeeding(ProviderKind::Gemini),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let queue = BatchQueue::new(
        recognizer,
        ProviderKind::DashScope,
        BatchOptions {
            concurrency: 2,
            ..BatchOptions::default()
        },
    )
    .with_events(tx);

    let images = (1..=5).map(|i| png(&format!("page-{}.png", i))).collect();
    let report = queue.run_batch(images).await;

    assert_eq!(report.total(), 5);
    assert_eq!(report.succeeded, 5);
    assert_eq!(report.failed, 0);
    assert_eq!(dashscope.calls(), 5);
    assert_eq!(dashscope.max_in_flight.load(Ordering::SeqCst), 2);

    let events = drain(&mut rx);
    let ids: Vec<&str> = report.items.iter().map(|i| i.id.as_str()).collect();

    // Items 3-4 start after 1-2 finish, item 5 after 3-4.
    for (wave, previous) in [(2..4, 0..2), (4..5, 2..4)] {
        for next in wave {
            let started = position(&events, |e| is_start_of(e, ids[next]));
            for done in previous.clone() {
                assert!(position(&events, |e| is_terminal_for(e, ids[done])) < started);
            }
        }
    }

    assert_eq!(
        events.last(),
        Some(&BatchEvent::Completed {
            succeeded: 5,
            failed: 0
        })
    );
    assert!(report.items.iter().all(|i| i.progress == 100));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_fail_once() {
    let baidu = ScriptedProvider::failing(ProviderKind::BaiduOcr);
    let dashscope = ScriptedProvider::succeeding(ProviderKind::DashScope);
    let recognizer = recognizer(
        dashscope.clone(),
        baidu.clone(),
        ScriptedProvider::succeeding(ProviderKind::Gemini),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let queue = BatchQueue::new(recognizer, ProviderKind::BaiduOcr, BatchOptions::default())
        .with_events(tx);

    let report = queue.run_batch(vec![png("scan.png")]).await;
    let item = &report.items[0];

    assert_eq!(item.status, QueueStatus::Failed);
    assert_eq!(item.retry_count, 1);
    assert!(item.result.is_none());
    assert_eq!(item.error.as_deref(), Some("recognition failed, please retry"));
    // Baidu is never substituted, so only it was called: first attempt + one retry.
    assert_eq!(baidu.calls(), 2);
    assert_eq!(dashscope.calls(), 0);

    let events = drain(&mut rx);
    let failed = events
        .iter()
        .filter(|e| matches!(e, BatchEvent::ItemFailed { .. }))
        .count();
    let retried = events
        .iter()
        .filter(|e| matches!(e, BatchEvent::ItemRetrying { retry_count: 1, .. }))
        .count();
    assert_eq!(failed, 1);
    assert_eq!(retried, 1);
}

#[tokio::test]
async fn test_oversized_image_fails_without_provider_calls() {
    let dashscope = ScriptedProvider::succeeding(ProviderKind::DashScope);
    let baidu = ScriptedProvider::succeeding(ProviderKind::BaiduOcr);
    let gemini = ScriptedProvider::succeeding(ProviderKind::Gemini);
    let queue = BatchQueue::new(
        recognizer(dashscope.clone(), baidu.clone(), gemini.clone()),
        ProviderKind::DashScope,
        BatchOptions::default(),
    );

    let mut bytes = PNG_MAGIC.to_vec();
    bytes.resize(MAX_IMAGE_BYTES + 1, 0);
    let report = queue
        .run_batch(vec![ImageInput::from_bytes("blank.png", bytes)])
        .await;
    let item = &report.items[0];

    assert_eq!(item.status, QueueStatus::Failed);
    assert_eq!(item.retry_count, 0);
    assert!(item.error.as_deref().unwrap_or_default().contains("too large"));
    assert_eq!(dashscope.calls() + baidu.calls() + gemini.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_primary_falls_back_inside_batch() {
    let dashscope = ScriptedProvider::failing(ProviderKind::DashScope);
    let gemini = ScriptedProvider::succeeding(ProviderKind::Gemini);
    let queue = BatchQueue::new(
        recognizer(
            dashscope.clone(),
            ScriptedProvider::succeeding(ProviderKind::BaiduOcr),
            gemini.clone(),
        ),
        ProviderKind::DashScope,
        BatchOptions::default(),
    );

    let report = queue.run_batch(vec![png("a.png"), png("b.png")]).await;

    assert_eq!(report.succeeded, 2);
    for item in &report.items {
        assert_eq!(item.retry_count, 0);
        let results = item.result.as_ref().unwrap();
        assert_eq!(results[0].content, "gemini question");
    }
    assert_eq!(dashscope.calls(), 2);
    assert_eq!(gemini.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_manual_retry_resets_retry_budget() {
    // Two failures exhaust the automatic budget; the third call succeeds.
    let baidu = ScriptedProvider::new(ProviderKind::BaiduOcr, 2, Duration::ZERO);
    let queue = BatchQueue::new(
        recognizer(
            ScriptedProvider::succeeding(ProviderKind::DashScope),
            baidu.clone(),
            ScriptedProvider::succeeding(ProviderKind::Gemini),
        ),
        ProviderKind::BaiduOcr,
        BatchOptions {
            max_retries: 1,
            retry_backoff: Duration::from_millis(10),
            ..BatchOptions::default()
        },
    );

    let mut report = queue.run_batch(vec![png("retry.png")]).await;
    assert_eq!(report.items[0].status, QueueStatus::Failed);
    assert_eq!(report.items[0].retry_count, 1);

    let item = &mut report.items[0];
    queue.retry_image(item).await;

    assert_eq!(item.status, QueueStatus::Success);
    assert_eq!(item.retry_count, 0);
    assert!(item.error.is_none());
    assert_eq!(item.result.as_ref().map(Vec::len), Some(1));
    assert_eq!(baidu.calls(), 3);
}

#[tokio::test]
async fn test_empty_batch_completes_immediately() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let queue = BatchQueue::new(
        recognizer(
            ScriptedProvider::succeeding(ProviderKind::DashScope),
            ScriptedProvider::succeeding(ProviderKind::BaiduOcr),
            ScriptedProvider::succeeding(ProviderKind::Gemini),
        ),
        ProviderKind::DashScope,
        BatchOptions::default(),
    )
    .with_events(tx);

    let report = queue.run_batch(Vec::new()).await;

    assert_eq!(report.total(), 0);
    assert_eq!(
        drain(&mut rx),
        vec![BatchEvent::Completed {
            succeeded: 0,
            failed: 0
        }]
    );
}

#[tokio::test]
async fn test_progress_checkpoints_reach_completion() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let queue = BatchQueue::new(
        recognizer(
            ScriptedProvider::succeeding(ProviderKind::DashScope),
            ScriptedProvider::succeeding(ProviderKind::BaiduOcr),
            ScriptedProvider::succeeding(ProviderKind::Gemini),
        ),
        ProviderKind::DashScope,
        BatchOptions::default(),
    )
    .with_events(tx);

    queue.run_batch(vec![png("one.png")]).await;

    let progress: Vec<u8> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            BatchEvent::ItemProgress { progress, .. } => Some(progress),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![20, 40, 80, 100]);
}
