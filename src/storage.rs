//! Question storage collaborators.
//!
//! Recognized questions are handed to a [`QuestionStore`] for persistence.
//! Only the create operation is modelled here.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::models::{Difficulty, RecognitionResult, Subject};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("missing or empty session credential")]
    Unauthorized,

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode question: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Opaque credential identifying the caller's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredential(String);

impl SessionCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Credential for single-user local use.
    pub fn local() -> Self {
        Self("local".to_string())
    }

    fn is_present(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

/// Fields supplied when creating a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewQuestion {
    pub content: String,
    pub subject: Subject,
    pub category: String,
    pub difficulty: Difficulty,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl From<&RecognitionResult> for NewQuestion {
    fn from(result: &RecognitionResult) -> Self {
        Self {
            content: result.content.clone(),
            subject: result.subject,
            category: result.category.clone(),
            difficulty: result.difficulty,
            answer: result.answer.clone(),
            explanation: result.explanation.clone(),
        }
    }
}

/// A question as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredQuestion {
    pub id: String,
    #[serde(flatten)]
    pub question: NewQuestion,
    pub created_at: DateTime<Utc>,
    pub review_count: u32,
    pub is_mastered: bool,
}

impl StoredQuestion {
    fn create(question: NewQuestion) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            question,
            created_at: Utc::now(),
            review_count: 0,
            is_mastered: false,
        }
    }
}

/// Persistence for recognized questions.
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Store one question and return the stored record.
    async fn create_question(
        &self,
        credential: &SessionCredential,
        question: NewQuestion,
    ) -> Result<StoredQuestion, StorageError>;
}

/// Store all results of one recognition, in order.
pub async fn save_results(
    store: &dyn QuestionStore,
    credential: &SessionCredential,
    results: &[RecognitionResult],
) -> Result<Vec<StoredQuestion>, StorageError> {
    let mut stored = Vec::with_capacity(results.len());
    for result in results {
        stored.push(store.create_question(credential, result.into()).await?);
    }
    Ok(stored)
}

/// Process-memory store.
#[derive(Debug, Default)]
pub struct MemoryQuestionStore {
    questions: Mutex<Vec<StoredQuestion>>,
}

impl MemoryQuestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn questions(&self) -> Vec<StoredQuestion> {
        self.questions.lock().await.clone()
    }
}

#[async_trait]
impl QuestionStore for MemoryQuestionStore {
    async fn create_question(
        &self,
        credential: &SessionCredential,
        question: NewQuestion,
    ) -> Result<StoredQuestion, StorageError> {
        if !credential.is_present() {
            return Err(StorageError::Unauthorized);
        }
        let stored = StoredQuestion::create(question);
        self.questions.lock().await.push(stored.clone());
        Ok(stored)
    }
}

/// Appends one JSON object per line to a local file.
#[derive(Debug)]
pub struct JsonlQuestionStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlQuestionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl QuestionStore for JsonlQuestionStore {
    async fn create_question(
        &self,
        credential: &SessionCredential,
        question: NewQuestion,
    ) -> Result<StoredQuestion, StorageError> {
        if !credential.is_present() {
            return Err(StorageError::Unauthorized);
        }
        let stored = StoredQuestion::create(question);
        let mut line = serde_json::to_string(&stored)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        Ok(stored)
    }
}
