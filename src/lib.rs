//! mistakebook - exam-question recognition for a mistake notebook.
//!
//! Photos of exam questions are sent to one of three recognition providers
//! (Alibaba DashScope, Google Gemini, Baidu OCR) with automatic fallback
//! between them. Every provider's output is normalized into the same
//! [`models::RecognitionResult`] shape. A batch queue runs many images with
//! bounded concurrency and retries.

#![allow(clippy::should_implement_trait)]

pub mod cli;
pub mod config;
pub mod models;
pub mod recognition;
pub mod services;
pub mod storage;
