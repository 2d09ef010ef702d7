//! Chat completion backends and the response orchestrator.

mod backend;
mod orchestrator;

pub use backend::{build_backend, CompletionBackend, OpenAiCompatBackend};
pub use orchestrator::{ChatEvent, CompletionOrchestrator};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::errors::ApiError;

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// A completion is either delivered whole or as a stream of text deltas.
/// The receiver closing without an error means the stream finished cleanly.
pub enum CompletionOutput {
    Complete(String),
    Chunked(mpsc::Receiver<Result<String, ApiError>>),
}
