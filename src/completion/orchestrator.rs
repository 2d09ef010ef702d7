//! Drives a chat turn end to end: announces the retrieved references,
//! forwards completion output as it arrives, persists the transcript, and
//! closes the event stream with exactly one terminal event.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;

use crate::errors::ApiError;
use crate::history::{ChatTurn, HistoryStore, ROLE_AI, ROLE_USER};
use crate::retrieval::DocReference;

use super::{ChatMessage, CompletionBackend, CompletionOutput};

const EVENT_BUFFER: usize = 32;

/// Ordered events of one chat response stream. Every stream starts with
/// `References`, carries zero or more `Content` deltas, and ends with
/// exactly one of `Done` or `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    References(Vec<DocReference>),
    Content(String),
    Done,
    Error(String),
}

impl ChatEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::References(_) => "references",
            ChatEvent::Content(_) => "content",
            ChatEvent::Done => "done",
            ChatEvent::Error(_) => "error",
        }
    }

    pub fn payload(&self) -> String {
        match self {
            ChatEvent::References(refs) => json!({ "references": refs }).to_string(),
            ChatEvent::Content(delta) => json!({ "content": delta }).to_string(),
            ChatEvent::Done => json!({}).to_string(),
            ChatEvent::Error(message) => json!({ "error": message }).to_string(),
        }
    }
}

#[derive(Clone)]
pub struct CompletionOrchestrator {
    backend: Arc<dyn CompletionBackend>,
    history: HistoryStore,
}

impl CompletionOrchestrator {
    pub fn new(backend: Arc<dyn CompletionBackend>, history: HistoryStore) -> Self {
        Self { backend, history }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Runs one chat turn. `query` is the (possibly augmented) prompt sent
    /// to the model; `user_message` is the raw text persisted to history.
    ///
    /// The caller receives events until the channel closes. A dropped
    /// receiver stops event delivery but not persistence: the turn is
    /// still written to history with whatever content had been produced.
    pub fn respond(
        &self,
        chat_id: String,
        system_prompt: String,
        query: String,
        user_message: String,
        references: Vec<DocReference>,
    ) -> mpsc::Receiver<ChatEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let backend = Arc::clone(&self.backend);
        let history = self.history.clone();

        tokio::spawn(async move {
            let _ = tx.send(ChatEvent::References(references)).await;

            let past_turns = match history.get_history(&chat_id).await {
                Ok(turns) => turns,
                Err(err) => {
                    tracing::warn!("failed to load history for {chat_id}: {err}");
                    Vec::new()
                }
            };

            let messages = build_messages(&system_prompt, &past_turns, &query);

            if let Err(err) = history.add_message(&chat_id, ROLE_USER, &user_message).await {
                tracing::warn!("failed to persist user turn for {chat_id}: {err}");
            }

            let output = match backend.complete(messages, true).await {
                Ok(output) => output,
                Err(err) => {
                    tracing::error!("completion request failed: {err}");
                    let _ = tx.send(ChatEvent::Error(err.to_string())).await;
                    return;
                }
            };

            let mut full_response = String::new();
            let mut stream_failure: Option<ApiError> = None;
            let mut receiver_gone = false;

            match output {
                CompletionOutput::Complete(text) => {
                    if tx.send(ChatEvent::Content(text.clone())).await.is_err() {
                        receiver_gone = true;
                    }
                    full_response = text;
                }
                CompletionOutput::Chunked(mut chunks) => {
                    while let Some(chunk) = chunks.recv().await {
                        match chunk {
                            Ok(delta) => {
                                full_response.push_str(&delta);
                                if !receiver_gone
                                    && tx.send(ChatEvent::Content(delta)).await.is_err()
                                {
                                    receiver_gone = true;
                                }
                            }
                            Err(err) => {
                                stream_failure = Some(err);
                                break;
                            }
                        }
                    }
                }
            }

            if !full_response.is_empty() {
                if let Err(err) = history.add_message(&chat_id, ROLE_AI, &full_response).await {
                    tracing::warn!("failed to persist ai turn for {chat_id}: {err}");
                }
            }

            if receiver_gone {
                return;
            }

            match stream_failure {
                Some(err) => {
                    tracing::error!("completion stream failed mid-response: {err}");
                    let _ = tx.send(ChatEvent::Error(err.to_string())).await;
                }
                None => {
                    let _ = tx.send(ChatEvent::Done).await;
                }
            }
        });

        rx
    }
}

/// Maps stored turns into completion messages. The storage role "ai"
/// becomes the wire role "assistant"; empty turns are skipped.
fn build_messages(system_prompt: &str, past_turns: &[ChatTurn], query: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(past_turns.len() + 2);
    messages.push(ChatMessage::new("system", system_prompt));

    for turn in past_turns {
        if turn.message.is_empty() {
            continue;
        }
        let role = match turn.role.as_str() {
            ROLE_AI => "assistant",
            _ => "user",
        };
        messages.push(ChatMessage::new(role, turn.message.clone()));
    }

    messages.push(ChatMessage::new("user", query));
    messages
}
