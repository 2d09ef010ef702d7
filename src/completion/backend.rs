use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::config::{AppConfig, BackendKind};
use crate::errors::ApiError;

use super::{ChatMessage, CompletionOutput};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_MODEL: &str = "gpt-4o";

const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
const DEEPSEEK_MODEL: &str = "deepseek-chat";

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs a chat completion. With `streaming` the backend returns deltas
    /// over a channel; otherwise the full text in one piece. A backend may
    /// ignore the streaming hint and answer with `Complete`.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        streaming: bool,
    ) -> Result<CompletionOutput, ApiError>;
}

/// Client for OpenAI-compatible chat completion APIs.
pub struct OpenAiCompatBackend {
    name: &'static str,
    base_url: String,
    api_key: String,
    model: String,
    json_mode: bool,
    client: Client,
}

impl OpenAiCompatBackend {
    pub fn openai(api_key: String) -> Self {
        Self {
            name: "openai",
            base_url: OPENAI_BASE_URL.to_string(),
            api_key,
            model: OPENAI_MODEL.to_string(),
            json_mode: false,
            client: Client::new(),
        }
    }

    pub fn deepseek(api_key: String) -> Self {
        Self {
            name: "deepseek",
            base_url: DEEPSEEK_BASE_URL.to_string(),
            api_key,
            model: DEEPSEEK_MODEL.to_string(),
            // this backend's prompts are structured, so it always asks for
            // a JSON object response
            json_mode: true,
            client: Client::new(),
        }
    }

    fn request_body(&self, messages: &[ChatMessage], streaming: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": streaming,
        });
        if self.json_mode {
            if let Some(obj) = body.as_object_mut() {
                obj.insert(
                    "response_format".to_string(),
                    json!({ "type": "json_object" }),
                );
            }
        }
        body
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompatBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        streaming: bool,
    ) -> Result<CompletionOutput, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&messages, streaming);

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::provider)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Provider(format!(
                "{} completion failed ({status}): {text}",
                self.name
            )));
        }

        if !streaming {
            let payload: Value = res.json().await.map_err(ApiError::provider)?;
            let content = payload["choices"][0]["message"]["content"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            return Ok(CompletionOutput::Complete(content));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            let mut buffer = LineBuffer::new();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        for line in buffer.push(&bytes) {
                            let line = line.trim();
                            if line.is_empty() {
                                continue;
                            }
                            if line == "data: [DONE]" {
                                return;
                            }

                            if let Some(data) = line.strip_prefix("data: ") {
                                if let Ok(json) = serde_json::from_str::<Value>(data) {
                                    if let Some(content) =
                                        json["choices"][0]["delta"]["content"].as_str()
                                    {
                                        if !content.is_empty()
                                            && tx.send(Ok(content.to_string())).await.is_err()
                                        {
                                            return;
                                        }
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(ApiError::provider(e))).await;
                        return;
                    }
                }
            }
        });

        Ok(CompletionOutput::Chunked(rx))
    }
}

/// Accumulates raw network chunks and yields complete lines. SSE frames
/// are newline-delimited but a chunk may end mid-line or even mid-way
/// through a multibyte character, so bytes are held back until their line
/// is complete.
struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let rest = self.buf.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.buf, rest);
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }
}

pub fn build_backend(config: &AppConfig) -> Result<Arc<dyn CompletionBackend>, ApiError> {
    match config.completion.backend {
        BackendKind::OpenAi => {
            let api_key = config.completion.openai_api_key.clone().ok_or_else(|| {
                ApiError::Configuration("openai completion backend needs an api key".to_string())
            })?;
            Ok(Arc::new(OpenAiCompatBackend::openai(api_key)))
        }
        BackendKind::DeepSeek => {
            let api_key = config.completion.deepseek_api_key.clone().ok_or_else(|| {
                ApiError::Configuration("deepseek completion backend needs an api key".to_string())
            })?;
            Ok(Arc::new(OpenAiCompatBackend::deepseek(api_key)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deepseek_requests_json_object_responses() {
        let backend = OpenAiCompatBackend::deepseek("key".to_string());
        let body = backend.request_body(&[ChatMessage::new("user", "hi")], true);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["model"], DEEPSEEK_MODEL);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn line_buffer_joins_lines_split_across_chunks() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"data: {\"a\":").is_empty());
        assert_eq!(buffer.push(b"1}\n"), vec!["data: {\"a\":1}"]);
    }

    #[test]
    fn line_buffer_handles_multiple_lines_in_one_chunk() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push(b"data: one\r\n\ndata: two\ndata: thr");
        assert_eq!(lines, vec!["data: one", "", "data: two"]);
        assert_eq!(buffer.push(b"ee\n"), vec!["data: three"]);
    }

    #[test]
    fn line_buffer_keeps_multibyte_characters_intact() {
        let text = "data: h\u{e9}llo\n".as_bytes();
        // split inside the two-byte character
        let (head, tail) = text.split_at(8);
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(head).is_empty());
        assert_eq!(buffer.push(tail), vec!["data: h\u{e9}llo"]);
    }

    #[test]
    fn openai_body_has_no_response_format() {
        let backend = OpenAiCompatBackend::openai("key".to_string());
        let body = backend.request_body(&[ChatMessage::new("user", "hi")], false);
        assert!(body.get("response_format").is_none());
        assert_eq!(body["model"], OPENAI_MODEL);
        assert_eq!(body["stream"], false);
    }
}
