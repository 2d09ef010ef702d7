//! Chat endpoints: the streaming RAG turn and transcript retrieval.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::stream::{self, Stream};
use serde::Deserialize;

use crate::errors::ApiError;
use crate::retrieval::{augment_query, document_threshold, threshold_filter, DocReference};
use crate::state::AppState;
use crate::vector::VisibilityFilter;

const DOC_SEARCH_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub chat_id: String,
    pub bot_id: String,
}

/// Runs one retrieval-augmented chat turn, streamed as server-sent events:
/// `references` once, `content` fragments, then one `done` or `error`.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }

    // an unknown bot fails the request before any stream is opened
    let system_prompt = state.bots.system_prompt(&request.bot_id).await?;

    let (query, references) = retrieve_context(&state, &request).await;

    let events = state.orchestrator.respond(
        request.chat_id,
        system_prompt,
        query,
        request.message,
        references,
    );

    let stream = stream::unfold(events, |mut events| async move {
        let event = events.recv().await?;
        let sse = Event::default().event(event.name()).data(event.payload());
        Some((Ok::<_, Infallible>(sse), events))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Retrieval augmentation is best-effort: an embedding or search failure
/// degrades to the raw query with no references rather than failing the
/// chat turn.
async fn retrieve_context(
    state: &AppState,
    request: &ChatRequest,
) -> (String, Vec<DocReference>) {
    let embedding = match state.provider.embed(&request.message).await {
        Ok(embedding) => embedding,
        Err(err) => {
            tracing::warn!("query embedding failed, answering without context: {err}");
            return (request.message.clone(), Vec::new());
        }
    };

    let filter = VisibilityFilter {
        chat_id: request.chat_id.clone(),
        bot_id: request.bot_id.clone(),
    };
    let results = match state
        .store
        .search_documents(&embedding, &filter, DOC_SEARCH_LIMIT)
        .await
    {
        Ok(results) => results,
        Err(err) => {
            tracing::warn!("document search failed, answering without context: {err}");
            return (request.message.clone(), Vec::new());
        }
    };

    let qualified = threshold_filter(
        results,
        document_threshold(state.config.embedding.provider),
    );
    if qualified.is_empty() {
        return (request.message.clone(), Vec::new());
    }

    augment_query(&request.message, &qualified)
}

pub async fn chat_history(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let turns = state.history.get_history(&chat_id).await?;
    if turns.is_empty() {
        return Err(ApiError::NotFound(format!("no history for chat {chat_id}")));
    }
    Ok(Json(turns))
}
