//! Ingestion and metadata search endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::ApiError;
use crate::ingest::{DocumentIngestRequest, MetadataIngestRequest};
use crate::retrieval::{dedup_by_cid, metadata_threshold, outlier_filter, threshold_filter};
use crate::state::AppState;
use crate::vector::VisibilityFilter;

const METADATA_SEARCH_LIMIT: usize = 10;

pub async fn embed_documents(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DocumentIngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.text.is_none() && request.files.is_empty() {
        return Err(ApiError::BadRequest(
            "request needs text or at least one file".to_string(),
        ));
    }

    Ok(Json(state.ingestor.ingest_documents(request).await))
}

pub async fn embed_metadata(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MetadataIngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state.ingestor.ingest_metadata(request).await?;
    Ok(Json(json!({ "items": items })))
}

#[derive(Debug, Deserialize)]
pub struct MetadataSearchRequest {
    pub query: String,
    pub chat_id: String,
    pub bot_id: String,
}

#[derive(Debug, Serialize)]
pub struct MetadataSearchRow {
    pub cid: String,
    pub url: String,
    pub description: String,
    pub similarity: f32,
}

/// Ranked metadata lookup: threshold, cid-dedup keeping the highest
/// ranked, then statistical outlier trimming. A failed search degrades to
/// an empty list.
pub async fn search_metadata(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MetadataSearchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let embedding = state.provider.embed(&request.query).await?;

    let filter = VisibilityFilter {
        chat_id: request.chat_id,
        bot_id: request.bot_id,
    };
    let results = match state
        .store
        .search_metadata(&embedding, &filter, METADATA_SEARCH_LIMIT)
        .await
    {
        Ok(results) => results,
        Err(err) => {
            tracing::warn!("metadata search failed, returning empty result: {err}");
            Vec::new()
        }
    };

    let threshold = metadata_threshold(state.config.embedding.provider);
    let filtered = outlier_filter(dedup_by_cid(threshold_filter(results, threshold)));

    let rows: Vec<MetadataSearchRow> = filtered
        .into_iter()
        .map(|result| MetadataSearchRow {
            cid: result.record.cid,
            url: result.record.url,
            description: result.record.description,
            similarity: result.similarity,
        })
        .collect();

    Ok(Json(rows))
}
