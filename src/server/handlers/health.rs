use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "embedding_provider": state.provider.name(),
        "embedding_dimension": state.provider.dimension(),
        "completion_backend": state.orchestrator.backend_name(),
    }))
}
