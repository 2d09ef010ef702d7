pub mod handlers;
pub mod router;

use std::sync::Arc;

use crate::errors::ApiError;
use crate::state::AppState;

pub async fn serve(state: Arc<AppState>) -> Result<(), ApiError> {
    let addr = format!(
        "{}:{}",
        state.config.server.host, state.config.server.port
    );
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|err| ApiError::Configuration(format!("failed to bind {addr}: {err}")))?;

    tracing::info!("listening on {addr}");

    axum::serve(listener, router::router(state))
        .await
        .map_err(ApiError::internal)
}
