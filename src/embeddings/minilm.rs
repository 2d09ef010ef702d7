use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::OnceCell;

use crate::errors::ApiError;

use super::EmbeddingProvider;

const DIMENSION: usize = 384;

/// Local transformer feature extractor (all-MiniLM-L6-v2, 384 dimensions).
/// Mean pooling and L2 normalization happen inside the model pipeline.
///
/// Same lazy exactly-once load discipline as the sentence encoder.
pub struct MiniLmEmbeddings {
    model: OnceCell<Arc<TextEmbedding>>,
}

impl MiniLmEmbeddings {
    pub fn new() -> Self {
        Self {
            model: OnceCell::new(),
        }
    }

    async fn model(&self) -> Result<Arc<TextEmbedding>, ApiError> {
        self.model
            .get_or_try_init(|| async {
                tracing::info!("loading MiniLM embedding model (first use)");
                let loaded = tokio::task::spawn_blocking(|| {
                    TextEmbedding::try_new(
                        InitOptions::new(EmbeddingModel::AllMiniLML6V2)
                            .with_show_download_progress(false),
                    )
                })
                .await
                .map_err(ApiError::internal)?
                .map_err(|err| ApiError::Provider(format!("failed to load MiniLM: {err}")))?;
                tracing::info!("MiniLM model loaded");
                Ok(Arc::new(loaded))
            })
            .await
            .map(Arc::clone)
    }
}

impl Default for MiniLmEmbeddings {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MiniLmEmbeddings {
    fn name(&self) -> &'static str {
        "minilm"
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        let model = self.model().await?;
        let text = text.to_string();

        let mut rows = tokio::task::spawn_blocking(move || model.embed(vec![text], None))
            .await
            .map_err(ApiError::internal)?
            .map_err(ApiError::provider)?;

        rows.pop()
            .ok_or_else(|| ApiError::Provider("MiniLM returned no embedding".to_string()))
    }
}
