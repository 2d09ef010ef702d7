use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::OnceCell;

use crate::errors::ApiError;

use super::EmbeddingProvider;

const DIMENSION: usize = 512;

/// In-process sentence encoder (CLIP ViT-B/32 text tower, 512 dimensions).
///
/// The ONNX model is loaded lazily on first use. Concurrent first calls
/// all await the same in-flight load; none trigger a second one.
pub struct SentenceEncoder {
    model: OnceCell<Arc<TextEmbedding>>,
}

impl SentenceEncoder {
    pub fn new() -> Self {
        Self {
            model: OnceCell::new(),
        }
    }

    async fn model(&self) -> Result<Arc<TextEmbedding>, ApiError> {
        self.model
            .get_or_try_init(|| async {
                tracing::info!("loading sentence encoder model (first use)");
                let loaded = tokio::task::spawn_blocking(|| {
                    TextEmbedding::try_new(
                        InitOptions::new(EmbeddingModel::ClipVitB32)
                            .with_show_download_progress(false),
                    )
                })
                .await
                .map_err(ApiError::internal)?
                .map_err(|err| {
                    ApiError::Provider(format!("failed to load sentence encoder: {err}"))
                })?;
                tracing::info!("sentence encoder model loaded");
                Ok(Arc::new(loaded))
            })
            .await
            .map(Arc::clone)
    }
}

impl Default for SentenceEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for SentenceEncoder {
    fn name(&self) -> &'static str {
        "encoder"
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
            .ok_or_else(|| ApiError::Provider("encoder returned no embedding".to_string()))
    }
}
