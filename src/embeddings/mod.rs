//! Text embedding providers.
//!
//! Four interchangeable strategies behind one trait; the active provider
//! is a process-wide configuration value fixed at startup. Each produces
//! vectors of a different dimensionality, so switching providers requires
//! re-indexing the vector collections.

mod encoder;
mod glove;
mod minilm;
mod openai;

pub use encoder::SentenceEncoder;
pub use glove::GloveEmbeddings;
pub use minilm::MiniLmEmbeddings;
pub use openai::OpenAiEmbeddings;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{AppConfig, ProviderKind};
use crate::errors::ApiError;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fixed output dimensionality of this provider.
    fn dimension(&self) -> usize;

    /// Converts text to a fixed-dimension vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError>;
}

pub fn build_provider(config: &AppConfig) -> Result<Arc<dyn EmbeddingProvider>, ApiError> {
    match config.embedding.provider {
        ProviderKind::OpenAi => {
            let api_key = config.embedding.openai_api_key.clone().ok_or_else(|| {
                ApiError::Configuration("openai embedding provider needs an api key".to_string())
            })?;
            Ok(Arc::new(OpenAiEmbeddings::new(api_key)))
        }
        ProviderKind::Encoder => Ok(Arc::new(SentenceEncoder::new())),
        ProviderKind::Glove => Ok(Arc::new(GloveEmbeddings::new(
            config.paths.glove_dir.clone(),
        ))),
        ProviderKind::MiniLm => Ok(Arc::new(MiniLmEmbeddings::new())),
    }
}
