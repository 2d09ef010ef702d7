//! Shared application state assembled once at startup.

use std::sync::Arc;

use crate::bots::BotRegistry;
use crate::completion::{build_backend, CompletionOrchestrator};
use crate::config::AppConfig;
use crate::embeddings::{build_provider, EmbeddingProvider};
use crate::errors::ApiError;
use crate::history::HistoryStore;
use crate::ingest::Ingestor;
use crate::vector::{CollectionKind, SqliteVectorStore};

pub struct AppState {
    pub config: AppConfig,
    pub provider: Arc<dyn EmbeddingProvider>,
    pub store: SqliteVectorStore,
    pub history: HistoryStore,
    pub bots: BotRegistry,
    pub orchestrator: CompletionOrchestrator,
    pub ingestor: Ingestor,
}

impl AppState {
    /// Builds every component. Any error here is fatal at startup.
    pub async fn initialize(config: AppConfig) -> Result<Arc<Self>, ApiError> {
        tokio::fs::create_dir_all(&config.paths.data_dir)
            .await
            .map_err(|err| {
                ApiError::Configuration(format!(
                    "failed to create data directory {}: {err}",
                    config.paths.data_dir.display()
                ))
            })?;

        tracing::info!(
            "embedding provider: {} ({} dimensions)",
            config.embedding.provider.as_str(),
            config.embedding.provider.dimension()
        );
        let provider = build_provider(&config)?;

        let store = SqliteVectorStore::connect(config.paths.vector_db_path.clone()).await?;
        let dimension = provider.dimension();
        store
            .ensure_collection(CollectionKind::Documents, dimension)
            .await?;
        store
            .ensure_collection(CollectionKind::Metadata, dimension)
            .await?;

        let history = HistoryStore::connect(config.paths.history_db_path.clone()).await?;

        tracing::info!("completion backend: {}", config.completion.backend.as_str());
        let backend = build_backend(&config)?;
        let orchestrator = CompletionOrchestrator::new(backend, history.clone());

        let ingestor = Ingestor::new(Arc::clone(&provider), store.clone());
        let bots = BotRegistry::new(config.bots.clone(), config.paths.schema_dir.clone());

        Ok(Arc::new(Self {
            config,
            provider,
            store,
            history,
            bots,
            orchestrator,
            ingestor,
        }))
    }
}
