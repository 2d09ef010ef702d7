//! Startup configuration.
//!
//! Everything is read once from a TOML file into an immutable `AppConfig`
//! that is injected into the components that need it. Provider and backend
//! selection are validated here; a bad selection is fatal at startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::bots::BotConfig;
use crate::errors::ApiError;

/// Which embedding strategy is active for this process.
///
/// Switching providers requires re-indexing: each one produces vectors of a
/// different dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Remote embedding API (text-embedding-3-small).
    OpenAi,
    /// In-process sentence encoder (CLIP text tower).
    Encoder,
    /// Static pretrained word vectors with averaging.
    Glove,
    /// Local transformer feature extraction (all-MiniLM-L6-v2).
    MiniLm,
}

impl ProviderKind {
    pub fn dimension(self) -> usize {
        match self {
            ProviderKind::OpenAi => 1536,
            ProviderKind::Encoder => 512,
            ProviderKind::Glove => 50,
            ProviderKind::MiniLm => 384,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Encoder => "encoder",
            ProviderKind::Glove => "glove",
            ProviderKind::MiniLm => "minilm",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = ApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "openai" => Ok(ProviderKind::OpenAi),
            "encoder" => Ok(ProviderKind::Encoder),
            "glove" => Ok(ProviderKind::Glove),
            "minilm" => Ok(ProviderKind::MiniLm),
            other => Err(ApiError::Configuration(format!(
                "invalid embedding provider: {other}"
            ))),
        }
    }
}

/// Which chat completion backend is active for this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    OpenAi,
    DeepSeek,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::OpenAi => "openai",
            BackendKind::DeepSeek => "deepseek",
        }
    }
}

impl FromStr for BackendKind {
    type Err = ApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "openai" => Ok(BackendKind::OpenAi),
            "deepseek" => Ok(BackendKind::DeepSeek),
            other => Err(ApiError::Configuration(format!(
                "invalid completion backend: {other}"
            ))),
        }
    }
}

/// Filesystem layout derived from the configured data directory.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub vector_db_path: PathBuf,
    pub history_db_path: PathBuf,
    pub schema_dir: PathBuf,
    pub glove_dir: PathBuf,
}

impl AppPaths {
    fn new(data_dir: PathBuf, schema_dir: PathBuf, glove_dir: PathBuf) -> Self {
        Self {
            log_dir: data_dir.join("logs"),
            vector_db_path: data_dir.join("vectors.db"),
            history_db_path: data_dir.join("history.db"),
            data_dir,
            schema_dir,
            glove_dir,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    pub openai_api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub backend: BackendKind,
    pub openai_api_key: Option<String>,
    pub deepseek_api_key: Option<String>,
}

/// Immutable process-wide configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub embedding: EmbeddingConfig,
    pub completion: CompletionConfig,
    pub paths: AppPaths,
    pub bots: HashMap<String, BotConfig>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    server: RawServer,
    embedding: RawEmbedding,
    completion: RawCompletion,
    #[serde(default)]
    paths: RawPaths,
    #[serde(default)]
    bots: HashMap<String, BotConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct RawServer {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct RawEmbedding {
    provider: String,
    openai_api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCompletion {
    backend: String,
    openai_api_key: Option<String>,
    deepseek_api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPaths {
    data_dir: Option<PathBuf>,
    schema_dir: Option<PathBuf>,
    glove_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ApiError> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            ApiError::Configuration(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ApiError> {
        let raw: RawConfig = toml::from_str(text)
            .map_err(|err| ApiError::Configuration(format!("failed to parse config: {err}")))?;

        let provider: ProviderKind = raw.embedding.provider.parse()?;
        let backend: BackendKind = raw.completion.backend.parse()?;

        if provider == ProviderKind::OpenAi && raw.embedding.openai_api_key.is_none() {
            return Err(ApiError::Configuration(
                "embedding.openai_api_key is required for the openai provider".to_string(),
            ));
        }
        match backend {
            BackendKind::OpenAi if raw.completion.openai_api_key.is_none() => {
                return Err(ApiError::Configuration(
                    "completion.openai_api_key is required for the openai backend".to_string(),
                ));
            }
            BackendKind::DeepSeek if raw.completion.deepseek_api_key.is_none() => {
                return Err(ApiError::Configuration(
                    "completion.deepseek_api_key is required for the deepseek backend".to_string(),
                ));
            }
            _ => {}
        }

        let data_dir = raw
            .paths
            .data_dir
            .unwrap_or_else(|| PathBuf::from("./data"));
        let schema_dir = raw
            .paths
            .schema_dir
            .unwrap_or_else(|| PathBuf::from("./config/intents"));
        let glove_dir = raw
            .paths
            .glove_dir
            .unwrap_or_else(|| PathBuf::from("./pretrain-embeddings"));

        Ok(AppConfig {
            server: ServerConfig {
                host: raw.server.host.unwrap_or_else(|| "127.0.0.1".to_string()),
                port: raw.server.port.unwrap_or(8000),
            },
            embedding: EmbeddingConfig {
                provider,
                openai_api_key: raw.embedding.openai_api_key,
            },
            completion: CompletionConfig {
                backend,
                openai_api_key: raw.completion.openai_api_key,
                deepseek_api_key: raw.completion.deepseek_api_key,
            },
            paths: AppPaths::new(data_dir, schema_dir, glove_dir),
            bots: raw.bots,
        })
    }
}
