//! Per-bot configuration and intent schema loading.
//!
//! Bots are declared in the config file; their intent schemas live as JSON
//! files in the schema directory and are read per request so edits take
//! effect without a restart.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::errors::ApiError;
use crate::intent::{self, Intent, IntentSchema};

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub intro: String,
    pub schema: String,
}

#[derive(Debug, Clone)]
pub struct BotRegistry {
    bots: Arc<HashMap<String, BotConfig>>,
    schema_dir: PathBuf,
}

impl BotRegistry {
    pub fn new(bots: HashMap<String, BotConfig>, schema_dir: PathBuf) -> Self {
        Self {
            bots: Arc::new(bots),
            schema_dir,
        }
    }

    pub fn get(&self, bot_id: &str) -> Result<&BotConfig, ApiError> {
        self.bots
            .get(bot_id)
            .ok_or_else(|| ApiError::NotFound(format!("unknown bot: {bot_id}")))
    }

    pub async fn load_intents(&self, bot_id: &str) -> Result<Vec<Intent>, ApiError> {
        let bot = self.get(bot_id)?;
        let path = self.schema_dir.join(&bot.schema);

        let data = tokio::fs::read_to_string(&path).await.map_err(|err| {
            ApiError::NotFound(format!(
                "intent schema not found for bot {bot_id}: {err}"
            ))
        })?;

        let schema: IntentSchema = serde_json::from_str(&data).map_err(|err| {
            ApiError::Internal(format!("invalid intent schema for bot {bot_id}: {err}"))
        })?;

        Ok(schema.intents)
    }

    /// The full system prompt for a bot: intents plus persona.
    pub async fn system_prompt(&self, bot_id: &str) -> Result<String, ApiError> {
        let intents = self.load_intents(bot_id).await?;
        let bot = self.get(bot_id)?;
        Ok(intent::create_system_prompt(&intents, &bot.intro))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(dir: &std::path::Path) -> BotRegistry {
        let mut bots = HashMap::new();
        bots.insert(
            "support".to_string(),
            BotConfig {
                intro: "Support bot".to_string(),
                schema: "support.json".to_string(),
            },
        );
        BotRegistry::new(bots, dir.to_path_buf())
    }

    #[tokio::test]
    async fn loads_schema_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("support.json"),
            r#"{"intents": [{"name": "greet", "description": "Say hello"}]}"#,
        )
        .unwrap();

        let registry = registry_with(dir.path());
        let prompt = registry.system_prompt("support").await.unwrap();
        assert!(prompt.contains("\"greet\": Say hello"));
        assert!(prompt.contains("**Support bot**"));
    }

    #[tokio::test]
    async fn unknown_bot_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(dir.path());
        let err = registry.system_prompt("nope").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn missing_schema_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(dir.path());
        let err = registry.system_prompt("support").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
