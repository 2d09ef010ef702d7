//! Ingestion paths: embed-and-store for raw text and uploaded files, and
//! manifest-driven metadata ingestion from a directory link.
//!
//! Both run continue-and-report: one item failing never aborts its
//! siblings, and each item's outcome is reported individually.

use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embeddings::EmbeddingProvider;
use crate::errors::ApiError;
use crate::vector::{DocumentRecord, InsertOutcome, MetadataRecord, SqliteVectorStore};

const META_FILE_NAME: &str = "meta.json";
const ACCEPTED_EXTENSIONS: [&str; 2] = [".txt", ".md"];

#[derive(Debug, Deserialize)]
pub struct FileItem {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct DocumentIngestRequest {
    pub text: Option<String>,
    #[serde(default)]
    pub files: Vec<FileItem>,
    #[serde(default)]
    pub save: bool,
    #[serde(default)]
    pub is_public: bool,
    pub bot_id: String,
    pub chat_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MetadataIngestRequest {
    pub link: String,
    pub chat_id: String,
    #[serde(default)]
    pub is_public: bool,
    pub bot_id: String,
}

/// Per-item result of an ingestion batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Stored,
    /// Suppressed by the public dedup gate.
    Duplicate,
    /// Metadata already ingested under this `(chat_id, cid)` key.
    AlreadyExists,
    /// Embedded without storing (`save` not set).
    Embedded { embedding: Vec<f32> },
    Error { message: String },
}

#[derive(Debug, Serialize)]
pub struct ItemReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

#[derive(Debug, Serialize)]
pub struct IngestReport {
    pub chat_id: String,
    pub items: Vec<ItemReport>,
}

/// Directory-style manifest at the ingestion link: maps content ids to
/// fetchable file names.
#[derive(Debug, Deserialize)]
pub struct DirectoryManifest {
    pub links: Vec<ManifestLink>,
}

#[derive(Debug, Deserialize)]
pub struct ManifestLink {
    pub name: String,
    pub cid: String,
}

/// The `meta.json` payload: one description per content id.
#[derive(Debug, Deserialize)]
pub struct MetaManifest {
    pub files: Vec<MetaEntry>,
}

#[derive(Debug, Deserialize)]
pub struct MetaEntry {
    pub cid: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct Ingestor {
    provider: Arc<dyn EmbeddingProvider>,
    store: SqliteVectorStore,
    client: Client,
}

impl Ingestor {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, store: SqliteVectorStore) -> Self {
        Self {
            provider,
            store,
            client: Client::new(),
        }
    }

    /// Embeds each text/file item and, when `save` is set, inserts it
    /// through the dedup gate. A missing `chat_id` gets a fresh UUID so
    /// the caller can keep addressing the same conversation.
    pub async fn ingest_documents(&self, request: DocumentIngestRequest) -> IngestReport {
        let chat_id = request
            .chat_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut items: Vec<(String, String)> = Vec::new();
        if let Some(text) = request.text {
            items.push(("text".to_string(), text));
        }
        for file in request.files {
            items.push((file.name, file.content));
        }

        let mut reports = Vec::with_capacity(items.len());
        for (name, content) in items {
            let outcome = self
                .ingest_one_document(
                    &chat_id,
                    &name,
                    &content,
                    request.save,
                    request.is_public,
                    &request.bot_id,
                )
                .await;
            reports.push(ItemReport { name, outcome });
        }

        IngestReport {
            chat_id,
            items: reports,
        }
    }

    async fn ingest_one_document(
        &self,
        chat_id: &str,
        name: &str,
        content: &str,
        save: bool,
        is_public: bool,
        bot_id: &str,
    ) -> ItemOutcome {
        if name != "text" && !accepted_file_name(name) {
            return ItemOutcome::Error {
                message: format!("unsupported file type: {name}"),
            };
        }
        if content.is_empty() {
            return ItemOutcome::Error {
                message: "empty content".to_string(),
            };
        }

        let embedding = match self.provider.embed(content).await {
            Ok(embedding) => embedding,
            Err(err) => {
                tracing::warn!("embedding failed for {name}: {err}");
                return ItemOutcome::Error {
                    message: err.to_string(),
                };
            }
        };

        if !save {
            return ItemOutcome::Embedded { embedding };
        }

        let record = DocumentRecord {
            chat_id: chat_id.to_string(),
            title: name.to_string(),
            content: content.to_string(),
            embedding,
            is_public,
            bot_id: bot_id.to_string(),
        };

        match self.store.insert_document(record).await {
            Ok(InsertOutcome::Inserted) => ItemOutcome::Stored,
            Ok(InsertOutcome::Duplicate) => ItemOutcome::Duplicate,
            Err(err) => {
                tracing::error!("document insert failed for {name}: {err}");
                ItemOutcome::Error {
                    message: err.to_string(),
                }
            }
        }
    }

    /// Fetches the directory manifest at `link`, then its `meta.json`, and
    /// ingests one metadata record per described file. Re-running with the
    /// same `(chat_id, cid)` pairs is a no-op per pair.
    pub async fn ingest_metadata(
        &self,
        request: MetadataIngestRequest,
    ) -> Result<Vec<ItemReport>, ApiError> {
        let link = request.link.trim_end_matches('/').to_string();

        let manifest: DirectoryManifest = self.fetch_json(&link).await?;

        if !manifest.links.iter().any(|l| l.name == META_FILE_NAME) {
            return Err(ApiError::BadRequest(format!(
                "manifest at {link} has no {META_FILE_NAME} entry"
            )));
        }

        let meta: MetaManifest = self.fetch_json(&format!("{link}/{META_FILE_NAME}")).await?;

        Ok(self
            .process_metadata_entries(&link, &manifest.links, meta.files, &request)
            .await)
    }

    /// The network-free half of metadata ingestion.
    async fn process_metadata_entries(
        &self,
        link: &str,
        links: &[ManifestLink],
        entries: Vec<MetaEntry>,
        request: &MetadataIngestRequest,
    ) -> Vec<ItemReport> {
        let mut reports = Vec::with_capacity(entries.len());

        for entry in entries {
            let name = entry.cid.clone().unwrap_or_else(|| "unknown".to_string());
            let outcome = self
                .ingest_one_metadata(link, links, entry, request)
                .await;
            reports.push(ItemReport { name, outcome });
        }

        reports
    }

    async fn ingest_one_metadata(
        &self,
        link: &str,
        links: &[ManifestLink],
        entry: MetaEntry,
        request: &MetadataIngestRequest,
    ) -> ItemOutcome {
        let (Some(cid), Some(description)) = (entry.cid, entry.description) else {
            return ItemOutcome::Error {
                message: "entry is missing cid or description".to_string(),
            };
        };

        let Some(file_name) = links.iter().find(|l| l.cid == cid).map(|l| l.name.as_str())
        else {
            return ItemOutcome::Error {
                message: format!("cid {cid} is not listed in the directory manifest"),
            };
        };

        match self.store.exists_by_key(&request.chat_id, &cid).await {
            Ok(true) => return ItemOutcome::AlreadyExists,
            Ok(false) => {}
            Err(err) => {
                return ItemOutcome::Error {
                    message: err.to_string(),
                }
            }
        }

        let embedding = match self.provider.embed(&description).await {
            Ok(embedding) => embedding,
            Err(err) => {
                tracing::warn!("embedding failed for cid {cid}: {err}");
                return ItemOutcome::Error {
                    message: err.to_string(),
                };
            }
        };

        let record = MetadataRecord {
            chat_id: request.chat_id.clone(),
            cid,
            description,
            embedding,
            url: format!("{link}/{file_name}"),
            is_public: request.is_public,
            bot_id: request.bot_id.clone(),
        };

        match self.store.insert_metadata(record).await {
            Ok(InsertOutcome::Inserted) => ItemOutcome::Stored,
            Ok(InsertOutcome::Duplicate) => ItemOutcome::Duplicate,
            Err(err) => {
                tracing::error!("metadata insert failed: {err}");
                ItemOutcome::Error {
                    message: err.to_string(),
                }
            }
        }
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ApiError::provider)?;

        if !res.status().is_success() {
            return Err(ApiError::Provider(format!(
                "fetching {url} failed with status {}",
                res.status()
            )));
        }

        res.json().await.map_err(ApiError::provider)
    }
}

fn accepted_file_name(name: &str) -> bool {
    ACCEPTED_EXTENSIONS
        .iter()
        .any(|ext| name.to_lowercase().ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::CollectionKind;
    use async_trait::async_trait;

    struct FixedProvider;

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn dimension(&self) -> usize {
            3
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError> {
            if text.contains("unembeddable") {
                return Err(ApiError::NoEmbeddableContent);
            }
            Ok(vec![1.0, 0.0, 0.0])
        }
    }

    async fn ingestor() -> (tempfile::TempDir, Ingestor) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::connect(dir.path().join("vectors.db"))
            .await
            .unwrap();
        store
            .ensure_collection(CollectionKind::Documents, 3)
            .await
            .unwrap();
        store
            .ensure_collection(CollectionKind::Metadata, 3)
            .await
            .unwrap();
        (dir, Ingestor::new(Arc::new(FixedProvider), store))
    }

    fn doc_request(files: Vec<FileItem>, save: bool) -> DocumentIngestRequest {
        DocumentIngestRequest {
            text: None,
            files,
            save,
            is_public: false,
            bot_id: "b1".to_string(),
            chat_id: Some("c1".to_string()),
        }
    }

    #[tokio::test]
    async fn one_failing_item_does_not_abort_siblings() {
        let (_dir, ingestor) = ingestor().await;

        let report = ingestor
            .ingest_documents(doc_request(
                vec![
                    FileItem {
                        name: "good.txt".into(),
                        content: "fine".into(),
                    },
                    FileItem {
                        name: "bad.txt".into(),
                        content: "unembeddable".into(),
                    },
                    FileItem {
                        name: "also-good.md".into(),
                        content: "fine too".into(),
                    },
                ],
                true,
            ))
            .await;

        assert_eq!(report.items.len(), 3);
        assert_eq!(report.items[0].outcome, ItemOutcome::Stored);
        assert!(matches!(report.items[1].outcome, ItemOutcome::Error { .. }));
        assert_eq!(report.items[2].outcome, ItemOutcome::Stored);
    }

    #[tokio::test]
    async fn rejects_unsupported_file_types() {
        let (_dir, ingestor) = ingestor().await;

        let report = ingestor
            .ingest_documents(doc_request(
                vec![FileItem {
                    name: "image.png".into(),
                    content: "binary".into(),
                }],
                true,
            ))
            .await;

        assert!(matches!(report.items[0].outcome, ItemOutcome::Error { .. }));
    }

    #[tokio::test]
    async fn missing_chat_id_is_generated() {
        let (_dir, ingestor) = ingestor().await;

        let mut request = doc_request(vec![], false);
        request.chat_id = None;
        request.text = Some("hello".into());

        let report = ingestor.ingest_documents(request).await;
        assert!(!report.chat_id.is_empty());
        assert!(matches!(
            report.items[0].outcome,
            ItemOutcome::Embedded { .. }
        ));
    }

    #[tokio::test]
    async fn metadata_ingestion_is_idempotent_per_key() {
        let (_dir, ingestor) = ingestor().await;

        let links = vec![
            ManifestLink {
                name: "a.pdf".into(),
                cid: "cid-a".into(),
            },
            ManifestLink {
                name: META_FILE_NAME.into(),
                cid: "cid-meta".into(),
            },
        ];
        let request = MetadataIngestRequest {
            link: "http://example.test/dir".into(),
            chat_id: "c1".into(),
            is_public: false,
            bot_id: "b1".into(),
        };
        let entry = || MetaEntry {
            cid: Some("cid-a".into()),
            description: Some("a report".into()),
        };

        let first = ingestor
            .process_metadata_entries("http://example.test/dir", &links, vec![entry()], &request)
            .await;
        assert_eq!(first[0].outcome, ItemOutcome::Stored);

        let second = ingestor
            .process_metadata_entries("http://example.test/dir", &links, vec![entry()], &request)
            .await;
        assert_eq!(second[0].outcome, ItemOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn unresolvable_cid_is_a_per_item_error() {
        let (_dir, ingestor) = ingestor().await;

        let request = MetadataIngestRequest {
            link: "http://example.test/dir".into(),
            chat_id: "c1".into(),
            is_public: false,
            bot_id: "b1".into(),
        };
        let reports = ingestor
            .process_metadata_entries(
                "http://example.test/dir",
                &[],
                vec![MetaEntry {
                    cid: Some("nope".into()),
                    description: Some("d".into()),
                }],
                &request,
            )
            .await;

        assert!(matches!(reports[0].outcome, ItemOutcome::Error { .. }));
    }
}
