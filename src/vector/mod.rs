//! Vector similarity storage.
//!
//! Two schema-typed collections (free-text documents and link/file
//! metadata) with cosine-ranked search, a visibility filter, and a
//! dedup-on-insert gate for the public corpus.

mod store;

pub use store::SqliteVectorStore;

use serde::Serialize;

use crate::errors::ApiError;

/// The two independent collections. Both share the identity + embedding +
/// visibility field pattern; their content fields differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Documents,
    Metadata,
}

impl CollectionKind {
    pub fn name(self) -> &'static str {
        match self {
            CollectionKind::Documents => "documents",
            CollectionKind::Metadata => "metadata",
        }
    }
}

/// A free-text document. Created on ingestion, never mutated.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub chat_id: String,
    pub title: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub is_public: bool,
    pub bot_id: String,
}

/// A link/file metadata record, keyed additionally by a content identifier
/// (`cid`) for idempotent re-ingestion.
#[derive(Debug, Clone)]
pub struct MetadataRecord {
    pub chat_id: String,
    pub cid: String,
    pub description: String,
    pub embedding: Vec<f32>,
    pub url: String,
    pub is_public: bool,
    pub bot_id: String,
}

/// A transient search hit: cosine similarity paired with the payload.
#[derive(Debug, Clone, Serialize)]
pub struct RankedResult<T> {
    pub similarity: f32,
    pub record: T,
}

/// Visibility scope for a search: the caller's own private records plus
/// the public corpus for its bot. Never another conversation's private
/// records.
#[derive(Debug, Clone)]
pub struct VisibilityFilter {
    pub chat_id: String,
    pub bot_id: String,
}

/// Whether an insert landed or was suppressed by the dedup gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

pub(crate) fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub(crate) fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

pub(crate) fn check_dimension(
    collection: CollectionKind,
    declared: usize,
    actual: usize,
) -> Result<(), ApiError> {
    if declared != actual {
        return Err(ApiError::DimensionMismatch(format!(
            "collection {} expects dimension {declared}, got {actual}",
            collection.name()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_bytes_round_trip() {
        let original = vec![1.0_f32, -0.5, 0.25];
        let bytes = serialize_embedding(&original);
        assert_eq!(deserialize_embedding(&bytes), original);
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.3_f32, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn mismatched_lengths_score_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
    }
}
