//! Ranked-result filtering.
//!
//! Two distinct weak-match policies, intentionally not unified: documents
//! and metadata each use a hard per-provider similarity threshold, and the
//! metadata path additionally trims its low-similarity tail statistically.

use std::collections::HashSet;

use crate::config::ProviderKind;
use crate::vector::{MetadataRecord, RankedResult};

/// Minimum similarity for a document to qualify as context.
pub const fn document_threshold(provider: ProviderKind) -> f32 {
    match provider {
        ProviderKind::OpenAi => 0.6,
        ProviderKind::Encoder => 0.3,
        ProviderKind::Glove => 0.2,
        ProviderKind::MiniLm => 0.5,
    }
}

/// Minimum similarity for a metadata record to qualify.
pub const fn metadata_threshold(provider: ProviderKind) -> f32 {
    match provider {
        ProviderKind::OpenAi => 0.4,
        ProviderKind::Encoder => 0.4,
        ProviderKind::Glove => 0.2,
        ProviderKind::MiniLm => 0.7,
    }
}

/// Keeps results with similarity at or above the threshold.
pub fn threshold_filter<T>(
    results: Vec<RankedResult<T>>,
    threshold: f32,
) -> Vec<RankedResult<T>> {
    results
        .into_iter()
        .filter(|r| r.similarity >= threshold)
        .collect()
}

/// Drops results more than half a standard deviation below the mean
/// similarity. Fewer than two results pass through unfiltered.
pub fn outlier_filter<T>(results: Vec<RankedResult<T>>) -> Vec<RankedResult<T>> {
    if results.len() < 2 {
        return results;
    }

    let n = results.len() as f64;
    let mean = results.iter().map(|r| r.similarity as f64).sum::<f64>() / n;
    let variance = results
        .iter()
        .map(|r| (r.similarity as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    let lower_bound = mean - variance.sqrt() * 0.5;

    results
        .into_iter()
        .filter(|r| r.similarity as f64 >= lower_bound)
        .collect()
}

/// Keeps the first (highest-ranked) result per content identifier.
pub fn dedup_by_cid(
    results: Vec<RankedResult<MetadataRecord>>,
) -> Vec<RankedResult<MetadataRecord>> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.record.cid.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(similarities: &[f32]) -> Vec<RankedResult<&'static str>> {
        similarities
            .iter()
            .map(|&similarity| RankedResult {
                similarity,
                record: "payload",
            })
            .collect()
    }

    #[test]
    fn threshold_keeps_exact_boundary() {
        let kept = threshold_filter(ranked(&[0.61, 0.6, 0.59]), 0.6);
        let scores: Vec<f32> = kept.iter().map(|r| r.similarity).collect();
        assert_eq!(scores, vec![0.61, 0.6]);
    }

    #[test]
    fn thresholds_are_per_provider_constants() {
        assert_eq!(document_threshold(ProviderKind::OpenAi), 0.6);
        assert_eq!(metadata_threshold(ProviderKind::OpenAi), 0.4);
        assert_eq!(document_threshold(ProviderKind::Encoder), 0.3);
        assert_eq!(metadata_threshold(ProviderKind::Encoder), 0.4);
        assert_eq!(document_threshold(ProviderKind::Glove), 0.2);
        assert_eq!(metadata_threshold(ProviderKind::Glove), 0.2);
        assert_eq!(document_threshold(ProviderKind::MiniLm), 0.5);
        assert_eq!(metadata_threshold(ProviderKind::MiniLm), 0.7);
    }

    #[test]
    fn outlier_filter_drops_low_tail() {
        // mean 0.65, population stddev ~0.3188, lower bound ~0.4906
        let kept = outlier_filter(ranked(&[0.9, 0.85, 0.2]));
        let scores: Vec<f32> = kept.iter().map(|r| r.similarity).collect();
        assert_eq!(scores, vec![0.9, 0.85]);
    }

    #[test]
    fn outlier_filter_passes_small_sets_through() {
        assert_eq!(outlier_filter(ranked(&[0.1])).len(), 1);
        assert!(outlier_filter(ranked(&[])).is_empty());
    }

    #[test]
    fn dedup_keeps_highest_ranked_per_cid() {
        let make = |cid: &str, similarity: f32| RankedResult {
            similarity,
            record: MetadataRecord {
                chat_id: "c".to_string(),
                cid: cid.to_string(),
                description: String::new(),
                embedding: vec![],
                url: String::new(),
                is_public: false,
                bot_id: "b".to_string(),
            },
        };

        let deduped = dedup_by_cid(vec![make("a", 0.9), make("b", 0.8), make("a", 0.7)]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].record.cid, "a");
        assert_eq!(deduped[0].similarity, 0.9);
    }
}
