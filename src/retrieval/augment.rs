//! Query augmentation.
//!
//! Merges the top-ranked documents into a single prompt and produces the
//! citation references shown to the caller. References are display-only
//! and never fed back into the model.

use serde::Serialize;

use crate::vector::{DocumentRecord, RankedResult};

/// At most this many documents are merged into the prompt.
pub const MAX_AUGMENT_DOCS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocReference {
    pub title: String,
    pub similarity: f64,
}

/// Builds the augmented prompt and its references from ranked documents.
///
/// Callers should bypass this entirely when no documents qualify and use
/// the raw query with an empty reference list.
pub fn augment_query(
    query: &str,
    documents: &[RankedResult<DocumentRecord>],
) -> (String, Vec<DocReference>) {
    let top = &documents[..documents.len().min(MAX_AUGMENT_DOCS)];

    let mut doc_lines = Vec::with_capacity(top.len());
    let mut references = Vec::with_capacity(top.len());

    for result in top {
        doc_lines.push(format!("{}: {}", result.record.title, result.record.content));
        references.push(DocReference {
            title: result.record.title.clone(),
            similarity: round4(result.similarity as f64),
        });
    }

    let augmented = format!(
        "Based on the following documents:\n{}\n\nAnswer the question: {}",
        doc_lines.join("\n"),
        query
    );

    (augmented, references)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(title: &str, content: &str, similarity: f32) -> RankedResult<DocumentRecord> {
        RankedResult {
            similarity,
            record: DocumentRecord {
                chat_id: "c1".to_string(),
                title: title.to_string(),
                content: content.to_string(),
                embedding: vec![],
                is_public: false,
                bot_id: "b1".to_string(),
            },
        }
    }

    #[test]
    fn merges_documents_and_question() {
        let (prompt, references) = augment_query("Q", &[document("T", "C", 0.9)]);

        assert!(prompt.contains("T: C"));
        assert!(prompt.ends_with("Answer the question: Q"));
        assert_eq!(
            references,
            vec![DocReference {
                title: "T".to_string(),
                similarity: 0.9,
            }]
        );
    }

    #[test]
    fn joins_documents_with_newlines_in_rank_order() {
        let docs = vec![
            document("first", "aaa", 0.9),
            document("second", "bbb", 0.8),
        ];
        let (prompt, references) = augment_query("what?", &docs);

        assert!(prompt.contains("first: aaa\nsecond: bbb"));
        assert_eq!(references.len(), 2);
        assert_eq!(references[0].title, "first");
    }

    #[test]
    fn truncates_to_top_three() {
        let docs = vec![
            document("a", "1", 0.9),
            document("b", "2", 0.8),
            document("c", "3", 0.7),
            document("d", "4", 0.6),
        ];
        let (prompt, references) = augment_query("q", &docs);

        assert_eq!(references.len(), 3);
        assert!(!prompt.contains("d: 4"));
    }

    #[test]
    fn similarity_is_rounded_to_four_decimals() {
        let (_, references) = augment_query("q", &[document("t", "c", 0.123_456_78)]);
        assert_eq!(references[0].similarity, 0.1235);
    }
}
