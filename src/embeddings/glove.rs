//! Static word-vector embeddings.
//!
//! A pretrained 50-dimension word-vector table averaged over the words of
//! the input. Words missing from the vocabulary go through an edit-distance
//! fallback; the fallback scans the whole vocabulary and must only run on
//! a miss, never unconditionally.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::errors::ApiError;

use super::EmbeddingProvider;

const DIMENSION: usize = 50;

pub struct GloveEmbeddings {
    dir: PathBuf,
    table: OnceCell<Arc<GloveTable>>,
}

pub struct GloveTable {
    vectors: HashMap<String, Vec<f32>>,
}

impl GloveTable {
    pub fn from_reader(reader: impl BufRead) -> std::io::Result<Self> {
        let mut vectors = HashMap::new();

        for line in reader.lines() {
            let line = line?;
            let mut parts = line.split_whitespace();
            let Some(word) = parts.next() else { continue };
            let vector: Vec<f32> = parts.filter_map(|p| p.parse().ok()).collect();
            if !vector.is_empty() {
                vectors.insert(word.to_string(), vector);
            }
        }

        Ok(Self { vectors })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    fn lookup(&self, word: &str) -> Option<&Vec<f32>> {
        self.vectors.get(word)
    }

    /// Nearest vocabulary entry by edit distance, accepted only within a
    /// length-scaled threshold: at most 2 edits for words of length 5 or
    /// less, at most 3 otherwise.
    fn closest_word(&self, word: &str) -> Option<&str> {
        let threshold = if word.chars().count() <= 5 { 2 } else { 3 };

        let mut best_match: Option<&str> = None;
        let mut best_distance = usize::MAX;

        for candidate in self.vectors.keys() {
            let distance = levenshtein(word, candidate);
            if distance < best_distance {
                best_distance = distance;
                best_match = Some(candidate);
            }
        }

        if best_distance <= threshold {
            best_match
        } else {
            None
        }
    }

    /// Averages the vectors of all resolvable words in the text.
    pub fn text_embedding(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        let words: Vec<String> = text
            .split_whitespace()
            .map(|w| clean_word(&w.to_lowercase()))
            .filter(|w| !w.is_empty())
            .collect();

        let mut vectors: Vec<&Vec<f32>> = Vec::with_capacity(words.len());
        for word in &words {
            if let Some(vector) = self.lookup(word) {
                vectors.push(vector);
            } else if let Some(closest) = self.closest_word(word) {
                tracing::debug!("word {word:?} not in vocabulary, using {closest:?}");
                // closest_word only returns keys present in the table
                vectors.push(&self.vectors[closest]);
            } else {
                tracing::debug!("word {word:?} not in vocabulary and no close match");
            }
        }

        if vectors.is_empty() {
            return Err(ApiError::NoEmbeddableContent);
        }

        let dimension = vectors[0].len();
        let mut average = vec![0.0_f32; dimension];
        for vector in &vectors {
            for (slot, value) in average.iter_mut().zip(vector.iter()) {
                *slot += value;
            }
        }
        let count = vectors.len() as f32;
        for slot in &mut average {
            *slot /= count;
        }

        Ok(average)
    }
}

impl GloveEmbeddings {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            table: OnceCell::new(),
        }
    }

    async fn table(&self) -> Result<Arc<GloveTable>, ApiError> {
        let dir = self.dir.clone();
        self.table
            .get_or_try_init(|| async move {
                let table = tokio::task::spawn_blocking(move || load_table(&dir))
                    .await
                    .map_err(ApiError::internal)??;
                tracing::info!("loaded word-vector table ({} words)", table.len());
                Ok(Arc::new(table))
            })
            .await
            .map(Arc::clone)
    }
}

fn load_table(dir: &PathBuf) -> Result<GloveTable, ApiError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|err| {
            ApiError::Configuration(format!(
                "failed to read word-vector directory {}: {err}",
                dir.display()
            ))
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    files.sort();

    let Some(path) = files.first() else {
        return Err(ApiError::Configuration(format!(
            "no .txt word-vector file found in {}",
            dir.display()
        )));
    };

    let file = std::fs::File::open(path).map_err(|err| {
        ApiError::Configuration(format!("failed to open {}: {err}", path.display()))
    })?;
    let table = GloveTable::from_reader(std::io::BufReader::new(file))
        .map_err(ApiError::internal)?;

    if table.is_empty() {
        return Err(ApiError::Configuration(format!(
            "word-vector file {} contained no vectors",
            path.display()
        )));
    }

    Ok(table)
}

/// Strips leading and trailing non-word characters.
fn clean_word(word: &str) -> String {
    word.trim_matches(|c: char| !(c.is_alphanumeric() || c == '_'))
        .to_string()
}

/// Classic dynamic-programming edit distance with unit costs.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1) // deletion
                .min(current[j] + 1); // insertion
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

#[async_trait]
impl EmbeddingProvider for GloveEmbeddings {
    fn name(&self) -> &'static str {
        "glove"
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        let table = self.table().await?;
        let text = text.to_string();

        tokio::task::spawn_blocking(move || table.text_embedding(&text))
            .await
            .map_err(ApiError::internal)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn table(entries: &str) -> GloveTable {
        GloveTable::from_reader(Cursor::new(entries)).unwrap()
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("abcd", "abcd"), 0);
        assert_eq!(levenshtein("abcd", "abxy"), 2);
    }

    #[test]
    fn fallback_accepts_distance_two_for_short_words() {
        let t = table("abcd 1.0 0.0");
        // length 4, distance 2: within the threshold
        assert_eq!(t.closest_word("abxy"), Some("abcd"));
        // distance 3: rejected
        assert_eq!(t.closest_word("axyz"), None);
    }

    #[test]
    fn fallback_allows_distance_three_for_longer_words() {
        let t = table("abcdefgh 1.0 0.0");
        assert_eq!(t.closest_word("abcdexyz"), Some("abcdefgh"));
    }

    #[test]
    fn averages_known_word_vectors() {
        let t = table("hello 1.0 0.0\nworld 0.0 1.0");
        let embedding = t.text_embedding("Hello, world!").unwrap();
        assert_eq!(embedding, vec![0.5, 0.5]);
    }

    #[test]
    fn unresolvable_words_are_dropped_not_zeroed() {
        let t = table("hello 1.0 0.0");
        // "zzzzzzzzzz" has no close match and must not contribute
        let embedding = t.text_embedding("hello zzzzzzzzzz").unwrap();
        assert_eq!(embedding, vec![1.0, 0.0]);
    }

    #[test]
    fn empty_averaging_set_is_an_error() {
        let t = table("hello 1.0 0.0");
        let err = t.text_embedding("qqqqqqqqqqqq").unwrap_err();
        assert!(matches!(err, ApiError::NoEmbeddableContent));
    }

    #[test]
    fn punctuation_is_stripped_before_lookup() {
        let t = table("hello 1.0 0.0");
        let embedding = t.text_embedding("\"hello!\"").unwrap();
        assert_eq!(embedding, vec![1.0, 0.0]);
    }
}
