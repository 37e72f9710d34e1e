//! Deterministic bag-of-keywords backend.
//!
//! Tokens are lowercased alphanumeric runs; stopwords and single
//! characters are dropped. Each token is hashed with blake3 into one of
//! `dimension` buckets and the counts are L2-normalised. Same text, same
//! vector, on every platform and release.

use super::backend::{EncodingError, TextSimilarityBackend};
use super::metrics::l2_normalize;

/// Default number of hash buckets.
pub const DEFAULT_KEYWORD_DIMENSION: usize = 256;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "do", "does", "for",
    "from", "has", "have", "he", "her", "his", "i", "if", "in", "into", "is", "it", "its", "me",
    "my", "no", "not", "of", "on", "or", "our", "she", "so", "than", "that", "the", "their",
    "them", "then", "there", "these", "they", "this", "those", "to", "us", "was", "we", "were",
    "what", "when", "which", "who", "will", "with", "would", "you", "your",
];

/// Split text into lowercase content tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Hash-bucket keyword embedding.
#[derive(Debug, Clone)]
pub struct KeywordBackend {
    dimension: usize,
}

impl KeywordBackend {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Infallible encoding; an empty or all-stopword text maps to the zero vector.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        for token in tokenize(text) {
            vector[self.bucket(&token)] += 1.0;
        }
        l2_normalize(&mut vector);
        vector
    }

    fn bucket(&self, token: &str) -> usize {
        let hash = blake3::hash(token.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        (u64::from_le_bytes(head) % self.dimension as u64) as usize
    }
}

impl Default for KeywordBackend {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORD_DIMENSION)
    }
}

impl TextSimilarityBackend for KeywordBackend {
    fn name(&self) -> &str {
        "keyword"
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EncodingError> {
        Ok(self.embed(text))
    }
}
