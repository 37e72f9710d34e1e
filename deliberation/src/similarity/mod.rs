//! Text similarity: pluggable embedding backends behind a cached encoder.

pub mod backend;
pub mod encoder;
pub mod keyword;
pub mod metrics;

pub use backend::{EncodingError, SharedBackend, TextSimilarityBackend};
pub use encoder::{CacheStats, SemanticEncoder, SharedEncoder, DEFAULT_CACHE_CAPACITY};
pub use keyword::{tokenize, KeywordBackend, DEFAULT_KEYWORD_DIMENSION};
pub use metrics::{cosine_distance, cosine_similarity};
