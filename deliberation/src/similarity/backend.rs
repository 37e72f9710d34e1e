//! Text similarity backend port.

use std::sync::Arc;

use thiserror::Error;

/// Errors an embedding backend can raise.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncodingError {
    /// The backend (model, service) cannot be reached or loaded.
    #[error("embedding backend unavailable: {0}")]
    Unavailable(String),

    /// The backend was reachable but failed on this input.
    #[error("embedding backend error: {0}")]
    Backend(String),

    /// The backend returned a zero-length vector.
    #[error("embedding backend returned an empty vector")]
    EmptyVector,
}

/// Converts text into a dense vector for similarity comparison.
///
/// Implementations must be deterministic for a given text within one
/// process; the deterministic keyword backend also guarantees it across
/// processes.
pub trait TextSimilarityBackend: Send + Sync {
    /// Backend name for diagnostics (e.g. "keyword", "minilm").
    fn name(&self) -> &str;

    /// Vector dimension, if fixed.
    fn dimension(&self) -> Option<usize> {
        None
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EncodingError>;
}

/// Shared handle to a backend.
pub type SharedBackend = Arc<dyn TextSimilarityBackend>;
