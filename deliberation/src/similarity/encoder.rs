//! Cached, fault-tolerant text encoder.
//!
//! One `SemanticEncoder` is built per engine and shared (via `Arc`) with the
//! emergence detector and influence tracker. It owns a bounded LRU cache;
//! there is no process-global embedding state.
//!
//! If the primary backend ever fails, the encoder logs once, switches to the
//! keyword backend for the rest of its life, and clears the cache so vectors
//! from different backends are never compared.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use tracing::{debug, warn};

use super::backend::{EncodingError, SharedBackend, TextSimilarityBackend};
use super::keyword::{KeywordBackend, DEFAULT_KEYWORD_DIMENSION};
use super::metrics::cosine_distance;
use crate::errors::FailureClass;

/// Default number of cached embeddings.
pub const DEFAULT_CACHE_CAPACITY: usize = 512;

/// Shared handle to an encoder.
pub type SharedEncoder = Arc<SemanticEncoder>;

/// Cache hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
}

struct EncoderState {
    cache: Option<LruCache<String, Vec<f32>>>,
    degraded: bool,
    hits: u64,
    misses: u64,
}

pub struct SemanticEncoder {
    primary: Option<SharedBackend>,
    fallback: KeywordBackend,
    state: Mutex<EncoderState>,
}

impl SemanticEncoder {
    /// Encoder backed only by the deterministic keyword backend.
    pub fn keyword(dimension: usize, cache_capacity: usize) -> Self {
        Self::build(None, KeywordBackend::new(dimension), cache_capacity)
    }

    /// Encoder with a learned primary backend and keyword fallback.
    pub fn with_primary(primary: SharedBackend, dimension: usize, cache_capacity: usize) -> Self {
        Self::build(Some(primary), KeywordBackend::new(dimension), cache_capacity)
    }

    fn build(primary: Option<SharedBackend>, fallback: KeywordBackend, capacity: usize) -> Self {
        Self {
            primary,
            fallback,
            state: Mutex::new(EncoderState {
                cache: NonZeroUsize::new(capacity).map(LruCache::new),
                degraded: false,
                hits: 0,
                misses: 0,
            }),
        }
    }

    pub fn shared(self) -> SharedEncoder {
        Arc::new(self)
    }

    /// Name of the backend currently producing vectors.
    pub fn active_backend(&self) -> String {
        match &self.primary {
            Some(primary) if !self.lock().degraded => primary.name().to_string(),
            _ => self.fallback.name().to_string(),
        }
    }

    /// Whether the primary backend failed and the keyword fallback took over.
    pub fn is_degraded(&self) -> bool {
        self.lock().degraded
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            len: state.cache.as_ref().map_or(0, LruCache::len),
        }
    }

    /// Encode text; never fails.
    pub fn encode(&self, text: &str) -> Vec<f32> {
        let mut state = self.lock();

        if let Some(hit) = state.cache.as_mut().and_then(|c| c.get(text)).cloned() {
            state.hits += 1;
            return hit;
        }
        state.misses += 1;

        let vector = match &self.primary {
            Some(primary) if !state.degraded => match primary.encode(text) {
                Ok(v) if !v.is_empty() => v,
                Ok(_) => self.degrade(&mut state, primary.as_ref(), EncodingError::EmptyVector, text),
                Err(err) => self.degrade(&mut state, primary.as_ref(), err, text),
            },
            _ => self.fallback.embed(text),
        };

        if let Some(cache) = state.cache.as_mut() {
            cache.put(text.to_string(), vector.clone());
        }
        vector
    }

    /// Cosine distance between two texts, in `[0, 1]`.
    pub fn distance(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 0.0;
        }
        let vectors = self.encode_batch(&[a, b]);
        cosine_distance(&vectors[0], &vectors[1])
    }

    /// Smallest distance from `text` to any of `others`; 1.0 if `others` is empty.
    ///
    /// A verbatim match is exactly 0.
    pub fn min_distance<'a, I>(&self, text: &str, others: I) -> f64
    where
        I: IntoIterator<Item = &'a str>,
    {
        let others: Vec<&str> = others.into_iter().collect();
        if others.iter().any(|other| *other == text) {
            return 0.0;
        }
        let mut texts = Vec::with_capacity(others.len() + 1);
        texts.push(text);
        texts.extend(others);
        let vectors = self.encode_batch(&texts);
        vectors[1..]
            .iter()
            .map(|other| cosine_distance(&vectors[0], other))
            .fold(1.0_f64, f64::min)
    }

    /// Encode texts with a single backend. If the primary fails partway
    /// through, the whole batch is re-encoded by the fallback.
    fn encode_batch(&self, texts: &[&str]) -> Vec<Vec<f32>> {
        let was_degraded = self.is_degraded();
        let vectors: Vec<Vec<f32>> = texts.iter().map(|t| self.encode(t)).collect();
        if !was_degraded && self.is_degraded() {
            return texts.iter().map(|t| self.encode(t)).collect();
        }
        vectors
    }

    fn degrade(
        &self,
        state: &mut EncoderState,
        primary: &dyn TextSimilarityBackend,
        err: EncodingError,
        text: &str,
    ) -> Vec<f32> {
        warn!(
            backend = primary.name(),
            error = %err,
            class = %FailureClass::of_encoding_error(&err),
            fallback = self.fallback.name(),
            "embedding backend failed; switching to keyword fallback"
        );
        state.degraded = true;
        if let Some(cache) = state.cache.as_mut() {
            debug!(evicted = cache.len(), "clearing embedding cache after backend switch");
            cache.clear();
        }
        self.fallback.embed(text)
    }

    fn lock(&self) -> MutexGuard<'_, EncoderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SemanticEncoder {
    fn default() -> Self {
        Self::keyword(DEFAULT_KEYWORD_DIMENSION, DEFAULT_CACHE_CAPACITY)
    }
}

impl std::fmt::Debug for SemanticEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticEncoder")
            .field("active_backend", &self.active_backend())
            .field("stats", &self.stats())
            .finish()
    }
}
