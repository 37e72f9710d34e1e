//! Proposal: one agent's candidate answer for a round.
//!
//! Proposals are built once (builders consume `self`) and then shared by
//! value or clone. There are no setters; a revision is a new proposal.

use serde::{Deserialize, Serialize};

/// Default confidence when an agent does not report one.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// A candidate answer produced by one agent call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    id: String,
    author: String,
    content: String,
    confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
}

impl Proposal {
    /// Create a proposal with a fresh uuid id.
    pub fn new(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            author: author.into(),
            content: content.into(),
            confidence: DEFAULT_CONFIDENCE,
            tags: Vec::new(),
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Confidence is clamped to `0.0..=1.0`; NaN becomes 0.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Short preview of the content for logs and events.
    pub fn preview(&self, max_chars: usize) -> String {
        if self.content.chars().count() <= max_chars {
            return self.content.clone();
        }
        let mut out: String = self.content.chars().take(max_chars).collect();
        out.push('…');
        out
    }
}
