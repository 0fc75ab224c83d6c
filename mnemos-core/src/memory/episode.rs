//! Episodes: "What happened".
//!
//! Narrative records of interactions, each with a salience the producer
//! assigns at creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attention::{self, AttentionValue, Attentive};
use crate::types::{Embedding, MemoryId};

/// A stored episode with its attention values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// Unique identifier.
    pub id: MemoryId,
    /// Short title.
    pub title: String,
    /// Narrative content.
    pub content: String,
    /// How significant the episode is (0.0 to 1.0).
    pub salience: f32,
    /// When the episode happened.
    pub timestamp: DateTime<Utc>,
    /// Optional producer-supplied embedding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
    /// STI / LTI.
    #[serde(flatten)]
    pub attention: AttentionValue,
}

/// Argument record for `ADD_EPISODE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEpisode {
    /// Producer ID; derived from the record's content when absent.
    #[serde(default)]
    pub id: Option<MemoryId>,
    /// Short title.
    pub title: String,
    /// Narrative content.
    pub content: String,
    /// Salience (clamped to 0.0–1.0).
    pub salience: f32,
    /// When the episode happened.
    pub timestamp: DateTime<Utc>,
    /// Optional embedding.
    #[serde(default)]
    pub embedding: Option<Embedding>,
}

impl NewEpisode {
    /// An episode record without embedding.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        salience: f32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            title: title.into(),
            content: content.into(),
            salience,
            timestamp,
            embedding: None,
        }
    }

    /// Set an explicit ID.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<MemoryId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl NewEpisode {
    /// The producer ID, or one derived from title, content, timestamp and
    /// `ordinal`.
    #[must_use]
    pub fn resolved_id(&self, ordinal: usize) -> MemoryId {
        match &self.id {
            Some(id) => id.clone(),
            None => MemoryId::derived(&[
                "episode",
                &self.title,
                &self.content,
                &self.timestamp.to_rfc3339(),
                &ordinal.to_string(),
            ]),
        }
    }
}

impl Episode {
    /// Materialise an incoming record with fresh attention values.
    #[must_use]
    pub fn from_new(new: NewEpisode, ordinal: usize) -> Self {
        Self {
            id: new.resolved_id(ordinal),
            title: new.title,
            content: new.content,
            salience: new.salience.clamp(0.0, 1.0),
            timestamp: new.timestamp,
            embedding: new.embedding,
            attention: attention::initialize(None, None),
        }
    }
}

impl Attentive for Episode {
    fn attention(&self) -> AttentionValue {
        self.attention
    }

    fn set_attention(&mut self, value: AttentionValue) {
        self.attention = value;
    }
}
