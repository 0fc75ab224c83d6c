//! Knowledge facts: "What I know".
//!
//! Subject–predicate–object triples distilled by the producer (usually a
//! language model) from conversation and observation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attention::{self, AttentionValue, Attentive};
use crate::types::{Embedding, MemoryId};

/// A stored fact with its attention values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeFact {
    /// Unique identifier.
    pub id: MemoryId,
    /// Subject of the triple.
    pub subject: String,
    /// Predicate of the triple.
    pub predicate: String,
    /// Object of the triple.
    pub object: String,
    /// Producer's confidence in the fact (0.0 to 1.0).
    pub confidence: f32,
    /// Retention strength (0.0 to 1.0); used by homeostatic pruning.
    pub strength: f32,
    /// Last time the fact was reinforced.
    pub last_accessed: DateTime<Utc>,
    /// Optional producer-supplied embedding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
    /// STI / LTI.
    #[serde(flatten)]
    pub attention: AttentionValue,
}

/// Argument record for `ADD_FACT` / `ADD_FACTS_BATCH`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFact {
    /// Producer ID; derived from the record's content when absent.
    #[serde(default)]
    pub id: Option<MemoryId>,
    /// Subject of the triple.
    pub subject: String,
    /// Predicate of the triple.
    pub predicate: String,
    /// Object of the triple.
    pub object: String,
    /// Confidence (clamped to 0.0–1.0).
    #[serde(default = "default_one")]
    pub confidence: f32,
    /// Initial strength (clamped to 0.0–1.0).
    #[serde(default = "default_one")]
    pub strength: f32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Optional embedding.
    #[serde(default)]
    pub embedding: Option<Embedding>,
}

fn default_one() -> f32 {
    1.0
}

impl NewFact {
    /// A fact with full confidence and strength.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            confidence: 1.0,
            strength: 1.0,
            created_at,
            embedding: None,
        }
    }

    /// Set an explicit ID.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<MemoryId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the initial strength.
    #[must_use]
    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = strength;
        self
    }
}

impl NewFact {
    /// The producer ID, or one derived from the triple, creation time and
    /// `ordinal` (the fact's position in the collection it joins).
    #[must_use]
    pub fn resolved_id(&self, ordinal: usize) -> MemoryId {
        if let Some(id) = &self.id {
            return id.clone();
        }
        MemoryId::derived(&[
            "fact",
            &self.subject,
            &self.predicate,
            &self.object,
            &self.created_at.to_rfc3339(),
            &ordinal.to_string(),
        ])
    }
}

impl KnowledgeFact {
    /// Materialise an incoming record with fresh attention values.
    ///
    /// `ordinal` only matters when the record carries no ID; see
    /// [`NewFact::resolved_id`].
    #[must_use]
    pub fn from_new(new: NewFact, ordinal: usize) -> Self {
        Self {
            id: new.resolved_id(ordinal),
            subject: new.subject,
            predicate: new.predicate,
            object: new.object,
            confidence: new.confidence.clamp(0.0, 1.0),
            strength: new.strength.clamp(0.0, 1.0),
            last_accessed: new.created_at,
            embedding: new.embedding,
            attention: attention::initialize(None, None),
        }
    }

    /// Record an access at `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_accessed {
            self.last_accessed = now;
        }
    }
}

impl Attentive for KnowledgeFact {
    fn attention(&self) -> AttentionValue {
        self.attention
    }

    fn set_attention(&mut self, value: AttentionValue) {
        self.attention = value;
    }
}
