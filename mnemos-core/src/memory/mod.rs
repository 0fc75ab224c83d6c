//! Attention-bearing memory items.
//!
//! Two item types share the [`Attentive`](crate::attention::Attentive)
//! trait: [`KnowledgeFact`] (semantic) and [`Episode`] (episodic).

pub mod episode;
pub mod fact;

pub use episode::{Episode, NewEpisode};
pub use fact::{KnowledgeFact, NewFact};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attention::{AttentionValue, Attentive};
use crate::types::MemoryId;

/// Which collection an item lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// A [`KnowledgeFact`].
    Fact,
    /// An [`Episode`].
    Episode,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fact => write!(f, "Fact"),
            Self::Episode => write!(f, "Episode"),
        }
    }
}

/// A typed reference to one memory item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRef {
    /// Collection.
    pub item_type: ItemKind,
    /// ID within the collection.
    pub item_id: MemoryId,
}

impl ItemRef {
    /// Reference a fact.
    #[must_use]
    pub fn fact(id: impl Into<MemoryId>) -> Self {
        Self {
            item_type: ItemKind::Fact,
            item_id: id.into(),
        }
    }

    /// Reference an episode.
    #[must_use]
    pub fn episode(id: impl Into<MemoryId>) -> Self {
        Self {
            item_type: ItemKind::Episode,
            item_id: id.into(),
        }
    }
}

/// A borrowed view of either item type, for queries that span both.
#[derive(Debug, Clone, Copy)]
pub enum MemoryItem<'a> {
    /// A fact.
    Fact(&'a KnowledgeFact),
    /// An episode.
    Episode(&'a Episode),
}

impl MemoryItem<'_> {
    /// Reference to this item.
    #[must_use]
    pub fn item_ref(&self) -> ItemRef {
        match self {
            Self::Fact(f) => ItemRef::fact(f.id.clone()),
            Self::Episode(e) => ItemRef::episode(e.id.clone()),
        }
    }

    /// Attention values of the underlying item.
    #[must_use]
    pub fn attention(&self) -> AttentionValue {
        match self {
            Self::Fact(f) => f.attention(),
            Self::Episode(e) => e.attention(),
        }
    }
}
