//! The command surface.
//!
//! Every mutation of memory state is one of these records. They are plain
//! serializable data (tag field `type`), so a command log can be stored and
//! replayed. Commands that depend on wall-clock time or randomness carry
//! the timestamp or seed themselves; the reducers read nothing else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::{ItemKind, ItemRef, NewEpisode, NewFact};
use crate::tree::FlatMap;
use crate::types::MemoryId;

/// A named mutation with its argument record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    /// Insert (or replace, keeping attention) one fact.
    #[serde(rename = "ADD_FACT")]
    AddFact {
        /// The fact.
        fact: NewFact,
    },
    /// Insert many facts.
    #[serde(rename = "ADD_FACTS_BATCH")]
    AddFactsBatch {
        /// The facts, applied in order.
        facts: Vec<NewFact>,
    },
    /// Remove a fact.
    #[serde(rename = "DELETE_FACT")]
    DeleteFact {
        /// Fact ID.
        id: MemoryId,
    },
    /// Insert (or replace, keeping attention) one episode.
    #[serde(rename = "ADD_EPISODE")]
    AddEpisode {
        /// The episode.
        episode: NewEpisode,
    },
    /// Remove an episode.
    #[serde(rename = "DELETE_EPISODE")]
    DeleteEpisode {
        /// Episode ID.
        id: MemoryId,
    },
    /// Boost an item's attention after an access.
    #[serde(rename = "MEMORY/REINFORCE", rename_all = "camelCase")]
    Reinforce {
        /// Collection.
        item_type: ItemKind,
        /// Item ID.
        item_id: MemoryId,
        /// Access time.
        at: DateTime<Utc>,
    },
    /// Legacy direct decay of specific items. Superseded by [`Command::EcanTick`].
    #[serde(rename = "MEMORY/DECAY")]
    Decay {
        /// Fact or episode IDs.
        ids: Vec<MemoryId>,
    },
    /// Charge one tick of attention rent to every item.
    #[serde(rename = "MEMORY/ECAN_TICK")]
    EcanTick,
    /// Co-activate concepts in the concept graph.
    #[serde(rename = "MEMORY/HEBBIAN_LEARN")]
    HebbianLearn {
        /// Concept names.
        concepts: Vec<String>,
    },
    /// Raise the LTI of two items used together.
    #[serde(rename = "MEMORY/HEBBIAN_BOOST")]
    HebbianBoost {
        /// First item.
        first: ItemRef,
        /// Second item.
        second: ItemRef,
    },
    /// Attempt one novel-connection seed.
    #[serde(rename = "MEMORY/SYNAPTIC_PROBE")]
    SynapticProbe {
        /// RNG seed for the pair draws.
        seed: u64,
    },
    /// Register a concept vector.
    #[serde(rename = "MEMORY/ADD_CONCEPT_VECTOR")]
    AddConceptVector {
        /// Concept name.
        name: String,
        /// Components; must match the configured dimensionality.
        vector: Vec<f32>,
    },
    /// Hebbian-style strengthening in the hypha graph.
    #[serde(rename = "MEMORY/STRENGTHEN_HYPHA_CONNECTION")]
    StrengthenHyphaConnection {
        /// One end.
        source: String,
        /// Other end.
        target: String,
    },
    /// Decay and prune both connection graphs.
    #[serde(rename = "MEMORY/PRUNE_CONNECTIONS")]
    PruneConnections,
    /// Remove every item the forget classifier flags.
    #[serde(rename = "MEMORY/SWEEP_FORGOTTEN")]
    SweepForgotten,
    /// Bulk low-priority pruning under resource pressure.
    #[serde(rename = "HOMEOSTASIS/REGULATE")]
    Regulate {
        /// Why the host asked for it (logged).
        reason: String,
    },
    /// Store one blob.
    #[serde(rename = "VFS/PUT")]
    PutBlob {
        /// Content.
        content: String,
    },
    /// Write a flat `path → content` map into the tree.
    #[serde(rename = "VFS/HYDRATE")]
    Hydrate {
        /// Files to write.
        files: FlatMap,
    },
}

impl Command {
    /// The wire name of this command.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddFact { .. } => "ADD_FACT",
            Self::AddFactsBatch { .. } => "ADD_FACTS_BATCH",
            Self::DeleteFact { .. } => "DELETE_FACT",
            Self::AddEpisode { .. } => "ADD_EPISODE",
            Self::DeleteEpisode { .. } => "DELETE_EPISODE",
            Self::Reinforce { .. } => "MEMORY/REINFORCE",
            Self::Decay { .. } => "MEMORY/DECAY",
            Self::EcanTick => "MEMORY/ECAN_TICK",
            Self::HebbianLearn { .. } => "MEMORY/HEBBIAN_LEARN",
            Self::HebbianBoost { .. } => "MEMORY/HEBBIAN_BOOST",
            Self::SynapticProbe { .. } => "MEMORY/SYNAPTIC_PROBE",
            Self::AddConceptVector { .. } => "MEMORY/ADD_CONCEPT_VECTOR",
            Self::StrengthenHyphaConnection { .. } => "MEMORY/STRENGTHEN_HYPHA_CONNECTION",
            Self::PruneConnections => "MEMORY/PRUNE_CONNECTIONS",
            Self::SweepForgotten => "MEMORY/SWEEP_FORGOTTEN",
            Self::Regulate { .. } => "HOMEOSTASIS/REGULATE",
            Self::PutBlob { .. } => "VFS/PUT",
            Self::Hydrate { .. } => "VFS/HYDRATE",
        }
    }

    /// `MEMORY/REINFORCE` stamped with the current time.
    #[must_use]
    pub fn reinforce(item: ItemRef) -> Self {
        Self::Reinforce {
            item_type: item.item_type,
            item_id: item.item_id,
            at: Utc::now(),
        }
    }

    /// `MEMORY/SYNAPTIC_PROBE` with a fresh random seed.
    #[must_use]
    pub fn synaptic_probe() -> Self {
        Self::SynapticProbe {
            seed: rand::random(),
        }
    }
}
