//! The immutable state the orchestrator reduces over.
//!
//! Each collection sits behind an `Arc`. Reducers clone the snapshot (cheap:
//! refcount bumps) and call `Arc::make_mut` only on the collections they
//! touch, so a new snapshot shares every untouched collection with its
//! predecessor and readers holding the old one never observe a change.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::associative::{ConceptSpace, ConnectionGraph};
use crate::attention;
use crate::memory::{Episode, ItemRef, KnowledgeFact, MemoryItem};
use crate::migration::CURRENT_SCHEMA_VERSION;
use crate::store::{BlobKey, BlobStore};
use crate::tree::{self, Flattened, VfsNode};
use crate::types::MemoryId;

/// Complete memory state at one point in the command sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
    /// Shape version of this snapshot.
    #[serde(default)]
    pub schema_version: u32,
    /// Content-addressed blobs. Persisted separately from the rest.
    #[serde(skip)]
    pub blobs: Arc<BlobStore>,
    /// Path tree over `blobs`.
    #[serde(default)]
    pub tree: Arc<VfsNode>,
    /// Knowledge facts in insertion order.
    #[serde(default)]
    pub facts: Arc<Vec<KnowledgeFact>>,
    /// Episodes in insertion order.
    #[serde(default)]
    pub episodes: Arc<Vec<Episode>>,
    /// Concept vector space.
    #[serde(default)]
    pub concept_vectors: Arc<ConceptSpace>,
    /// Concept graph (Hebbian + probed links).
    #[serde(default)]
    pub connections: Arc<ConnectionGraph>,
    /// Secondary "hypha" graph strengthened by explicit source/target pairs.
    #[serde(default)]
    pub hypha_connections: Arc<ConnectionGraph>,
}

impl Default for MemorySnapshot {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            blobs: Arc::default(),
            tree: Arc::new(VfsNode::empty_dir()),
            facts: Arc::default(),
            episodes: Arc::default(),
            concept_vectors: Arc::default(),
            connections: Arc::default(),
            hypha_connections: Arc::default(),
        }
    }
}

/// Summary counts for logging and dashboards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotStats {
    /// Distinct blobs.
    pub blobs: usize,
    /// Files in the tree.
    pub files: usize,
    /// Facts.
    pub facts: usize,
    /// Episodes.
    pub episodes: usize,
    /// Concepts.
    pub concepts: usize,
    /// Concept graph links.
    pub connections: usize,
    /// Hypha graph links.
    pub hypha_connections: usize,
    /// Items at or above the attention threshold.
    pub working_set: usize,
    /// Items the classifier marks as forgettable.
    pub forgettable: usize,
}

impl MemorySnapshot {
    /// An empty snapshot at the current schema version.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a fact.
    #[must_use]
    pub fn fact(&self, id: &MemoryId) -> Option<&KnowledgeFact> {
        self.facts.iter().find(|f| &f.id == id)
    }

    /// Look up an episode.
    #[must_use]
    pub fn episode(&self, id: &MemoryId) -> Option<&Episode> {
        self.episodes.iter().find(|e| &e.id == id)
    }

    /// Every fact and episode.
    pub fn items(&self) -> impl Iterator<Item = MemoryItem<'_>> {
        self.facts
            .iter()
            .map(MemoryItem::Fact)
            .chain(self.episodes.iter().map(MemoryItem::Episode))
    }

    /// Items at or above the attention threshold.
    #[must_use]
    pub fn working_set(&self) -> Vec<ItemRef> {
        self.items()
            .filter(|item| attention::in_working_set(&item.attention()))
            .map(|item| item.item_ref())
            .collect()
    }

    /// Items the classifier marks as forgettable. Nothing is removed.
    #[must_use]
    pub fn forgettable(&self) -> Vec<ItemRef> {
        self.items()
            .filter(|item| attention::should_forget(&item.attention()))
            .map(|item| item.item_ref())
            .collect()
    }

    /// Resolve a path in the tree.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&VfsNode> {
        tree::resolve(&self.tree, path)
    }

    /// Read a blob.
    #[must_use]
    pub fn get_blob(&self, key: &BlobKey) -> Option<&str> {
        self.blobs.get(key)
    }

    /// Read the content of the file at `path`.
    #[must_use]
    pub fn read_file(&self, path: &str) -> Option<&str> {
        match self.resolve(path)? {
            VfsNode::File { digest, .. } => self.blobs.get(digest),
            VfsNode::Directory { .. } => None,
        }
    }

    /// Flatten the whole tree.
    #[must_use]
    pub fn flatten(&self) -> Flattened {
        tree::flatten(&self.tree, &self.blobs)
    }

    /// Summary counts.
    #[must_use]
    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            blobs: self.blobs.len(),
            files: self.tree.file_count(),
            facts: self.facts.len(),
            episodes: self.episodes.len(),
            concepts: self.concept_vectors.len(),
            connections: self.connections.len(),
            hypha_connections: self.hypha_connections.len(),
            working_set: self.working_set().len(),
            forgettable: self.forgettable().len(),
        }
    }
}
