//! Associative memory: concept vectors and a weighted concept graph.
//!
//! Concepts live in a fixed-dimension vector space ([`ConceptSpace`]).
//! Undirected weighted links between them ([`ConnectionGraph`]) grow in two
//! ways:
//!
//! - **Hebbian learning**: concepts activated together strengthen their link
//!   by `w' = w + rate·(1 − w)`, which approaches 1 asymptotically.
//! - **Synaptic probing**: a random pair of *dissimilar*, unconnected
//!   concepts gets a faint new link, seeding non-obvious bridges.
//!
//! A maintenance step decays every weight and prunes the faint ones, so the
//! graph stays sparse over an unbounded run.
//!
//! Reference: Hebb, D.O. (1949). "The Organization of Behavior."

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AssociativeConfig;
use crate::store::sha256;
use crate::types::cosine;

/// Hebbian weights are capped just below 1 so that no finite number of
/// updates reaches it, even once `f64` rounding would otherwise get there.
pub const MAX_WEIGHT: f64 = 1.0 - 1e-9;

// ---------------------------------------------------------------------------
// Concept vectors
// ---------------------------------------------------------------------------

/// A concept's position in the vector space. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConceptVector(Vec<f32>);

impl ConceptVector {
    /// Wrap caller-supplied components.
    #[must_use]
    pub fn new(components: Vec<f32>) -> Self {
        Self(components)
    }

    /// The vector a concept gets when it is first referenced without one.
    ///
    /// Components are uniform in `[-1, 1]`, drawn from an RNG seeded with the
    /// SHA-256 of the name, so the same name always yields the same vector.
    #[must_use]
    pub fn derive(name: &str, dimensions: usize) -> Self {
        let mut rng = StdRng::from_seed(sha256(name.as_bytes()));
        Self((0..dimensions).map(|_| rng.gen_range(-1.0..=1.0)).collect())
    }

    /// Components.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Dimensionality.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }
}

/// Cosine similarity of two concept vectors, in `[-1, 1]`.
#[must_use]
pub fn similarity(a: &ConceptVector, b: &ConceptVector) -> f32 {
    cosine(&a.0, &b.0)
}

/// Concept name → vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConceptSpace {
    vectors: BTreeMap<String, ConceptVector>,
}

impl ConceptSpace {
    /// Create an empty space.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a concept.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ConceptVector> {
        self.vectors.get(name)
    }

    /// Whether the concept exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.vectors.contains_key(name)
    }

    /// Insert a vector unless the name already has one.
    ///
    /// Returns `true` if inserted. Existing vectors are identity-stable and
    /// are never replaced.
    pub fn insert(&mut self, name: &str, vector: ConceptVector) -> bool {
        if self.vectors.contains_key(name) {
            return false;
        }
        self.vectors.insert(name.to_string(), vector);
        true
    }

    /// Get a concept's vector, deriving it on first reference.
    pub fn ensure(&mut self, name: &str, dimensions: usize) -> &ConceptVector {
        self.vectors
            .entry(name.to_string())
            .or_insert_with(|| ConceptVector::derive(name, dimensions))
    }

    /// Concept names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vectors.keys().map(String::as_str)
    }

    /// Number of concepts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether the space is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Similarity of two named concepts; `None` if either is unknown.
    #[must_use]
    pub fn similarity(&self, a: &str, b: &str) -> Option<f32> {
        Some(similarity(self.get(a)?, self.get(b)?))
    }
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

/// An unordered concept pair, stored with the names in sorted order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionKey {
    low: String,
    high: String,
}

impl ConnectionKey {
    /// Canonical key for `x`–`y`. `None` for a self-pair.
    #[must_use]
    pub fn new(x: &str, y: &str) -> Option<Self> {
        match x.cmp(y) {
            std::cmp::Ordering::Less => Some(Self {
                low: x.to_string(),
                high: y.to_string(),
            }),
            std::cmp::Ordering::Greater => Some(Self {
                low: y.to_string(),
                high: x.to_string(),
            }),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// The lexicographically smaller name.
    #[must_use]
    pub fn low(&self) -> &str {
        &self.low
    }

    /// The lexicographically larger name.
    #[must_use]
    pub fn high(&self) -> &str {
        &self.high
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.low, self.high)
    }
}

/// A weighted undirected link.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConceptConnection {
    /// Link strength in `[0, 1)`.
    pub weight: f64,
}

/// Undirected weighted graph keyed by canonical concept pairs.
///
/// Stored as `low → high → connection`, which keeps lookups logarithmic and
/// the serialized form a plain nested JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionGraph {
    edges: BTreeMap<String, BTreeMap<String, ConceptConnection>>,
}

impl ConnectionGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connection for a key, if present.
    #[must_use]
    pub fn get(&self, key: &ConnectionKey) -> Option<&ConceptConnection> {
        self.edges.get(&key.low)?.get(&key.high)
    }

    /// Connection between two names in either order.
    #[must_use]
    pub fn between(&self, x: &str, y: &str) -> Option<&ConceptConnection> {
        self.get(&ConnectionKey::new(x, y)?)
    }

    /// Whether a connection exists.
    #[must_use]
    pub fn contains(&self, key: &ConnectionKey) -> bool {
        self.get(key).is_some()
    }

    /// Weight of a connection, 0.0 when absent.
    #[must_use]
    pub fn weight(&self, key: &ConnectionKey) -> f64 {
        self.get(key).map_or(0.0, |c| c.weight)
    }

    fn set(&mut self, key: &ConnectionKey, weight: f64) {
        self.edges
            .entry(key.low.clone())
            .or_default()
            .insert(key.high.clone(), ConceptConnection { weight });
    }

    /// Number of connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.values().map(BTreeMap::len).sum()
    }

    /// Whether the graph has no connections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.values().all(BTreeMap::is_empty)
    }

    /// Every connection in key order.
    pub fn iter(&self) -> impl Iterator<Item = (ConnectionKey, &ConceptConnection)> {
        self.edges.iter().flat_map(|(low, inner)| {
            inner.iter().map(move |(high, conn)| {
                (
                    ConnectionKey {
                        low: low.clone(),
                        high: high.clone(),
                    },
                    conn,
                )
            })
        })
    }

    /// Concepts linked to `concept`, strongest first.
    #[must_use]
    pub fn neighbors(&self, concept: &str) -> Vec<(&str, f64)> {
        let mut out: Vec<(&str, f64)> = self
            .edges
            .get(concept)
            .into_iter()
            .flat_map(|inner| inner.iter().map(|(high, c)| (high.as_str(), c.weight)))
            .collect();
        for (low, inner) in &self.edges {
            if let Some(c) = inner.get(concept) {
                out.push((low.as_str(), c.weight));
            }
        }
        out.sort_by_key(|(name, w)| (Reverse(OrderedFloat(*w)), *name));
        out
    }
}

// ---------------------------------------------------------------------------
// Learning rules
// ---------------------------------------------------------------------------

/// One Hebbian step: `w + rate·(1 − w)`, capped at [`MAX_WEIGHT`].
#[must_use]
pub fn hebbian_step(weight: f64, rate: f64) -> f64 {
    let next = weight + rate * (1.0 - weight);
    next.min(MAX_WEIGHT).max(weight)
}

/// Strengthen one link by a single Hebbian step, creating it at 0 first.
/// Returns the new weight, or `None` for a self-pair.
pub fn strengthen(graph: &mut ConnectionGraph, x: &str, y: &str, rate: f64) -> Option<f64> {
    let key = ConnectionKey::new(x, y)?;
    let weight = hebbian_step(graph.weight(&key), rate);
    graph.set(&key, weight);
    Some(weight)
}

/// Co-activate a set of concepts.
///
/// Duplicates are ignored, missing vectors are derived, and every unordered
/// pair gets one Hebbian step. Returns the number of pairs updated.
pub fn hebbian_learn<S: AsRef<str>>(
    space: &mut ConceptSpace,
    graph: &mut ConnectionGraph,
    concepts: &[S],
    config: &AssociativeConfig,
) -> usize {
    let unique: BTreeSet<&str> = concepts
        .iter()
        .map(AsRef::as_ref)
        .filter(|c| !c.is_empty())
        .collect();
    for name in &unique {
        space.ensure(name, config.dimensions);
    }

    let names: Vec<&str> = unique.into_iter().collect();
    let mut pairs = 0;
    for (i, a) in names.iter().enumerate() {
        for b in &names[i + 1..] {
            if strengthen(graph, a, b, config.learning_rate).is_some() {
                pairs += 1;
            }
        }
    }
    debug!(concepts = names.len(), pairs, "Hebbian update");
    pairs
}

/// Whether `a`–`b` qualifies for a probed link: distinct, both known,
/// unconnected, and less similar than the novelty cutoff.
#[must_use]
pub fn is_probe_candidate(
    space: &ConceptSpace,
    graph: &ConnectionGraph,
    a: &str,
    b: &str,
    config: &AssociativeConfig,
) -> bool {
    let Some(key) = ConnectionKey::new(a, b) else {
        return false;
    };
    if graph.contains(&key) {
        return false;
    }
    space
        .similarity(a, b)
        .is_some_and(|sim| sim < config.novelty_cutoff)
}

/// Try to seed one novel link between dissimilar concepts.
///
/// Draws up to `probe_attempts` random pairs and links the first candidate
/// with weight `probe_weight`. Does nothing below `min_concepts` concepts.
pub fn probe<R: Rng + ?Sized>(
    space: &ConceptSpace,
    graph: &mut ConnectionGraph,
    rng: &mut R,
    config: &AssociativeConfig,
) -> Option<ConnectionKey> {
    let names: Vec<&str> = space.names().collect();
    if names.len() < config.min_concepts.max(2) {
        debug!(concepts = names.len(), "Too few concepts to probe");
        return None;
    }

    for _ in 0..config.probe_attempts {
        let i = rng.gen_range(0..names.len());
        let mut j = rng.gen_range(0..names.len() - 1);
        if j >= i {
            j += 1;
        }
        let (a, b) = (names[i], names[j]);
        if is_probe_candidate(space, graph, a, b, config) {
            let key = ConnectionKey::new(a, b)?;
            graph.set(&key, config.probe_weight);
            debug!(connection = %key, weight = config.probe_weight, "Synaptic probe linked concepts");
            return Some(key);
        }
    }
    debug!(attempts = config.probe_attempts, "Synaptic probe found no candidate");
    None
}

/// Decay every weight by `decay_factor` and drop links that fall below
/// `prune_threshold`. Returns the number of links removed.
pub fn decay_connections(graph: &mut ConnectionGraph, config: &AssociativeConfig) -> usize {
    let mut pruned = 0;
    for inner in graph.edges.values_mut() {
        inner.retain(|_, conn| {
            conn.weight *= config.decay_factor;
            let keep = conn.weight >= config.prune_threshold;
            if !keep {
                pruned += 1;
            }
            keep
        });
    }
    graph.edges.retain(|_, inner| !inner.is_empty());
    pruned
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;

    fn config() -> AssociativeConfig {
        AssociativeConfig::default()
    }

    fn unit(dims: usize, axis: usize) -> ConceptVector {
        let mut v = vec![0.0; dims];
        v[axis] = 1.0;
        ConceptVector::new(v)
    }

    /// A vector whose cosine with `unit(dims, 0)` is exactly `cos`.
    fn at_angle(dims: usize, cos: f32) -> ConceptVector {
        let mut v = vec![0.0; dims];
        v[0] = cos;
        v[1] = (1.0 - cos * cos).sqrt();
        ConceptVector::new(v)
    }

    #[test]
    fn derived_vectors_are_stable() {
        let a = ConceptVector::derive("river", 80);
        let b = ConceptVector::derive("river", 80);
        assert_eq!(a, b);
        assert_eq!(a.dimensions(), 80);
        assert_ne!(a, ConceptVector::derive("mountain", 80));
        assert!(a.as_slice().iter().all(|x| (-1.0..=1.0).contains(x)));
    }

    #[test]
    fn insert_never_replaces() {
        let mut space = ConceptSpace::new();
        assert!(space.insert("x", unit(4, 0)));
        assert!(!space.insert("x", unit(4, 1)));
        assert_eq!(space.get("x"), Some(&unit(4, 0)));
    }

    #[test]
    fn connection_key_is_sorted() {
        let k1 = ConnectionKey::new("beta", "alpha").expect("key");
        let k2 = ConnectionKey::new("alpha", "beta").expect("key");
        assert_eq!(k1, k2);
        assert_eq!(k1.low(), "alpha");
        assert_eq!(k1.high(), "beta");
        assert!(ConnectionKey::new("same", "same").is_none());
    }

    #[test]
    fn hebbian_converges_below_one() {
        let mut space = ConceptSpace::new();
        let mut graph = ConnectionGraph::new();
        let key = ConnectionKey::new("a", "b").expect("key");

        let mut last = 0.0;
        for _ in 0..100 {
            hebbian_learn(&mut space, &mut graph, &["a", "b"], &config());
            let w = graph.weight(&key);
            assert!(w > last, "weight must strictly increase");
            assert!(w < 1.0);
            last = w;
        }
        // 1 - 0.9^100
        assert!((last - (1.0 - 0.9_f64.powi(100))).abs() < 1e-12);
    }

    #[test]
    fn hebbian_cap_holds_after_saturation() {
        let mut w = 0.0;
        for _ in 0..10_000 {
            w = hebbian_step(w, 0.5);
        }
        assert!(w < 1.0);
        assert_eq!(w, MAX_WEIGHT);
    }

    #[test]
    fn hebbian_dedups_and_creates_vectors() {
        let mut space = ConceptSpace::new();
        let mut graph = ConnectionGraph::new();
        let pairs = hebbian_learn(&mut space, &mut graph, &["x", "y", "x", "z"], &config());

        assert_eq!(pairs, 3);
        assert_eq!(space.len(), 3);
        assert_eq!(graph.len(), 3);
        let w = graph.between("y", "x").expect("linked").weight;
        assert!((w - 0.1).abs() < 1e-12);
    }

    #[test]
    fn probe_candidate_uses_novelty_cutoff() {
        let mut space = ConceptSpace::new();
        space.insert("anchor", unit(80, 0));
        space.insert("distant", at_angle(80, 0.05));
        space.insert("close", at_angle(80, 0.9));
        let graph = ConnectionGraph::new();

        assert!(is_probe_candidate(&space, &graph, "anchor", "distant", &config()));
        assert!(!is_probe_candidate(&space, &graph, "anchor", "close", &config()));
        assert!(!is_probe_candidate(&space, &graph, "anchor", "anchor", &config()));
        assert!(!is_probe_candidate(&space, &graph, "anchor", "unknown", &config()));
    }

    #[test]
    fn probe_links_orthogonal_concepts() {
        let mut space = ConceptSpace::new();
        for i in 0..12 {
            space.insert(&format!("c{i:02}"), unit(80, i));
        }
        let mut graph = ConnectionGraph::new();
        let mut rng = StdRng::seed_from_u64(7);

        let key = probe(&space, &mut graph, &mut rng, &config()).expect("orthogonal pairs qualify");
        assert!(key.low() < key.high());
        assert!((graph.weight(&key) - 0.01).abs() < 1e-12);
    }

    #[test]
    fn probe_needs_enough_concepts() {
        let mut space = ConceptSpace::new();
        for i in 0..5 {
            space.insert(&format!("c{i}"), unit(80, i));
        }
        let mut graph = ConnectionGraph::new();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(probe(&space, &mut graph, &mut rng, &config()).is_none());
        assert!(graph.is_empty());
    }

    #[test]
    fn probe_gives_up_when_everything_is_similar() {
        let mut space = ConceptSpace::new();
        for i in 0..12 {
            space.insert(&format!("c{i}"), unit(80, 0));
        }
        let mut graph = ConnectionGraph::new();
        let mut rng = StdRng::seed_from_u64(3);
        assert!(probe(&space, &mut graph, &mut rng, &config()).is_none());
    }

    #[test]
    fn decay_prunes_faint_links() {
        let mut graph = ConnectionGraph::new();
        let strong = ConnectionKey::new("a", "b").expect("key");
        let faint = ConnectionKey::new("c", "d").expect("key");
        graph.set(&strong, 0.5);
        graph.set(&faint, 0.005);

        let pruned = decay_connections(&mut graph, &config());
        assert_eq!(pruned, 1);
        assert!(!graph.contains(&faint));
        assert!((graph.weight(&strong) - 0.495).abs() < 1e-12);
    }

    #[test]
    fn decay_on_empty_graph_is_noop() {
        let mut graph = ConnectionGraph::new();
        assert_eq!(decay_connections(&mut graph, &config()), 0);
        assert!(graph.is_empty());
    }

    #[test]
    fn neighbors_strongest_first() {
        let mut graph = ConnectionGraph::new();
        strengthen(&mut graph, "hub", "a", 0.1);
        strengthen(&mut graph, "b", "hub", 0.5);
        strengthen(&mut graph, "x", "y", 0.9);

        let n = graph.neighbors("hub");
        assert_eq!(n.iter().map(|(name, _)| *name).collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    fn graph_serializes_as_nested_object() {
        let mut graph = ConnectionGraph::new();
        strengthen(&mut graph, "b", "a", 0.1);
        let json = serde_json::to_value(&graph).expect("serialize");
        assert!(json["a"]["b"]["weight"].is_number());
        let back: ConnectionGraph = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, graph);
    }
}
