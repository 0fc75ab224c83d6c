//! The memory orchestrator: one pure reducer per command.
//!
//! [`Orchestrator::apply`] takes the current snapshot by reference and
//! returns a new one; the input is never modified. Only the collections a
//! command touches are copied (see [`crate::snapshot`]), so the result is
//! the prior snapshot with that command's patch merged in. Given the same
//! starting snapshot and command sequence, [`Orchestrator::replay`] always
//! produces the same state.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::associative::{self, ConceptVector};
use crate::attention::{self, Attentive};
use crate::command::Command;
use crate::config::MnemosConfig;
use crate::error::{MnemosError, Result};
use crate::homeostasis;
use crate::memory::{Episode, ItemKind, ItemRef, KnowledgeFact, NewEpisode, NewFact};
use crate::snapshot::MemorySnapshot;
use crate::tree;
use crate::types::MemoryId;

/// Applies commands to snapshots.
#[derive(Debug, Clone, Default)]
pub struct Orchestrator {
    config: MnemosConfig,
}

impl Orchestrator {
    /// Create an orchestrator with the given configuration.
    #[must_use]
    pub fn new(config: MnemosConfig) -> Self {
        Self { config }
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &MnemosConfig {
        &self.config
    }

    /// Apply one command, producing the next snapshot.
    ///
    /// On error the caller keeps `snapshot`; nothing is half-applied.
    ///
    /// # Errors
    ///
    /// - [`MnemosError::DimensionMismatch`] for a concept vector of the wrong size.
    /// - [`MnemosError::InvalidPath`] / [`MnemosError::PathCollision`] from hydrate.
    pub fn apply(&self, snapshot: &MemorySnapshot, command: &Command) -> Result<MemorySnapshot> {
        let mut next = snapshot.clone();
        match command {
            Command::AddFact { fact } => add_facts(&mut next, std::slice::from_ref(fact)),
            Command::AddFactsBatch { facts } => add_facts(&mut next, facts),
            Command::DeleteFact { id } => delete_item(&mut next, ItemKind::Fact, id),
            Command::AddEpisode { episode } => add_episode(&mut next, episode),
            Command::DeleteEpisode { id } => delete_item(&mut next, ItemKind::Episode, id),
            Command::Reinforce { item_type, item_id, at } => {
                let found = update_item(&mut next, *item_type, item_id, |item| match item {
                    ItemMut::Fact(f) => {
                        f.set_attention(attention::boost_attention(f.attention()));
                        f.touch(*at);
                    }
                    ItemMut::Episode(e) => {
                        e.set_attention(attention::boost_attention(e.attention()));
                    }
                });
                if !found {
                    warn!(kind = %item_type, id = %item_id, "Reinforce target not found");
                }
            }
            Command::Decay { ids } => self.legacy_decay(&mut next, ids),
            Command::EcanTick => ecan_tick(&mut next),
            Command::HebbianLearn { concepts } => {
                associative::hebbian_learn(
                    Arc::make_mut(&mut next.concept_vectors),
                    Arc::make_mut(&mut next.connections),
                    concepts,
                    &self.config.associative,
                );
            }
            Command::HebbianBoost { first, second } => hebbian_boost(&mut next, first, second),
            Command::SynapticProbe { seed } => {
                let mut rng = StdRng::seed_from_u64(*seed);
                let linked = associative::probe(
                    &next.concept_vectors,
                    Arc::make_mut(&mut next.connections),
                    &mut rng,
                    &self.config.associative,
                );
                if let Some(key) = linked {
                    info!(connection = %key, "Synaptic probe created connection");
                }
            }
            Command::AddConceptVector { name, vector } => {
                let expected = self.config.associative.dimensions;
                if vector.len() != expected {
                    return Err(MnemosError::DimensionMismatch {
                        concept: name.clone(),
                        expected,
                        actual: vector.len(),
                    });
                }
                if next.concept_vectors.contains(name) {
                    debug!(concept = %name, "Concept vector already exists; keeping original");
                } else {
                    Arc::make_mut(&mut next.concept_vectors)
                        .insert(name, ConceptVector::new(vector.clone()));
                }
            }
            Command::StrengthenHyphaConnection { source, target } => {
                let weight = associative::strengthen(
                    Arc::make_mut(&mut next.hypha_connections),
                    source,
                    target,
                    self.config.associative.learning_rate,
                );
                match weight {
                    Some(w) => debug!(%source, %target, weight = w, "Hypha connection strengthened"),
                    None => debug!(%source, "Ignoring hypha self-connection"),
                }
            }
            Command::PruneConnections => self.prune_connections(&mut next),
            Command::SweepForgotten => sweep_forgotten(&mut next),
            Command::Regulate { reason } => self.regulate(&mut next, reason),
            Command::PutBlob { content } => {
                if !next.blobs.contains(&crate::store::digest(content)) {
                    Arc::make_mut(&mut next.blobs).put(content);
                }
            }
            Command::Hydrate { files } => {
                tree::hydrate_into(
                    Arc::make_mut(&mut next.tree),
                    Arc::make_mut(&mut next.blobs),
                    files,
                    self.config.vfs.collision_policy,
                )?;
                debug!(files = files.len(), total_blobs = next.blobs.len(), "Hydrated tree");
            }
        }
        Ok(next)
    }

    /// Fold a command sequence from `start`, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns the first command error.
    pub fn replay<'a>(
        &self,
        start: &MemorySnapshot,
        commands: impl IntoIterator<Item = &'a Command>,
    ) -> Result<MemorySnapshot> {
        let mut snapshot = start.clone();
        for command in commands {
            snapshot = self.apply(&snapshot, command)?;
        }
        Ok(snapshot)
    }

    fn legacy_decay(&self, next: &mut MemorySnapshot, ids: &[MemoryId]) {
        let factor = self.config.homeostasis.legacy_decay_factor;
        for id in ids {
            let hit = update_item(next, ItemKind::Fact, id, |item| {
                if let ItemMut::Fact(f) = item {
                    f.set_attention(attention::apply_rent(f.attention()));
                    f.strength = (f.strength * factor).clamp(0.0, 1.0);
                }
            }) || update_item(next, ItemKind::Episode, id, |item| {
                if let ItemMut::Episode(e) = item {
                    e.set_attention(attention::apply_rent(e.attention()));
                    e.salience = (e.salience * factor).clamp(0.0, 1.0);
                }
            });
            if !hit {
                debug!(%id, "Legacy decay target not found");
            }
        }
    }

    fn prune_connections(&self, next: &mut MemorySnapshot) {
        let config = &self.config.associative;
        let mut pruned = 0;
        if !next.connections.is_empty() {
            pruned += associative::decay_connections(Arc::make_mut(&mut next.connections), config);
        }
        if !next.hypha_connections.is_empty() {
            pruned +=
                associative::decay_connections(Arc::make_mut(&mut next.hypha_connections), config);
        }
        debug!(pruned, remaining = next.connections.len(), "Connection decay pass");
    }

    fn regulate(&self, next: &mut MemorySnapshot, reason: &str) {
        let keep = self.config.homeostasis.keep_ratio;
        let facts = if next.facts.is_empty() {
            0
        } else {
            homeostasis::regulate_facts(Arc::make_mut(&mut next.facts), keep)
        };
        let episodes = if next.episodes.is_empty() {
            0
        } else {
            homeostasis::regulate_episodes(Arc::make_mut(&mut next.episodes), keep)
        };
        info!(
            %reason,
            facts_removed = facts,
            episodes_removed = episodes,
            "Homeostatic regulation"
        );
    }
}

// ---------------------------------------------------------------------------
// Reducers
// ---------------------------------------------------------------------------

enum ItemMut<'a> {
    Fact(&'a mut KnowledgeFact),
    Episode(&'a mut Episode),
}

/// Run `f` on the item if it exists. Copies the collection only on a hit.
fn update_item(
    next: &mut MemorySnapshot,
    kind: ItemKind,
    id: &MemoryId,
    f: impl FnOnce(ItemMut<'_>),
) -> bool {
    match kind {
        ItemKind::Fact => {
            let Some(index) = next.facts.iter().position(|x| &x.id == id) else {
                return false;
            };
            f(ItemMut::Fact(&mut Arc::make_mut(&mut next.facts)[index]));
        }
        ItemKind::Episode => {
            let Some(index) = next.episodes.iter().position(|x| &x.id == id) else {
                return false;
            };
            f(ItemMut::Episode(&mut Arc::make_mut(&mut next.episodes)[index]));
        }
    }
    true
}

fn add_facts(next: &mut MemorySnapshot, incoming: &[NewFact]) {
    if incoming.is_empty() {
        return;
    }
    let facts = Arc::make_mut(&mut next.facts);
    for new in incoming {
        let mut fact = KnowledgeFact::from_new(new.clone(), facts.len());
        if let Some(existing) = facts.iter_mut().find(|f| f.id == fact.id) {
            fact.attention = existing.attention;
            *existing = fact;
        } else {
            facts.push(fact);
        }
    }
    debug!(added = incoming.len(), total = facts.len(), "Facts ingested");
}

fn add_episode(next: &mut MemorySnapshot, new: &NewEpisode) {
    let episodes = Arc::make_mut(&mut next.episodes);
    let mut episode = Episode::from_new(new.clone(), episodes.len());
    if let Some(existing) = episodes.iter_mut().find(|e| e.id == episode.id) {
        episode.attention = existing.attention;
        *existing = episode;
    } else {
        episodes.push(episode);
    }
}

fn delete_item(next: &mut MemorySnapshot, kind: ItemKind, id: &MemoryId) {
    let removed = match kind {
        ItemKind::Fact => match next.facts.iter().position(|f| &f.id == id) {
            Some(index) => {
                Arc::make_mut(&mut next.facts).remove(index);
                true
            }
            None => false,
        },
        ItemKind::Episode => match next.episodes.iter().position(|e| &e.id == id) {
            Some(index) => {
                Arc::make_mut(&mut next.episodes).remove(index);
                true
            }
            None => false,
        },
    };
    if !removed {
        warn!(%kind, %id, "Delete target not found");
    }
}

fn ecan_tick(next: &mut MemorySnapshot) {
    if !next.facts.is_empty() {
        for fact in Arc::make_mut(&mut next.facts).iter_mut() {
            fact.set_attention(attention::apply_rent(fact.attention()));
        }
    }
    if !next.episodes.is_empty() {
        for episode in Arc::make_mut(&mut next.episodes).iter_mut() {
            episode.set_attention(attention::apply_rent(episode.attention()));
        }
    }
}

fn hebbian_boost(next: &mut MemorySnapshot, first: &ItemRef, second: &ItemRef) {
    let lookup = |snapshot: &MemorySnapshot, r: &ItemRef| match r.item_type {
        ItemKind::Fact => snapshot.fact(&r.item_id).map(Attentive::attention),
        ItemKind::Episode => snapshot.episode(&r.item_id).map(Attentive::attention),
    };
    let (Some(a), Some(b)) = (lookup(&*next, first), lookup(&*next, second)) else {
        warn!(?first, ?second, "Hebbian boost target not found");
        return;
    };
    if first == second {
        debug!(?first, "Ignoring Hebbian boost of an item with itself");
        return;
    }

    let (a, b) = attention::hebbian_boost(a, b);
    for (r, value) in [(first, a), (second, b)] {
        update_item(next, r.item_type, &r.item_id, |item| match item {
            ItemMut::Fact(f) => f.set_attention(value),
            ItemMut::Episode(e) => e.set_attention(value),
        });
    }
}

fn sweep_forgotten(next: &mut MemorySnapshot) {
    let facts_before = next.facts.len();
    let episodes_before = next.episodes.len();
    if next.facts.iter().any(|f| attention::should_forget(f)) {
        Arc::make_mut(&mut next.facts).retain(|f| !attention::should_forget(f));
    }
    if next.episodes.iter().any(|e| attention::should_forget(e)) {
        Arc::make_mut(&mut next.episodes).retain(|e| !attention::should_forget(e));
    }
    info!(
        facts_removed = facts_before - next.facts.len(),
        episodes_removed = episodes_before - next.episodes.len(),
        "Forget sweep"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attention::{MAX_STI, STARTING_LTI, STARTING_STI};
    use crate::tree::{CollisionPolicy, FlatMap, VfsNode};
    use chrono::{TimeZone, Utc};

    fn t0() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("valid time")
    }

    fn add_fact(id: &str) -> Command {
        Command::AddFact {
            fact: NewFact::new("alice", "likes", id, t0()).with_id(id),
        }
    }

    fn add_episode(id: &str) -> Command {
        Command::AddEpisode {
            episode: NewEpisode::new("walk", "went outside", 0.5, t0()).with_id(id),
        }
    }

    #[test]
    fn ingestion_initializes_attention() {
        let orch = Orchestrator::default();
        let s = orch
            .replay(&MemorySnapshot::new(), &[add_fact("f1"), add_episode("e1")])
            .expect("replay");
        let fact = s.fact(&"f1".into()).expect("fact");
        assert_eq!(fact.attention.sti(), STARTING_STI);
        assert_eq!(fact.attention.lti(), STARTING_LTI);
        assert_eq!(s.episode(&"e1".into()).expect("episode").attention.sti(), STARTING_STI);
    }

    #[test]
    fn apply_does_not_touch_input() {
        let orch = Orchestrator::default();
        let s0 = orch.apply(&MemorySnapshot::new(), &add_fact("f1")).expect("apply");
        let s1 = orch.apply(&s0, &Command::EcanTick).expect("apply");

        assert_eq!(s0.facts[0].attention.sti(), STARTING_STI);
        assert_eq!(s1.facts[0].attention.sti(), STARTING_STI - 0.5);
        // Untouched collections are shared.
        assert!(Arc::ptr_eq(&s0.tree, &s1.tree));
        assert!(Arc::ptr_eq(&s0.connections, &s1.connections));
    }

    #[test]
    fn upsert_keeps_attention() {
        let orch = Orchestrator::default();
        let s = orch
            .replay(
                &MemorySnapshot::new(),
                &[add_fact("f1"), Command::EcanTick, add_fact("f1")],
            )
            .expect("replay");
        assert_eq!(s.facts.len(), 1);
        assert_eq!(s.facts[0].attention.sti(), STARTING_STI - 0.5);
    }

    #[test]
    fn replay_without_producer_ids_is_deterministic() {
        let orch = Orchestrator::default();
        let commands = vec![
            Command::AddFact { fact: NewFact::new("sky", "is", "blue", t0()) },
            Command::AddFactsBatch {
                facts: vec![
                    NewFact::new("sky", "is", "blue", t0()),
                    NewFact::new("grass", "is", "green", t0()),
                ],
            },
            Command::AddEpisode { episode: NewEpisode::new("walk", "went outside", 0.5, t0()) },
        ];
        let a = orch.replay(&MemorySnapshot::new(), &commands).expect("replay");
        let b = orch.replay(&MemorySnapshot::new(), &commands).expect("replay");
        assert_eq!(a, b);
        assert_eq!(a.facts.len(), 3, "identical ID-less facts get distinct IDs");
        assert_ne!(a.facts[0].id, a.facts[1].id);

        let json = serde_json::to_string(&commands).expect("encode");
        let decoded: Vec<Command> = serde_json::from_str(&json).expect("decode");
        let c = orch.replay(&MemorySnapshot::new(), &decoded).expect("replay");
        assert_eq!(a, c);
    }

    #[test]
    fn batch_and_delete() {
        let orch = Orchestrator::default();
        let batch = Command::AddFactsBatch {
            facts: vec![
                NewFact::new("a", "b", "c", t0()).with_id("x"),
                NewFact::new("d", "e", "f", t0()).with_id("y"),
            ],
        };
        let s = orch
            .replay(
                &MemorySnapshot::new(),
                &[batch, Command::DeleteFact { id: "x".into() }, Command::DeleteFact { id: "missing".into() }],
            )
            .expect("replay");
        assert_eq!(s.facts.len(), 1);
        assert_eq!(s.facts[0].id.0, "y");
    }

    #[test]
    fn reinforce_boosts_and_touches() {
        let orch = Orchestrator::default();
        let later = t0() + chrono::Duration::minutes(5);
        let s = orch
            .replay(
                &MemorySnapshot::new(),
                &[
                    add_fact("f1"),
                    Command::Reinforce {
                        item_type: ItemKind::Fact,
                        item_id: "f1".into(),
                        at: later,
                    },
                ],
            )
            .expect("replay");
        let fact = &s.facts[0];
        assert_eq!(fact.attention.sti(), STARTING_STI + 20.0);
        assert_eq!(fact.attention.lti(), STARTING_LTI + 2.0);
        assert_eq!(fact.last_accessed, later);
    }

    #[test]
    fn reinforce_is_capped() {
        let orch = Orchestrator::default();
        let mut s = orch.apply(&MemorySnapshot::new(), &add_episode("e1")).expect("apply");
        for _ in 0..20 {
            s = orch
                .apply(
                    &s,
                    &Command::Reinforce {
                        item_type: ItemKind::Episode,
                        item_id: "e1".into(),
                        at: t0(),
                    },
                )
                .expect("apply");
        }
        assert_eq!(s.episodes[0].attention.sti(), MAX_STI);
    }

    #[test]
    fn ecan_tick_on_empty_is_noop() {
        let orch = Orchestrator::default();
        let empty = MemorySnapshot::new();
        let s = orch.apply(&empty, &Command::EcanTick).expect("apply");
        assert_eq!(s, empty);
        let s = orch.apply(&empty, &Command::PruneConnections).expect("apply");
        assert_eq!(s, empty);
    }

    #[test]
    fn legacy_decay_hits_listed_items_only() {
        let orch = Orchestrator::default();
        let s = orch
            .replay(
                &MemorySnapshot::new(),
                &[
                    add_fact("f1"),
                    add_fact("f2"),
                    add_episode("e1"),
                    Command::Decay { ids: vec!["f1".into(), "e1".into()] },
                ],
            )
            .expect("replay");
        assert!((s.fact(&"f1".into()).expect("f1").strength - 0.95).abs() < 1e-6);
        assert!((s.fact(&"f2".into()).expect("f2").strength - 1.0).abs() < 1e-6);
        assert!((s.episode(&"e1".into()).expect("e1").salience - 0.475).abs() < 1e-6);
        assert_eq!(s.fact(&"f1".into()).expect("f1").attention.sti(), STARTING_STI - 0.5);
    }

    #[test]
    fn hebbian_boost_raises_lti_of_both() {
        let orch = Orchestrator::default();
        let s = orch
            .replay(
                &MemorySnapshot::new(),
                &[
                    add_fact("f1"),
                    add_episode("e1"),
                    Command::HebbianBoost {
                        first: ItemRef::fact("f1"),
                        second: ItemRef::episode("e1"),
                    },
                ],
            )
            .expect("replay");
        assert_eq!(s.facts[0].attention.lti(), STARTING_LTI + 2.0);
        assert_eq!(s.episodes[0].attention.lti(), STARTING_LTI + 2.0);
    }

    #[test]
    fn concept_vector_dimension_checked() {
        let orch = Orchestrator::default();
        let err = orch
            .apply(
                &MemorySnapshot::new(),
                &Command::AddConceptVector { name: "x".into(), vector: vec![1.0; 3] },
            )
            .expect_err("wrong dims");
        assert!(matches!(err, MnemosError::DimensionMismatch { expected: 80, actual: 3, .. }));

        let s = orch
            .replay(
                &MemorySnapshot::new(),
                &[
                    Command::AddConceptVector { name: "x".into(), vector: vec![1.0; 80] },
                    Command::AddConceptVector { name: "x".into(), vector: vec![-1.0; 80] },
                ],
            )
            .expect("replay");
        assert_eq!(s.concept_vectors.get("x").expect("x").as_slice()[0], 1.0);
    }

    #[test]
    fn hebbian_learn_then_prune() {
        let orch = Orchestrator::default();
        let s = orch
            .replay(
                &MemorySnapshot::new(),
                &[
                    Command::HebbianLearn { concepts: vec!["a".into(), "b".into(), "c".into()] },
                    Command::StrengthenHyphaConnection { source: "root".into(), target: "leaf".into() },
                    Command::PruneConnections,
                ],
            )
            .expect("replay");
        assert_eq!(s.concept_vectors.len(), 3);
        assert_eq!(s.connections.len(), 3);
        let w = s.connections.between("a", "c").expect("linked").weight;
        assert!((w - 0.099).abs() < 1e-12);
        assert!((s.hypha_connections.between("leaf", "root").expect("hypha").weight - 0.099).abs() < 1e-12);
    }

    #[test]
    fn probe_is_deterministic_per_seed() {
        let orch = Orchestrator::default();
        let mut commands: Vec<Command> = (0..12)
            .map(|i| {
                let mut v = vec![0.0; 80];
                v[i] = 1.0;
                Command::AddConceptVector { name: format!("c{i:02}"), vector: v }
            })
            .collect();
        commands.push(Command::SynapticProbe { seed: 42 });

        let a = orch.replay(&MemorySnapshot::new(), &commands).expect("replay");
        let b = orch.replay(&MemorySnapshot::new(), &commands).expect("replay");
        assert_eq!(a.connections.len(), 1);
        assert_eq!(a, b);
    }

    #[test]
    fn sweep_removes_only_forgettable() {
        let orch = Orchestrator::default();
        let mut commands = vec![add_fact("old"), add_episode("old-e")];
        commands.extend(std::iter::repeat_n(Command::EcanTick, 200));
        commands.push(add_fact("new"));
        commands.push(Command::SweepForgotten);

        let s = orch.replay(&MemorySnapshot::new(), &commands).expect("replay");
        assert_eq!(s.facts.len(), 1);
        assert_eq!(s.facts[0].id.0, "new");
        assert!(s.episodes.is_empty());
    }

    #[test]
    fn forgettable_is_advisory() {
        let orch = Orchestrator::default();
        let mut commands = vec![add_fact("f1")];
        commands.extend(std::iter::repeat_n(Command::EcanTick, 250));
        let s = orch.replay(&MemorySnapshot::new(), &commands).expect("replay");
        assert_eq!(s.forgettable(), vec![ItemRef::fact("f1")]);
        assert_eq!(s.facts.len(), 1, "classification never deletes");
    }

    #[test]
    fn regulate_keeps_ninety_percent() {
        let orch = Orchestrator::default();
        let facts = (0..10)
            .map(|i| {
                NewFact::new("s", "p", "o", t0())
                    .with_id(format!("f{i}"))
                    .with_strength(0.1 * (i as f32 + 1.0))
            })
            .collect();
        let s = orch
            .replay(
                &MemorySnapshot::new(),
                &[Command::AddFactsBatch { facts }, Command::Regulate { reason: "memory pressure".into() }],
            )
            .expect("replay");
        assert_eq!(s.facts.len(), 9);
        assert!(s.fact(&"f0".into()).is_none());
    }

    #[test]
    fn put_and_hydrate_commands() {
        let orch = Orchestrator::default();
        let files: FlatMap = [("/notes/todo.md".to_string(), "- ship".to_string())].into();
        let s = orch
            .replay(
                &MemorySnapshot::new(),
                &[
                    Command::PutBlob { content: "- ship".into() },
                    Command::Hydrate { files },
                ],
            )
            .expect("replay");
        assert_eq!(s.blobs.len(), 1);
        assert_eq!(s.read_file("/notes/todo.md"), Some("- ship"));
    }

    #[test]
    fn hydrate_collision_follows_configured_policy() {
        let mut config = MnemosConfig::default();
        config.vfs.collision_policy = CollisionPolicy::Reject;
        let orch = Orchestrator::new(config);

        let first: FlatMap = [("/a/b.txt".to_string(), "x".to_string())].into();
        let second: FlatMap = [("/a".to_string(), "y".to_string())].into();
        let s = orch
            .apply(&MemorySnapshot::new(), &Command::Hydrate { files: first })
            .expect("apply");
        let err = orch.apply(&s, &Command::Hydrate { files: second }).expect_err("collision");
        assert!(matches!(err, MnemosError::PathCollision { .. }));
        assert!(matches!(s.resolve("/a"), Some(VfsNode::Directory { .. })));
    }
}
