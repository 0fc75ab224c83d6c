//! Homeostatic regulation: bulk pruning under resource pressure.
//!
//! When the host reports pressure (memory, token budget, ...), the lowest
//! priority share of facts and episodes is dropped in one pass:
//!
//! - facts rank by `strength`, ties broken by most recent access;
//! - episodes rank by `salience`, ties broken by most recent timestamp.
//!
//! The top `keep_ratio` (rounded up) of each collection survives, in its
//! original order.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;

use crate::memory::{Episode, KnowledgeFact};

/// How many of `len` items survive at `keep_ratio`.
#[must_use]
pub fn keep_count(len: usize, keep_ratio: f64) -> usize {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let keep = (len as f64 * keep_ratio.clamp(0.0, 1.0)).ceil() as usize;
    keep.min(len)
}

fn retain_top<T, K: Ord>(items: &mut Vec<T>, keep_ratio: f64, key: impl Fn(&T) -> K) -> usize {
    let keep = keep_count(items.len(), keep_ratio);
    if keep == items.len() {
        return 0;
    }

    let mut ranked: Vec<usize> = (0..items.len()).collect();
    ranked.sort_by_key(|&i| Reverse(key(&items[i])));
    let mut survives = vec![false; items.len()];
    for &i in &ranked[..keep] {
        survives[i] = true;
    }

    let before = items.len();
    let mut index = 0;
    items.retain(|_| {
        let keep = survives[index];
        index += 1;
        keep
    });
    before - items.len()
}

/// Drop the lowest-priority facts. Returns how many were removed.
pub fn regulate_facts(facts: &mut Vec<KnowledgeFact>, keep_ratio: f64) -> usize {
    retain_top(facts, keep_ratio, |f| (OrderedFloat(f.strength), f.last_accessed))
}

/// Drop the lowest-priority episodes. Returns how many were removed.
pub fn regulate_episodes(episodes: &mut Vec<Episode>, keep_ratio: f64) -> usize {
    retain_top(episodes, keep_ratio, |e| (OrderedFloat(e.salience), e.timestamp))
}
