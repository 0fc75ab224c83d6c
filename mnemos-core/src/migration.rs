//! Ordered schema migration for persisted snapshots.
//!
//! Snapshots are stored as JSON. When an older snapshot is loaded, the
//! JSON is walked forward one version at a time through [`MIGRATIONS`],
//! an array of pure `Value → Value` steps ordered by target version.
//!
//! | Version | Shape change |
//! |---------|--------------|
//! | 1 | facts + episodes |
//! | 2 | `STI` / `LTI` on every item |
//! | 3 | `conceptVectors` + `connections` |
//! | 4 | `tree` (renamed from `vfs`) + `hyphaConnections` |
//!
//! A version with no step is logged and skipped; the load continues with
//! whatever shape the earlier steps produced, and serde defaults fill in
//! the rest. Availability wins over strict schema correctness here.

use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::attention::{STARTING_LTI, STARTING_STI};
use crate::error::Result;
use crate::snapshot::MemorySnapshot;

/// Shape version written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 4;

/// One forward step.
#[derive(Debug, Clone, Copy)]
pub struct MigrationStep {
    /// Version this step produces.
    pub to: u32,
    /// The transform.
    pub apply: fn(Value) -> Value,
}

/// All known steps, ordered by target version.
pub const MIGRATIONS: &[MigrationStep] = &[
    MigrationStep { to: 2, apply: add_attention_fields },
    MigrationStep { to: 3, apply: add_associative_collections },
    MigrationStep { to: 4, apply: add_tree_and_hypha },
];

/// Migrate `value` from `from` to [`CURRENT_SCHEMA_VERSION`] using [`MIGRATIONS`].
#[must_use]
pub fn migrate(value: Value, from: u32) -> Value {
    migrate_with(value, from, CURRENT_SCHEMA_VERSION, MIGRATIONS)
}

/// Migrate `value` from `from` to `to` using an explicit step table.
#[must_use]
pub fn migrate_with(mut value: Value, from: u32, to: u32, steps: &[MigrationStep]) -> Value {
    if from > to {
        warn!(from, to, "Snapshot is newer than this build; loading best-effort");
        return value;
    }
    for version in from.saturating_add(1)..=to {
        match steps.iter().find(|s| s.to == version) {
            Some(step) => {
                value = (step.apply)(value);
                debug!(version, "Applied schema migration step");
            }
            None => warn!(
                version,
                "No migration step for schema version; continuing with partial shape"
            ),
        }
        set_version(&mut value, version);
    }
    if from < to {
        info!(from, to, "Snapshot migrated");
    }
    value
}

/// Decode a stored snapshot, migrating it first if it is older than current.
///
/// `stored_version` is the version recorded next to the JSON; a
/// `schemaVersion` field inside the JSON takes precedence when present.
///
/// # Errors
///
/// Returns [`MnemosError::Serialization`](crate::error::MnemosError) when the
/// migrated JSON still cannot be decoded.
pub fn decode(value: Value, stored_version: u32) -> Result<MemorySnapshot> {
    let from = value
        .get("schemaVersion")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(stored_version);
    let migrated = migrate(value, from);
    let mut snapshot: MemorySnapshot = serde_json::from_value(migrated)?;
    snapshot.schema_version = snapshot.schema_version.max(CURRENT_SCHEMA_VERSION);
    Ok(snapshot)
}

fn set_version(value: &mut Value, version: u32) {
    if let Some(obj) = value.as_object_mut() {
        obj.insert("schemaVersion".to_string(), json!(version));
    }
}

fn object(value: &mut Value) -> Option<&mut Map<String, Value>> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    value.as_object_mut()
}

fn add_attention_fields(mut value: Value) -> Value {
    if let Some(obj) = object(&mut value) {
        for collection in ["facts", "episodes"] {
            let Some(Value::Array(items)) = obj.get_mut(collection) else {
                continue;
            };
            for item in items.iter_mut().filter_map(Value::as_object_mut) {
                item.entry("STI").or_insert(json!(STARTING_STI));
                item.entry("LTI").or_insert(json!(STARTING_LTI));
            }
        }
    }
    value
}

fn add_associative_collections(mut value: Value) -> Value {
    if let Some(obj) = object(&mut value) {
        obj.entry("conceptVectors").or_insert_with(|| json!({}));
        obj.entry("connections").or_insert_with(|| json!({}));
    }
    value
}

fn add_tree_and_hypha(mut value: Value) -> Value {
    if let Some(obj) = object(&mut value) {
        if let Some(legacy) = obj.remove("vfs") {
            obj.entry("tree").or_insert(legacy);
        }
        obj.entry("tree")
            .or_insert_with(|| json!({ "type": "directory", "children": {} }));
        obj.entry("hyphaConnections").or_insert_with(|| json!({}));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1_snapshot() -> Value {
        json!({
            "schemaVersion": 1,
            "facts": [{
                "id": "f-1",
                "subject": "sun",
                "predicate": "is",
                "object": "hot",
                "confidence": 0.9,
                "strength": 0.8,
                "lastAccessed": "2026-01-01T00:00:00Z",
            }],
            "episodes": [{
                "id": "e-1",
                "title": "first light",
                "content": "woke up",
                "salience": 0.5,
                "timestamp": "2026-01-01T00:00:00Z",
            }],
        })
    }

    #[test]
    fn full_chain_from_v1() {
        let snapshot = decode(v1_snapshot(), 1).expect("decode");
        assert_eq!(snapshot.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(snapshot.facts.len(), 1);
        assert_eq!(snapshot.facts[0].attention.sti(), STARTING_STI);
        assert_eq!(snapshot.episodes[0].attention.lti(), STARTING_LTI);
        assert!(snapshot.tree.is_dir());
        assert!(snapshot.connections.is_empty());
    }

    #[test]
    fn existing_attention_is_preserved() {
        let mut v = v1_snapshot();
        v["facts"][0]["STI"] = json!(7.5);
        let snapshot = decode(v, 1).expect("decode");
        assert_eq!(snapshot.facts[0].attention.sti(), 7.5);
    }

    #[test]
    fn out_of_range_attention_is_clamped_on_load() {
        let mut v = migrate(v1_snapshot(), 1);
        v["facts"][0]["STI"] = json!(5000.0);
        v["facts"][0]["LTI"] = json!(-7.0);
        v["episodes"][0]["LTI"] = json!(1e12);
        let snapshot = decode(v, CURRENT_SCHEMA_VERSION).expect("decode");
        let fact = snapshot.facts[0].attention;
        assert_eq!(fact.sti(), crate::attention::MAX_STI);
        assert_eq!(fact.lti(), 0.0);
        assert_eq!(snapshot.episodes[0].attention.lti(), crate::attention::MAX_LTI);
    }

    #[test]
    fn steps_run_in_order_and_stamp_versions() {
        let out = migrate(json!({ "schemaVersion": 2, "vfs": { "type": "directory", "children": {} } }), 2);
        assert_eq!(out["schemaVersion"], json!(4));
        assert!(out.get("vfs").is_none());
        assert_eq!(out["tree"]["type"], json!("directory"));
        assert_eq!(out["conceptVectors"], json!({}));
    }

    #[test]
    fn missing_step_is_skipped_not_fatal() {
        // Table without the v3 step: v2 and v4 still run.
        let steps = [
            MigrationStep { to: 2, apply: add_attention_fields },
            MigrationStep { to: 4, apply: add_tree_and_hypha },
        ];
        let out = migrate_with(v1_snapshot(), 1, 4, &steps);
        assert_eq!(out["schemaVersion"], json!(4));
        assert!(out.get("conceptVectors").is_none(), "v3 shape was never produced");
        assert!(out["facts"][0].get("STI").is_some());

        // serde defaults fill what the gap left out.
        let snapshot: MemorySnapshot = serde_json::from_value(out).expect("partial shape loads");
        assert!(snapshot.concept_vectors.is_empty());
    }

    #[test]
    fn current_version_is_untouched() {
        let current = serde_json::to_value(MemorySnapshot::new()).expect("serialize");
        let out = migrate(current.clone(), CURRENT_SCHEMA_VERSION);
        assert_eq!(out, current);
    }

    #[test]
    fn newer_version_loads_best_effort() {
        let mut v = serde_json::to_value(MemorySnapshot::new()).expect("serialize");
        v["schemaVersion"] = json!(99);
        let snapshot = decode(v, 99).expect("decode");
        assert_eq!(snapshot.schema_version, 99);
    }

    #[test]
    fn version_falls_back_to_stored_column() {
        let mut v = v1_snapshot();
        v.as_object_mut().expect("object").remove("schemaVersion");
        let snapshot = decode(v, 1).expect("decode");
        assert_eq!(snapshot.facts[0].attention.sti(), STARTING_STI);
    }
}
