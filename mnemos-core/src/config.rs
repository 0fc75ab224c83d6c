//! Configuration for the MNEMOS memory core.
//!
//! Maps directly to `mnemos.toml`. Every field has a default, so an empty
//! file (or no file) yields a working configuration.

use serde::{Deserialize, Serialize};

use crate::error::{MnemosError, Result};
use crate::tree::CollisionPolicy;

/// Top-level MNEMOS configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MnemosConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Path tree behaviour.
    #[serde(default)]
    pub vfs: VfsConfig,
    /// Concept space and connection graph tuning.
    #[serde(default)]
    pub associative: AssociativeConfig,
    /// Periodic maintenance cadence.
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    /// Resource-pressure pruning.
    #[serde(default)]
    pub homeostasis: HomeostasisConfig,
    /// Persistence / save settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl MnemosConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `MnemosError::Config` if the TOML is invalid or fails validation.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| MnemosError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    /// Returns `MnemosError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let a = &self.associative;
        if a.dimensions == 0 {
            return Err(MnemosError::Config("associative.dimensions must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&a.learning_rate) || a.learning_rate == 0.0 {
            return Err(MnemosError::Config(
                "associative.learning_rate must be in (0, 1]".into(),
            ));
        }
        if !(0.0..1.0).contains(&a.decay_factor) {
            return Err(MnemosError::Config(
                "associative.decay_factor must be in [0, 1)".into(),
            ));
        }
        if !(0.0..1.0).contains(&a.probe_weight) {
            return Err(MnemosError::Config(
                "associative.probe_weight must be in [0, 1)".into(),
            ));
        }
        let keep = self.homeostasis.keep_ratio;
        if !(0.0..=1.0).contains(&keep) {
            return Err(MnemosError::Config(
                "homeostasis.keep_ratio must be in [0, 1]".into(),
            ));
        }
        let m = &self.maintenance;
        if m.ecan_tick_interval_ms == 0 || m.command_queue_depth == 0 {
            return Err(MnemosError::Config(
                "maintenance.ecan_tick_interval_ms and command_queue_depth must be > 0".into(),
            ));
        }
        if !matches!(self.persistence.backend.as_str(), "sqlite" | "memory") {
            return Err(MnemosError::Config(format!(
                "persistence.backend must be \"sqlite\" or \"memory\", got {:?}",
                self.persistence.backend
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error. `RUST_LOG` overrides it.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Path tree behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VfsConfig {
    /// What hydrate does on a file/directory collision.
    #[serde(default)]
    pub collision_policy: CollisionPolicy,
}

/// Concept space and connection graph tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociativeConfig {
    /// Concept vector dimensionality.
    #[serde(default = "default_80")]
    pub dimensions: usize,
    /// Hebbian learning rate: `w' = w + rate·(1 − w)`.
    #[serde(default = "default_0_1")]
    pub learning_rate: f64,
    /// Pairs below this cosine similarity count as novel for probing.
    #[serde(default = "default_0_2_f32")]
    pub novelty_cutoff: f32,
    /// Random pair draws per probe before giving up.
    #[serde(default = "default_10_u32")]
    pub probe_attempts: u32,
    /// Weight given to a probed connection.
    #[serde(default = "default_0_01")]
    pub probe_weight: f64,
    /// Probing is skipped below this many concepts.
    #[serde(default = "default_10_usize")]
    pub min_concepts: usize,
    /// Multiplier applied to every weight per prune tick.
    #[serde(default = "default_0_99")]
    pub decay_factor: f64,
    /// Connections whose weight falls below this are removed.
    #[serde(default = "default_0_005")]
    pub prune_threshold: f64,
}

impl Default for AssociativeConfig {
    fn default() -> Self {
        Self {
            dimensions: 80,
            learning_rate: 0.1,
            novelty_cutoff: 0.2,
            probe_attempts: 10,
            probe_weight: 0.01,
            min_concepts: 10,
            decay_factor: 0.99,
            prune_threshold: 0.005,
        }
    }
}

/// Periodic maintenance cadence for [`MemoryService`](crate::service::MemoryService).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Milliseconds between ECAN rent ticks.
    #[serde(default = "default_tick_ms")]
    pub ecan_tick_interval_ms: u64,
    /// Run a connection decay/prune every N rent ticks (0 disables it).
    #[serde(default = "default_10_u32")]
    pub prune_every_ticks: u32,
    /// Command channel depth.
    #[serde(default = "default_256")]
    pub command_queue_depth: usize,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            ecan_tick_interval_ms: 60_000,
            prune_every_ticks: 10,
            command_queue_depth: 256,
        }
    }
}

/// Resource-pressure pruning and the legacy decay command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeostasisConfig {
    /// Share of facts/episodes kept by `HOMEOSTASIS/REGULATE`.
    #[serde(default = "default_0_9")]
    pub keep_ratio: f64,
    /// Strength/salience multiplier used by the legacy `MEMORY/DECAY` command.
    #[serde(default = "default_0_95")]
    pub legacy_decay_factor: f32,
}

impl Default for HomeostasisConfig {
    fn default() -> Self {
        Self {
            keep_ratio: 0.9,
            legacy_decay_factor: 0.95,
        }
    }
}

/// Persistence / save configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Backend: "sqlite" or "memory".
    #[serde(default = "default_sqlite")]
    pub backend: String,
    /// Database path for the sqlite backend.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Detect save corruption via checksums.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
    /// How many recently written blob digests to remember (skips re-inserts).
    #[serde(default = "default_4096")]
    pub blob_cache_capacity: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_string(),
            path: "mnemos.db".to_string(),
            wal_mode: true,
            checksum_enabled: true,
            blob_cache_capacity: 4096,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_sqlite() -> String { "sqlite".to_string() }
fn default_db_path() -> String { "mnemos.db".to_string() }
fn default_0_005() -> f64 { 0.005 }
fn default_0_01() -> f64 { 0.01 }
fn default_0_1() -> f64 { 0.1 }
fn default_0_2_f32() -> f32 { 0.2 }
fn default_0_9() -> f64 { 0.9 }
fn default_0_95() -> f32 { 0.95 }
fn default_0_99() -> f64 { 0.99 }
fn default_10_u32() -> u32 { 10 }
fn default_10_usize() -> usize { 10 }
fn default_80() -> usize { 80 }
fn default_256() -> usize { 256 }
fn default_4096() -> usize { 4096 }
fn default_tick_ms() -> u64 { 60_000 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = MnemosConfig::from_toml("").expect("parse");
        assert_eq!(config.associative.dimensions, 80);
        assert_eq!(config.vfs.collision_policy, CollisionPolicy::Overwrite);
        assert!((config.homeostasis.keep_ratio - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = MnemosConfig::from_toml(
            r#"
            [vfs]
            collision_policy = "reject"

            [associative]
            learning_rate = 0.25
            "#,
        )
        .expect("parse");
        assert_eq!(config.vfs.collision_policy, CollisionPolicy::Reject);
        assert!((config.associative.learning_rate - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.associative.probe_attempts, 10);
        assert_eq!(config.persistence.backend, "sqlite");
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = MnemosConfig::from_toml("[associative]\ndecay_factor = 1.5\n").expect_err("invalid");
        assert!(matches!(err, MnemosError::Config(_)));

        let err = MnemosConfig::from_toml("[homeostasis]\nkeep_ratio = -0.1\n").expect_err("invalid");
        assert!(matches!(err, MnemosError::Config(_)));
    }

    #[test]
    fn malformed_toml_is_config_error() {
        assert!(matches!(
            MnemosConfig::from_toml("[general"),
            Err(MnemosError::Config(_))
        ));
    }

    #[test]
    fn from_file_reads_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mnemos.toml");
        std::fs::write(&path, "[general]\nlog_level = \"debug\"\n").expect("write");
        let config = MnemosConfig::from_file(&path).expect("load");
        assert_eq!(config.general.log_level, "debug");
    }
}
