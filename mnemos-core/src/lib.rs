//! # MNEMOS Core Library
//!
//! Dual-tier memory for long-running agents:
//!
//! - **Artifact tier**: a content-addressed blob store ([`store`]) under an
//!   immutable path tree ([`tree`]). Identical content is stored once, and
//!   every tree version shares the blobs it did not change.
//! - **Semantic tier**: facts and episodes scored by Economic Attention
//!   Networks ([`attention`]), plus a concept vector space with a Hebbian
//!   connection graph ([`associative`]).
//!
//! All state lives in one immutable [`MemorySnapshot`]. Every mutation is a
//! serializable [`Command`] reduced by the [`Orchestrator`]; the
//! [`MemoryService`] serializes commands on a single tokio task, publishes
//! snapshots to readers and persists them through a [`SnapshotStorage`].
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use mnemos_core::{Command, MemoryService, MnemosConfig, storage};
//! # async fn run() -> mnemos_core::error::Result<()> {
//! let config = MnemosConfig::from_file("mnemos.toml".as_ref())?;
//! mnemos_core::logging::init_tracing(&config.general);
//! let storage = storage::open_storage(&config.persistence)?;
//! let service = MemoryService::start(config, storage).await?;
//! service.dispatch(Command::EcanTick).await?;
//! let working_set = service.snapshot().working_set();
//! # let _ = working_set;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod associative;
pub mod attention;
pub mod command;
pub mod config;
pub mod error;
pub mod homeostasis;
pub mod logging;
pub mod memory;
pub mod migration;
pub mod orchestrator;
pub mod service;
pub mod snapshot;
pub mod storage;
pub mod store;
pub mod tree;
pub mod types;

pub use command::Command;
pub use config::MnemosConfig;
pub use error::MnemosError;
pub use memory::{Episode, ItemKind, ItemRef, KnowledgeFact, NewEpisode, NewFact};
pub use orchestrator::Orchestrator;
pub use service::{CommandReceipt, Durability, MemoryService};
pub use snapshot::MemorySnapshot;
pub use storage::{InMemoryStorage, SnapshotStorage, SqliteStorage};
pub use store::{BlobKey, BlobStore};
pub use tree::{CollisionPolicy, FlatMap, VfsNode};
pub use types::MemoryId;
