//! Serialized async front-end for the orchestrator.
//!
//! One tokio task owns the current snapshot and applies commands strictly
//! one at a time. Callers talk to it through a bounded `mpsc` channel and
//! get a [`CommandReceipt`] back on a `oneshot`. Readers never queue: every
//! new snapshot is published on a `watch` channel as an
//! `Arc<MemorySnapshot>`, so reads are lock-free and run alongside writes.
//!
//! After each successful command the snapshot is persisted on the blocking
//! pool before the receipt is sent. A failed save does not roll back the
//! in-memory state; the receipt says [`Durability::Failed`] and
//! [`MemoryService::flush`] can retry.
//!
//! If the stored snapshot exists but cannot be read, the service starts
//! empty and holds every save until [`MemoryService::flush`], so the
//! unreadable copy is only overwritten on request.
//!
//! A maintenance task injects `MEMORY/ECAN_TICK` (and every N ticks
//! `MEMORY/PRUNE_CONNECTIONS`) through the same channel, so it queues behind
//! whatever is in flight. Dropping the handle stops maintenance; the writer
//! then drains the queue and exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::command::Command;
use crate::config::MnemosConfig;
use crate::error::{MnemosError, Result};
use crate::orchestrator::Orchestrator;
use crate::snapshot::MemorySnapshot;
use crate::storage::SnapshotStorage;

/// Whether a snapshot reached durable storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Durability {
    /// Saved.
    Persisted,
    /// Applied in memory only; the reason the save failed.
    Failed(String),
}

impl Durability {
    /// `true` for [`Durability::Persisted`].
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        matches!(self, Self::Persisted)
    }
}

/// Result of one applied command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReceipt {
    /// Position of this command in the applied sequence, starting at 1.
    pub sequence: u64,
    /// Wire name of the command.
    pub command: &'static str,
    /// Whether the resulting snapshot was saved.
    pub durability: Durability,
}

enum Request {
    Apply {
        command: Command,
        reply: Option<oneshot::Sender<Result<CommandReceipt>>>,
    },
    Flush {
        reply: oneshot::Sender<Durability>,
    },
    Stop,
}

/// Handle to the running memory service.
pub struct MemoryService {
    requests: mpsc::Sender<Request>,
    snapshots: watch::Receiver<Arc<MemorySnapshot>>,
    worker: JoinHandle<()>,
    maintenance: JoinHandle<()>,
}

impl std::fmt::Debug for MemoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryService")
            .field("queued", &(self.requests.max_capacity() - self.requests.capacity()))
            .finish_non_exhaustive()
    }
}

impl MemoryService {
    /// Load the last durable snapshot and start serving.
    ///
    /// If storage has nothing, the service starts from an empty snapshot.
    /// If what it has cannot be read, the service also starts empty but
    /// holds saves until the first [`MemoryService::flush`]; until then
    /// receipts report [`Durability::Failed`].
    ///
    /// # Errors
    ///
    /// [`MnemosError::Config`] if `config` does not validate.
    pub async fn start(config: MnemosConfig, storage: Arc<dyn SnapshotStorage>) -> Result<Self> {
        config.validate()?;

        let loader = Arc::clone(&storage);
        let (initial, saves_held) = match tokio::task::spawn_blocking(move || loader.load()).await {
            Ok(Ok(Some(snapshot))) => {
                info!(stats = ?snapshot.stats(), "Restored memory snapshot");
                (snapshot, false)
            }
            Ok(Ok(None)) => {
                info!("No saved snapshot; starting empty");
                (MemorySnapshot::new(), false)
            }
            Ok(Err(e)) => {
                error!(error = %e, "Saved snapshot unreadable; starting empty, saves held until flush");
                (MemorySnapshot::new(), true)
            }
            Err(e) => {
                error!(error = %e, "Snapshot load task failed; starting empty, saves held until flush");
                (MemorySnapshot::new(), true)
            }
        };

        let (requests, inbox) = mpsc::channel(config.maintenance.command_queue_depth);
        let (publish, snapshots) = watch::channel(Arc::new(initial));

        let maintenance = tokio::spawn(maintenance_loop(
            requests.clone(),
            Duration::from_millis(config.maintenance.ecan_tick_interval_ms),
            config.maintenance.prune_every_ticks,
        ));
        let writer = Writer {
            orchestrator: Orchestrator::new(config),
            storage,
            publish,
            sequence: 0,
            saves_held,
        };
        let worker = tokio::spawn(writer.run(inbox));

        Ok(Self {
            requests,
            snapshots,
            worker,
            maintenance,
        })
    }

    /// Apply a command and wait for it to be applied and persisted.
    ///
    /// # Errors
    ///
    /// The command's own error (the snapshot is then unchanged), or
    /// [`MnemosError::ServiceStopped`].
    pub async fn dispatch(&self, command: Command) -> Result<CommandReceipt> {
        let (reply, receipt) = oneshot::channel();
        self.requests
            .send(Request::Apply {
                command,
                reply: Some(reply),
            })
            .await
            .map_err(|_| MnemosError::ServiceStopped)?;
        receipt.await.map_err(|_| MnemosError::ServiceStopped)?
    }

    /// Save the current snapshot again, e.g. after a [`Durability::Failed`].
    ///
    /// Also releases the save hold set when the stored snapshot was
    /// unreadable at start.
    ///
    /// Queues behind pending commands, so everything dispatched before the
    /// call is included.
    ///
    /// # Errors
    ///
    /// [`MnemosError::ServiceStopped`].
    pub async fn flush(&self) -> Result<Durability> {
        let (reply, done) = oneshot::channel();
        self.requests
            .send(Request::Flush { reply })
            .await
            .map_err(|_| MnemosError::ServiceStopped)?;
        done.await.map_err(|_| MnemosError::ServiceStopped)
    }

    /// The latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<MemorySnapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    /// A receiver that sees every future snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<MemorySnapshot>> {
        self.snapshots.clone()
    }

    /// Stop maintenance, drain queued commands and wait for the writer.
    pub async fn shutdown(mut self) {
        self.maintenance.abort();
        // Cancelled is the expected outcome.
        let _ = (&mut self.maintenance).await;
        if self.requests.send(Request::Stop).await.is_err() {
            debug!("Memory service writer already gone");
        }
        if let Err(e) = (&mut self.worker).await {
            warn!(error = %e, "Memory service writer ended abnormally");
        }
    }
}

impl Drop for MemoryService {
    fn drop(&mut self) {
        // The maintenance task holds a sender; once it is gone the writer
        // sees the channel close after the last queued request.
        self.maintenance.abort();
    }
}

struct Writer {
    orchestrator: Orchestrator,
    storage: Arc<dyn SnapshotStorage>,
    publish: watch::Sender<Arc<MemorySnapshot>>,
    sequence: u64,
    saves_held: bool,
}

impl Writer {
    async fn run(mut self, mut inbox: mpsc::Receiver<Request>) {
        while let Some(request) = inbox.recv().await {
            match request {
                Request::Apply { command, reply } => {
                    let result = self.apply(&command).await;
                    if let Some(reply) = reply {
                        // The caller may have stopped waiting.
                        let _ = reply.send(result);
                    } else if let Err(e) = result {
                        warn!(command = command.name(), error = %e, "Maintenance command failed");
                    }
                }
                Request::Flush { reply } => {
                    if self.saves_held {
                        info!("Save hold released by flush");
                        self.saves_held = false;
                    }
                    let _ = reply.send(self.persist().await);
                }
                Request::Stop => break,
            }
        }
        info!(applied = self.sequence, "Memory service stopped");
    }

    async fn apply(&mut self, command: &Command) -> Result<CommandReceipt> {
        let next = self.orchestrator.apply(&self.publish.borrow(), command)?;
        self.sequence += 1;
        self.publish.send_replace(Arc::new(next));
        debug!(sequence = self.sequence, command = command.name(), "Applied command");

        Ok(CommandReceipt {
            sequence: self.sequence,
            command: command.name(),
            durability: self.persist().await,
        })
    }

    async fn persist(&self) -> Durability {
        if self.saves_held {
            debug!(sequence = self.sequence, "Save held; stored snapshot was unreadable");
            return Durability::Failed("save held: stored snapshot was unreadable; flush to overwrite".into());
        }
        let storage = Arc::clone(&self.storage);
        let snapshot = Arc::clone(&self.publish.borrow());
        let outcome = tokio::task::spawn_blocking(move || storage.save(&snapshot)).await;
        match outcome {
            Ok(Ok(())) => Durability::Persisted,
            Ok(Err(e)) => {
                warn!(sequence = self.sequence, error = %e, "Snapshot save failed");
                Durability::Failed(e.to_string())
            }
            Err(e) => {
                warn!(sequence = self.sequence, error = %e, "Snapshot save task failed");
                Durability::Failed(e.to_string())
            }
        }
    }
}

async fn maintenance_loop(requests: mpsc::Sender<Request>, period: Duration, prune_every: u32) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    let mut ticks: u32 = 0;
    loop {
        interval.tick().await;
        ticks = ticks.wrapping_add(1);

        let mut due = vec![Command::EcanTick];
        if prune_every > 0 && ticks % prune_every == 0 {
            due.push(Command::PruneConnections);
        }
        for command in due {
            let request = Request::Apply {
                command,
                reply: None,
            };
            if requests.send(request).await.is_err() {
                return;
            }
        }
    }
}
