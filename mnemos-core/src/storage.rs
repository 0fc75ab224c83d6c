//! Durable storage for memory snapshots.
//!
//! [`SnapshotStorage`] is the port the service persists through. Two
//! backends ship with the crate:
//!
//! - [`SqliteStorage`]: the production backend.
//! - [`InMemoryStorage`]: for tests and ephemeral hosts.
//!
//! The SQLite layout splits the large, deduplicated content from the rest:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS blobs (
//!     digest  TEXT PRIMARY KEY,
//!     content TEXT NOT NULL
//! );
//! CREATE TABLE IF NOT EXISTS snapshot (
//!     id             INTEGER PRIMARY KEY CHECK (id = 1),
//!     schema_version INTEGER NOT NULL,
//!     data           BLOB NOT NULL,
//!     checksum       TEXT,
//!     updated_at     TEXT NOT NULL
//! );
//! ```
//!
//! Blob rows are content-addressed and written with `INSERT OR IGNORE`, so
//! a repeated save is harmless. The snapshot row holds everything else as
//! JSON (tree of names and digests, items, concepts, graphs) together with
//! a SHA-256 checksum that is verified on load.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use lru::LruCache;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::error::{MnemosError, Result};
use crate::migration;
use crate::snapshot::MemorySnapshot;
use crate::store::{self, BlobKey, BlobStore};

/// Where snapshots go when the service persists them.
pub trait SnapshotStorage: Send + Sync {
    /// Load the last saved snapshot, migrated to the current schema.
    ///
    /// Returns `None` when nothing has been saved yet.
    ///
    /// # Errors
    ///
    /// Backend failures, or a snapshot that cannot be decoded.
    fn load(&self) -> Result<Option<MemorySnapshot>>;

    /// Persist `snapshot`, replacing the previous one.
    ///
    /// # Errors
    ///
    /// Backend or serialization failures.
    fn save(&self, snapshot: &MemorySnapshot) -> Result<()>;
}

/// Open the backend named in `config.backend`.
///
/// # Errors
///
/// [`MnemosError::Config`] for an unknown backend, or the backend's own
/// open error.
pub fn open_storage(config: &PersistenceConfig) -> Result<Arc<dyn SnapshotStorage>> {
    match config.backend.as_str() {
        "sqlite" => Ok(Arc::new(SqliteStorage::open(&config.path, config)?)),
        "memory" => Ok(Arc::new(InMemoryStorage::new())),
        other => Err(MnemosError::Config(format!("unknown persistence backend {other:?}"))),
    }
}

fn checksum_hex(data: &[u8]) -> String {
    hex::encode(store::sha256(data))
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Saved {
    schema_version: u32,
    data: Vec<u8>,
    blobs: BlobStore,
}

/// Keeps the last saved snapshot in process memory.
///
/// Saves go through the same JSON encoding as the SQLite backend, so a
/// load exercises the migration path exactly like a real restart.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    saved: Mutex<Option<Saved>>,
    saves: Mutex<u64>,
}

impl InMemoryStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves.
    #[must_use]
    pub fn save_count(&self) -> u64 {
        *self.saves.lock()
    }
}

impl SnapshotStorage for InMemoryStorage {
    fn load(&self) -> Result<Option<MemorySnapshot>> {
        let guard = self.saved.lock();
        let Some(saved) = guard.as_ref() else {
            return Ok(None);
        };
        let value: serde_json::Value = serde_json::from_slice(&saved.data)?;
        let mut snapshot = migration::decode(value, saved.schema_version)?;
        snapshot.blobs = Arc::new(saved.blobs.clone());
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &MemorySnapshot) -> Result<()> {
        let data = serde_json::to_vec(snapshot)?;
        *self.saved.lock() = Some(Saved {
            schema_version: snapshot.schema_version,
            data,
            blobs: BlobStore::clone(&snapshot.blobs),
        });
        *self.saves.lock() += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SQLite backend
// ---------------------------------------------------------------------------

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS blobs (
        digest  TEXT PRIMARY KEY,
        content TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS snapshot (
        id             INTEGER PRIMARY KEY CHECK (id = 1),
        schema_version INTEGER NOT NULL,
        data           BLOB NOT NULL,
        checksum       TEXT,
        updated_at     TEXT NOT NULL
    );";

/// Snapshot storage in a single SQLite database.
///
/// ```no_run
/// # use mnemos_core::storage::{SnapshotStorage, SqliteStorage};
/// # use mnemos_core::config::PersistenceConfig;
/// # use mnemos_core::snapshot::MemorySnapshot;
/// let storage = SqliteStorage::open("mnemos.db", &PersistenceConfig::default())?;
/// storage.save(&MemorySnapshot::new())?;
/// let loaded = storage.load()?;
/// # Ok::<(), mnemos_core::error::MnemosError>(())
/// ```
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    config: PersistenceConfig,
    db_path: PathBuf,
    /// Digests known to be in the `blobs` table already.
    persisted: Mutex<LruCache<BlobKey, ()>>,
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteStorage {
    /// Open (or create) a database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`MnemosError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL; PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "Snapshot storage opened"
        );
        Ok(Self::with_connection(conn, config, db_path))
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`MnemosError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::with_connection(conn, config, PathBuf::from(":memory:")))
    }

    fn with_connection(conn: Connection, config: &PersistenceConfig, db_path: PathBuf) -> Self {
        let capacity = NonZeroUsize::new(config.blob_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path,
            persisted: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Path to the database file (`:memory:` for in-memory databases).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Number of stored blobs.
    ///
    /// # Errors
    ///
    /// Returns [`MnemosError::Database`] on SQLite failures.
    pub fn blob_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM blobs", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Copy the database to `dest_path` with SQLite's online-backup API.
    ///
    /// # Errors
    ///
    /// Returns [`MnemosError::Database`] on SQLite failures.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let start = Instant::now();
        let conn = self.conn.lock();
        let mut dest = Connection::open(dest_path.as_ref())?;
        let backup = rusqlite::backup::Backup::new(&conn, &mut dest)?;
        backup.run_to_completion(256, std::time::Duration::from_millis(50), None)?;

        info!(
            dest = %dest_path.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Snapshot database backup completed"
        );
        Ok(())
    }

    /// `PRAGMA integrity_check`. `Ok(false)` means corruption was found.
    ///
    /// # Errors
    ///
    /// Returns [`MnemosError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .lock()
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    fn load_blobs(&self, conn: &Connection) -> Result<BlobStore> {
        let mut stmt = conn.prepare_cached("SELECT digest, content FROM blobs")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut blobs = BlobStore::new();
        let mut persisted = self.persisted.lock();
        for row in rows {
            let (digest, content) = row?;
            let key = BlobKey::from_hex(digest);
            if store::digest(&content) != key {
                warn!(digest = %key, "Stored blob does not match its digest; skipping");
                continue;
            }
            persisted.put(key.clone(), ());
            blobs.insert_trusted(key, &content);
        }
        Ok(blobs)
    }
}

impl SnapshotStorage for SqliteStorage {
    fn load(&self) -> Result<Option<MemorySnapshot>> {
        let start = Instant::now();
        let conn = self.conn.lock();

        let row: Option<(u32, Vec<u8>, Option<String>)> = conn
            .prepare_cached("SELECT schema_version, data, checksum FROM snapshot WHERE id = 1")?
            .query_row([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .optional()?;
        let Some((stored_version, data, stored_checksum)) = row else {
            return Ok(None);
        };

        if self.config.checksum_enabled {
            if let Some(expected) = stored_checksum {
                let actual = checksum_hex(&data);
                if expected != actual {
                    warn!(
                        expected = %expected,
                        actual = %actual,
                        "Snapshot checksum mismatch; possible save corruption"
                    );
                }
            }
        }

        let value: serde_json::Value = serde_json::from_slice(&data)?;
        let mut snapshot = migration::decode(value, stored_version)?;
        snapshot.blobs = Arc::new(self.load_blobs(&conn)?);

        debug!(
            schema_version = stored_version,
            blobs = snapshot.blobs.len(),
            facts = snapshot.facts.len(),
            episodes = snapshot.episodes.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Loaded snapshot"
        );
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &MemorySnapshot) -> Result<()> {
        let start = Instant::now();
        let json = serde_json::to_vec(snapshot)?;
        let checksum = self.config.checksum_enabled.then(|| checksum_hex(&json));

        let mut conn = self.conn.lock();
        let mut persisted = self.persisted.lock();
        let tx = conn.transaction()?;

        let mut written = Vec::new();
        {
            let mut insert =
                tx.prepare_cached("INSERT OR IGNORE INTO blobs (digest, content) VALUES (?1, ?2)")?;
            for (key, content) in snapshot.blobs.iter() {
                if persisted.get(key).is_some() {
                    continue;
                }
                insert.execute(params![key.as_str(), content])?;
                written.push(key.clone());
            }
        }

        tx.execute(
            "INSERT INTO snapshot (id, schema_version, data, checksum, updated_at)
             VALUES (1, ?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                schema_version = excluded.schema_version,
                data = excluded.data,
                checksum = excluded.checksum,
                updated_at = excluded.updated_at",
            params![snapshot.schema_version, json, checksum, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;

        let new_blobs = written.len();
        for key in written {
            persisted.put(key, ());
        }

        debug!(
            bytes = json.len(),
            new_blobs,
            elapsed_us = start.elapsed().as_micros(),
            "Saved snapshot"
        );
        Ok(())
    }
}
