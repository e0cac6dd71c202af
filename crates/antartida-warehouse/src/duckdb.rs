//! `DuckDB` connection pool management.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ::duckdb::Connection;

/// Access mode for pooled connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Range reads issued by the cache proxy.
    ReadOnly,
    /// Bulk inserts and migrations.
    ReadWrite,
}

#[derive(Default)]
struct PoolSlots {
    readers: Vec<Connection>,
    writers: Vec<Connection>,
}

impl PoolSlots {
    fn slot_mut(&mut self, mode: AccessMode) -> &mut Vec<Connection> {
        match mode {
            AccessMode::ReadOnly => &mut self.readers,
            AccessMode::ReadWrite => &mut self.writers,
        }
    }
}

struct PoolInner {
    db_path: PathBuf,
    max_idle: usize,
    // Every handed-out connection is cloned from this one so all of them share a single
    // database instance and see each other's committed writes.
    root: Mutex<Connection>,
    slots: Mutex<PoolSlots>,
}

impl PoolInner {
    // A panic while holding the lock leaves the idle lists intact, so the guard is reused.
    fn lock(&self) -> MutexGuard<'_, PoolSlots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps idle `DuckDB` connections per access mode for one database file.
#[derive(Clone)]
pub struct DuckDbConnectionManager {
    inner: Arc<PoolInner>,
}

impl DuckDbConnectionManager {
    /// Open the database at `path` and keep at most `max_idle` idle connections per mode.
    ///
    /// # Errors
    /// Returns an error if the database file cannot be opened or configured.
    pub fn open(path: impl Into<PathBuf>, max_idle: usize) -> Result<Self, ::duckdb::Error> {
        let db_path = path.into();
        let root = Connection::open(&db_path)?;
        root.execute_batch("PRAGMA disable_progress_bar;")?;

        Ok(Self {
            inner: Arc::new(PoolInner {
                db_path,
                max_idle: max_idle.max(1),
                root: Mutex::new(root),
                slots: Mutex::new(PoolSlots::default()),
            }),
        })
    }

    /// Take an idle connection for `mode`, opening a new one when none is idle.
    ///
    /// # Errors
    /// Returns an error if the database file cannot be opened or configured.
    pub fn acquire(&self, mode: AccessMode) -> Result<PooledConnection, ::duckdb::Error> {
        let idle = self.inner.lock().slot_mut(mode).pop();

        let connection = match idle {
            Some(connection) => connection,
            None => self.open_connection(mode)?,
        };

        Ok(PooledConnection {
            mode,
            pool: Arc::clone(&self.inner),
            connection: Some(connection),
        })
    }

    fn open_connection(&self, mode: AccessMode) -> Result<Connection, ::duckdb::Error> {
        let connection = self
            .inner
            .root
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_clone()?;
        tracing::trace!(path = %self.inner.db_path.display(), ?mode, "opened pooled connection");
        Ok(connection)
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        self.inner.db_path.as_path()
    }

    /// Number of idle connections currently held for `mode`.
    #[must_use]
    pub fn idle_count(&self, mode: AccessMode) -> usize {
        self.inner.lock().slot_mut(mode).len()
    }
}

/// A pooled connection that goes back to its pool when dropped.
pub struct PooledConnection {
    mode: AccessMode,
    pool: Arc<PoolInner>,
    connection: Option<Connection>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        match self.connection.as_ref() {
            Some(connection) => connection,
            None => unreachable!("connection is only taken in drop"),
        }
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.connection.as_mut() {
            Some(connection) => connection,
            None => unreachable!("connection is only taken in drop"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        let mut slots = self.pool.lock();
        let slot = slots.slot_mut(self.mode);
        if slot.len() < self.pool.max_idle {
            slot.push(connection);
        }
    }
}
