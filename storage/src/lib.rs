//! SQLite persistence layer for the review service.
//!
//! Holds the relational rows (projects, developers, reviews) and the durable
//! job queue. All access goes through [`Database`], which guards a single
//! connection behind a mutex; callers keep their lock scopes short (one
//! statement or one transaction).

pub mod errors;
pub mod models;
pub mod queue;
pub mod repository;
pub mod schema;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use errors::StoreResult;

/// Shared database handle.
///
/// The connection is wrapped in a `Mutex` so the handle can be shared across
/// async tasks; every operation acquires the lock for the duration of a
/// single statement or transaction only.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens (or creates) the database at `path` and applies pragmas.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens a private in-memory database. Used by tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates all tables if they do not exist yet.
    pub fn initialize(&self) -> StoreResult<()> {
        schema::create_tables(&self.conn())
    }

    /// Locks and returns the underlying connection.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }
}
