//! SQLite record store for tiers, users, images and binary links.
//!
//! A single connection guarded by a mutex. Each insert/delete runs as one
//! statement (or one short transaction) and is individually atomic; nothing
//! spans several images or links.
//!
//! Timestamps are stored as RFC 3339 text and parsed back into
//! `DateTime<FixedOffset>` on read. SQL never compares them.

mod models;
mod queries;

pub use models::{normalize_email, BinaryImageLink, ImageRecord, NewBinaryLink, NewImage, User};

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use crate::error::StorageError;

/// Persistent store for all records.
pub struct RecordStore {
    conn: Mutex<Connection>,
}

impl RecordStore {
    /// Open (or create) the database at `path` and bring the schema up to date.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        run_migrations(&conn)?;

        info!("Record store opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StorageError::Database(format!("connection lock poisoned: {}", e)))?;
        Ok(f(&conn)?)
    }
}

fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Record store: running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE tiers (
                title TEXT PRIMARY KEY,
                is_basic INTEGER NOT NULL DEFAULT 0,
                is_premium INTEGER NOT NULL DEFAULT 0,
                is_enterprise INTEGER NOT NULL DEFAULT 0,
                is_custom INTEGER NOT NULL DEFAULT 0,
                thumb_size1 INTEGER NOT NULL CHECK (thumb_size1 > 0),
                thumb_size2 INTEGER CHECK (thumb_size2 IS NULL OR thumb_size2 > 0),
                allow_original_access INTEGER NOT NULL DEFAULT 0,
                allow_binary_link INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL DEFAULT '',
                tier TEXT REFERENCES tiers(title) ON DELETE SET NULL ON UPDATE CASCADE,
                created_at TEXT NOT NULL
            );

            CREATE TABLE images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                format TEXT NOT NULL,
                original TEXT NOT NULL,
                thumbnail1 TEXT,
                thumbnail2 TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX idx_images_owner ON images(owner_id);

            CREATE TABLE binary_links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                image_id INTEGER REFERENCES images(id) ON DELETE SET NULL,
                binary_image TEXT NOT NULL UNIQUE,
                ttl_seconds INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                expiration TEXT NOT NULL
            );

            CREATE INDEX idx_binary_links_owner ON binary_links(owner_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    Ok(())
}
