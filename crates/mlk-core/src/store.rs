//! Durable key/value and set storage (SQLite).
//!
//! Every write is a single upsert statement, so each key is independently
//! consistent. The connection is serialized behind a mutex; calls are short and
//! run inline on the caller's task.

use std::{
    collections::HashSet,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{errors::Error, Result};

pub const KEY_SETTINGS: &str = "settings";
pub const KEY_SEARCH_STATE: &str = "search_state";
pub const KEY_STATISTICS: &str = "statistics";
pub const KEY_CHANNEL_QUEUE: &str = "channel_queue";
pub const KEY_IS_RUNNING: &str = "is_running";
pub const KEY_ACCESS_RESTRICTED: &str = "access_restricted";
pub const KEY_ADMIN_USER: &str = "admin_user";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS bot_state (
    key TEXT PRIMARY KEY,
    value TEXT,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS processed_channels (
    username TEXT PRIMARY KEY,
    processed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
";

/// Run flags shared with the control layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFlags {
    pub is_running: bool,
    pub access_restricted: bool,
    pub admin_user: Option<i64>,
}

#[derive(Clone)]
pub struct StateStore {
    conn: Arc<Mutex<Connection>>,
}

impl StateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "state store opened");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::External("state store mutex poisoned".to_string()))
    }

    // === bot_state (JSON values) ===

    pub fn save_state<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.conn()?.execute(
            "INSERT INTO bot_state (key, value, updated_at)
             VALUES (?1, ?2, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
            params![key, json],
        )?;
        Ok(())
    }

    /// `Ok(None)` when absent, `Err(Error::Json)` when the stored value is unreadable.
    pub fn load_state<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw: Option<String> = self
            .conn()?
            .query_row(
                "SELECT value FROM bot_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(txt) => Ok(Some(serde_json::from_str(&txt)?)),
            None => Ok(None),
        }
    }

    /// Load `key`, falling back to `default` when it is absent or unreadable.
    pub fn load_state_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.load_state(key) {
            Ok(Some(v)) => v,
            Ok(None) => default,
            Err(e) => {
                warn!(key, error = %e, "persisted state unreadable, using default");
                default
            }
        }
    }

    pub fn delete_state(&self, key: &str) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM bot_state WHERE key = ?1", params![key])?;
        Ok(())
    }

    pub fn control_flags(&self) -> ControlFlags {
        ControlFlags {
            is_running: self.load_state_or(KEY_IS_RUNNING, false),
            access_restricted: self.load_state_or(KEY_ACCESS_RESTRICTED, false),
            admin_user: self.load_state_or(KEY_ADMIN_USER, None),
        }
    }

    pub fn save_control_flags(&self, flags: &ControlFlags) -> Result<()> {
        self.save_state(KEY_IS_RUNNING, &flags.is_running)?;
        self.save_state(KEY_ACCESS_RESTRICTED, &flags.access_restricted)?;
        self.save_state(KEY_ADMIN_USER, &flags.admin_user)?;
        Ok(())
    }

    // === processed_channels (append-only) ===

    pub fn add_processed_channel(&self, username: &str) -> Result<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO processed_channels (username, processed_at)
             VALUES (?1, CURRENT_TIMESTAMP)",
            params![username],
        )?;
        Ok(())
    }

    pub fn processed_channels(&self) -> Result<HashSet<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT username FROM processed_channels")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = HashSet::new();
        for row in rows {
            out.insert(row?);
        }
        Ok(out)
    }

    /// Delete processed records older than `days`. Returns how many were removed.
    pub fn clear_processed_older_than(&self, days: u32) -> Result<usize> {
        let modifier = format!("-{days} days");
        let n = self.conn()?.execute(
            "DELETE FROM processed_channels WHERE processed_at < datetime('now', ?1)",
            params![modifier],
        )?;
        Ok(n)
    }
}
