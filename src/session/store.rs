//! Durable key/value storage for the authentication session.

use color_eyre::{eyre::eyre, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Storage key of the bearer token.
pub const TOKEN_KEY: &str = "admin_token";
/// Storage key of the serialized user profile.
pub const USER_KEY: &str = "admin_user";

/// Trait for session storage backends.
pub trait SessionStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>>;

  fn set(&self, key: &str, value: &str) -> Result<()>;

  fn remove(&self, key: &str) -> Result<()>;
}

/// In-process store; nothing survives a restart.
#[derive(Default)]
pub struct MemorySessionStore {
  values: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl SessionStore for MemorySessionStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    Ok(self.values.lock().get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    self.values.lock().insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    self.values.lock().remove(key);
    Ok(())
  }
}

/// SQLite-backed session storage.
pub struct SqliteSessionStore {
  conn: Mutex<Connection>,
}

impl SqliteSessionStore {
  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open (or create) the store at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create session directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open session database at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("kedil-admin").join("session.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    self
      .conn
      .lock()
      .execute_batch(SESSION_SCHEMA)
      .map_err(|e| eyre!("Failed to run session migrations: {}", e))?;
    Ok(())
  }
}

const SESSION_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS session (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SessionStore for SqliteSessionStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    self
      .conn
      .lock()
      .query_row(
        "SELECT value FROM session WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read session value {}: {}", key, e))
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    self
      .conn
      .lock()
      .execute(
        "INSERT OR REPLACE INTO session (key, value, stored_at) VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to store session value {}: {}", key, e))?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    self
      .conn
      .lock()
      .execute("DELETE FROM session WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove session value {}: {}", key, e))?;
    Ok(())
  }
}
