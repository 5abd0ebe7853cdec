//! Menu store trait and SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::query::{fold, MenuFilter, FOLD_FUNCTION};
use crate::error::{MenuError, Result};
use crate::menu::MenuRecord;

/// Metadata about the last successful resync.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncInfo {
  /// SHA-256 over the stored records, hex encoded
  pub digest: String,
  pub record_count: usize,
  pub synced_at: DateTime<Utc>,
}

/// Trait for menu storage backends.
///
/// Writes are serialized; a reader never observes a half-applied `replace_all`.
pub trait MenuStore: Send + Sync + 'static {
  /// Ensure the schema exists. Safe to call repeatedly.
  fn initialize(&self) -> Result<()>;

  /// True iff no records are stored.
  fn is_empty(&self) -> Result<bool>;

  /// Atomically replace all records with `records`.
  fn replace_all(&self, records: &[MenuRecord]) -> Result<()>;

  /// All records matching `filter`, in unspecified order.
  fn query(&self, filter: &MenuFilter) -> Result<Vec<MenuRecord>>;

  /// Metadata from the last `replace_all`, if any.
  fn last_sync(&self) -> Result<Option<SyncInfo>> {
    Ok(None)
  }
}

/// Stable content digest of a record set.
pub fn menu_digest(records: &[MenuRecord]) -> String {
  let mut hasher = Sha256::new();
  for record in records {
    // serde_json of a plain struct cannot fail
    if let Ok(bytes) = serde_json::to_vec(record) {
      hasher.update(&bytes);
    }
    hasher.update(b"\n");
  }
  hex::encode(hasher.finalize())
}

/// SQLite-backed menu store.
pub struct SqliteMenuStore {
  conn: Mutex<Connection>,
}

impl SqliteMenuStore {
  /// Open (or create) the database at `path`, creating parent directories.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        MenuError::StorageUnavailable(format!("failed to create cache directory: {}", e))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      MenuError::StorageUnavailable(format!(
        "failed to open menu database at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::with_connection(conn)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory().map_err(|e| {
      MenuError::StorageUnavailable(format!("failed to open in-memory database: {}", e))
    })?;

    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .create_scalar_function(
        FOLD_FUNCTION,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
          let text: String = ctx.get(0)?;
          Ok(fold(&text))
        },
      )
      .map_err(|e| {
        MenuError::StorageUnavailable(format!("failed to register {}(): {}", FOLD_FUNCTION, e))
      })?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| MenuError::StorageUnavailable("could not determine data directory".into()))?;

    Ok(data_dir.join("menucache").join("menu.db"))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| MenuError::StorageUnavailable(format!("lock poisoned: {}", e)))
  }
}

/// Schema for the menu tables.
const MENU_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS menuitems (
    id INTEGER PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    price REAL NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    image TEXT NOT NULL DEFAULT '',
    category TEXT NOT NULL CHECK (length(category) > 0)
);

CREATE INDEX IF NOT EXISTS idx_menuitems_category ON menuitems(category);

-- Single row describing the last resync
CREATE TABLE IF NOT EXISTS sync_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    digest TEXT NOT NULL,
    record_count INTEGER NOT NULL,
    synced_at TEXT NOT NULL
);
"#;

impl MenuStore for SqliteMenuStore {
  fn initialize(&self) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute_batch(MENU_SCHEMA)
      .map_err(|e| MenuError::StorageUnavailable(format!("failed to run migrations: {}", e)))?;
    Ok(())
  }

  fn is_empty(&self) -> Result<bool> {
    let conn = self.lock()?;
    let exists: bool = conn
      .query_row("SELECT EXISTS (SELECT 1 FROM menuitems)", [], |row| row.get(0))
      .map_err(|e| MenuError::StorageReadError(format!("failed to count menu items: {}", e)))?;
    Ok(!exists)
  }

  fn replace_all(&self, records: &[MenuRecord]) -> Result<()> {
    let mut conn = self.lock()?;
    let write_err = |what: &str, e: rusqlite::Error| {
      MenuError::StorageWriteError(format!("{}: {}", what, e))
    };

    // Dropping the transaction on any error rolls it back
    let tx = conn
      .transaction()
      .map_err(|e| write_err("failed to begin transaction", e))?;

    tx.execute("DELETE FROM menuitems", [])
      .map_err(|e| write_err("failed to clear menu items", e))?;

    {
      let mut stmt = tx
        .prepare(
          "INSERT INTO menuitems (id, name, price, description, image, category)
           VALUES (?, ?, ?, ?, ?, ?)",
        )
        .map_err(|e| write_err("failed to prepare insert", e))?;

      for record in records {
        stmt
          .execute(params![
            record.id,
            record.name,
            record.price,
            record.description,
            record.image,
            record.category,
          ])
          .map_err(|e| write_err(&format!("failed to store menu item {}", record.id), e))?;
      }
    }

    tx.execute(
      "INSERT OR REPLACE INTO sync_meta (id, digest, record_count, synced_at)
       VALUES (1, ?, ?, ?)",
      params![menu_digest(records), records.len(), Utc::now().to_rfc3339()],
    )
    .map_err(|e| write_err("failed to record sync metadata", e))?;

    tx.commit()
      .map_err(|e| write_err("failed to commit transaction", e))?;

    debug!(count = records.len(), "replaced menu items");
    Ok(())
  }

  fn query(&self, filter: &MenuFilter) -> Result<Vec<MenuRecord>> {
    let conn = self.lock()?;
    let (clause, values) = filter.to_sql();
    let sql = format!(
      "SELECT id, name, price, description, image, category FROM menuitems WHERE {}",
      clause
    );

    let mut stmt = conn
      .prepare_cached(&sql)
      .map_err(|e| MenuError::StorageReadError(format!("failed to prepare query: {}", e)))?;

    let records = stmt
      .query_map(params_from_iter(values.iter()), |row| {
        Ok(MenuRecord {
          id: row.get(0)?,
          name: row.get(1)?,
          price: row.get(2)?,
          description: row.get(3)?,
          image: row.get(4)?,
          category: row.get(5)?,
        })
      })
      .map_err(|e| MenuError::StorageReadError(format!("failed to query menu items: {}", e)))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| MenuError::StorageReadError(format!("failed to read menu item: {}", e)))?;

    Ok(records)
  }

  fn last_sync(&self) -> Result<Option<SyncInfo>> {
    let conn = self.lock()?;
    let row: Option<(String, i64, String)> = conn
      .query_row(
        "SELECT digest, record_count, synced_at FROM sync_meta WHERE id = 1",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()
      .map_err(|e| MenuError::StorageReadError(format!("failed to read sync metadata: {}", e)))?;

    row
      .map(|(digest, record_count, synced_at)| {
        let synced_at = DateTime::parse_from_rfc3339(&synced_at)
          .map(|dt| dt.with_timezone(&Utc))
          .map_err(|e| {
            MenuError::StorageReadError(format!("failed to parse sync time '{}': {}", synced_at, e))
          })?;
        Ok(SyncInfo {
          digest,
          record_count: record_count as usize,
          synced_at,
        })
      })
      .transpose()
  }
}
