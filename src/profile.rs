//! User profile persistence.
//!
//! A small key-value table kept separate from the menu cache. Completing
//! onboarding is recorded by the presence of a stored profile.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::{MenuError, Result};

const PROFILE_KEY: &str = "profile";

const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
"#;

/// The user's profile and notification preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
  pub first_name: String,
  pub last_name: String,
  pub email: String,
  pub phone_number: String,
  pub order_statuses: bool,
  pub password_changes: bool,
  pub special_offers: bool,
  pub newsletter: bool,
  /// Avatar image URI, empty when unset
  pub image: String,
}

impl Profile {
  /// Avatar placeholder: first letters of first and last name.
  pub fn initials(&self) -> String {
    self
      .first_name
      .chars()
      .take(1)
      .chain(self.last_name.chars().take(1))
      .flat_map(char::to_uppercase)
      .collect()
  }
}

/// A partial profile edit; `None` leaves the field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
  pub first_name: Option<String>,
  pub last_name: Option<String>,
  pub email: Option<String>,
  pub phone_number: Option<String>,
  pub order_statuses: Option<bool>,
  pub password_changes: Option<bool>,
  pub special_offers: Option<bool>,
  pub newsletter: Option<bool>,
  pub image: Option<String>,
}

impl ProfileUpdate {
  pub fn is_empty(&self) -> bool {
    *self == Self::default()
  }

  pub fn apply(&self, profile: &mut Profile) {
    fn set<T: Clone>(field: &mut T, value: &Option<T>) {
      if let Some(value) = value {
        *field = value.clone();
      }
    }

    set(&mut profile.first_name, &self.first_name);
    set(&mut profile.last_name, &self.last_name);
    set(&mut profile.email, &self.email);
    set(&mut profile.phone_number, &self.phone_number);
    set(&mut profile.order_statuses, &self.order_statuses);
    set(&mut profile.password_changes, &self.password_changes);
    set(&mut profile.special_offers, &self.special_offers);
    set(&mut profile.newsletter, &self.newsletter);
    set(&mut profile.image, &self.image);
  }
}

/// Key-value store holding the profile.
pub struct ProfileStore {
  conn: Mutex<Connection>,
}

impl ProfileStore {
  /// Open (or create) the store at `path` and ensure its schema.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        MenuError::StorageUnavailable(format!("failed to create profile directory: {}", e))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      MenuError::StorageUnavailable(format!(
        "failed to open profile database at {}: {}",
        path.display(),
        e
      ))
    })?;
    Self::with_connection(conn)
  }

  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory().map_err(|e| {
      MenuError::StorageUnavailable(format!("failed to open in-memory database: {}", e))
    })?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(KV_SCHEMA)
      .map_err(|e| MenuError::StorageUnavailable(format!("failed to run migrations: {}", e)))?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| MenuError::StorageUnavailable(format!("lock poisoned: {}", e)))
  }

  pub fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self.lock()?;
    conn
      .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
        row.get(0)
      })
      .optional()
      .map_err(|e| MenuError::StorageReadError(format!("failed to read '{}': {}", key, e)))
  }

  pub fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO kv (key, value) VALUES (?, ?)",
        params![key, value],
      )
      .map_err(|e| MenuError::StorageWriteError(format!("failed to write '{}': {}", key, e)))?;
    Ok(())
  }

  pub fn remove(&self, key: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute("DELETE FROM kv WHERE key = ?", params![key])
      .map_err(|e| MenuError::StorageWriteError(format!("failed to remove '{}': {}", key, e)))?;
    Ok(())
  }

  /// The stored profile, if onboarding has been completed.
  pub fn load(&self) -> Result<Option<Profile>> {
    self
      .get(PROFILE_KEY)?
      .map(|json| {
        serde_json::from_str(&json)
          .map_err(|e| MenuError::StorageReadError(format!("failed to parse profile: {}", e)))
      })
      .transpose()
  }

  pub fn save(&self, profile: &Profile) -> Result<()> {
    let json = serde_json::to_string(profile)
      .map_err(|e| MenuError::StorageWriteError(format!("failed to serialize profile: {}", e)))?;
    self.set(PROFILE_KEY, &json)?;
    debug!("profile saved");
    Ok(())
  }

  /// Log out: forget the profile and return to onboarding.
  pub fn clear(&self) -> Result<()> {
    self.remove(PROFILE_KEY)?;
    debug!("profile cleared");
    Ok(())
  }

  pub fn onboarding_completed(&self) -> Result<bool> {
    Ok(self.get(PROFILE_KEY)?.is_some())
  }

  /// Apply `update` on top of the stored profile (or a blank one) and save.
  /// Saving completes onboarding.
  pub fn update(&self, update: &ProfileUpdate) -> Result<Profile> {
    let mut profile = self.load()?.unwrap_or_default();
    update.apply(&mut profile);
    self.save(&profile)?;
    Ok(profile)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn profile() -> Profile {
    Profile {
      first_name: "tilly".into(),
      last_name: "Ortega".into(),
      email: "tilly@example.com".into(),
      newsletter: true,
      ..Profile::default()
    }
  }

  #[test]
  fn test_initials() {
    assert_eq!(profile().initials(), "TO");
    assert_eq!(Profile::default().initials(), "");
  }

  #[test]
  fn test_onboarding_follows_profile() {
    let store = ProfileStore::open_in_memory().unwrap();
    assert!(!store.onboarding_completed().unwrap());
    assert!(store.load().unwrap().is_none());

    store.save(&profile()).unwrap();
    assert!(store.onboarding_completed().unwrap());
    assert_eq!(store.load().unwrap(), Some(profile()));

    store.clear().unwrap();
    assert!(!store.onboarding_completed().unwrap());
  }

  #[test]
  fn test_reads_partial_camel_case_json() {
    let store = ProfileStore::open_in_memory().unwrap();
    store
      .set(PROFILE_KEY, r#"{"firstName": "Ana", "specialOffers": true}"#)
      .unwrap();

    let loaded = store.load().unwrap().unwrap();
    assert_eq!(loaded.first_name, "Ana");
    assert!(loaded.special_offers);
    assert_eq!(loaded.email, "");
  }

  #[test]
  fn test_corrupt_profile_is_a_read_error() {
    let store = ProfileStore::open_in_memory().unwrap();
    store.set(PROFILE_KEY, "{not json").unwrap();
    assert!(matches!(store.load(), Err(MenuError::StorageReadError(_))));
  }

  #[test]
  fn test_update_merges_into_stored_profile() {
    let store = ProfileStore::open_in_memory().unwrap();
    store.save(&profile()).unwrap();

    let update = ProfileUpdate {
      email: Some("t.ortega@example.com".into()),
      newsletter: Some(false),
      special_offers: Some(true),
      ..ProfileUpdate::default()
    };
    let updated = store.update(&update).unwrap();

    assert_eq!(updated.first_name, "tilly");
    assert_eq!(updated.email, "t.ortega@example.com");
    assert!(!updated.newsletter);
    assert!(updated.special_offers);
    assert_eq!(store.load().unwrap(), Some(updated));
  }

  #[test]
  fn test_update_without_profile_completes_onboarding() {
    let store = ProfileStore::open_in_memory().unwrap();
    let update = ProfileUpdate {
      first_name: Some("Ana".into()),
      ..ProfileUpdate::default()
    };
    assert!(!update.is_empty());
    assert!(ProfileUpdate::default().is_empty());

    store.update(&update).unwrap();
    assert!(store.onboarding_completed().unwrap());
    assert_eq!(store.load().unwrap().unwrap().initials(), "A");
  }

  #[test]
  fn test_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profile.db");
    ProfileStore::open(&path).unwrap().save(&profile()).unwrap();

    let store = ProfileStore::open(&path).unwrap();
    assert_eq!(store.load().unwrap(), Some(profile()));
  }
}
