use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::{CacheOptions, SqliteMenuStore};
use crate::error::{MenuError, Result};

pub const DEFAULT_MENU_URL: &str =
  "https://raw.githubusercontent.com/Meta-Mobile-Developer-PC/Working-With-Data-API/main/capstone.json";

pub const DEFAULT_IMAGE_URL_TEMPLATE: &str =
  "https://github.com/Meta-Mobile-Developer-PC/Working-With-Data-API/blob/main/images/{image}?raw=true";

/// Environment variable overriding `remote.url`.
pub const URL_ENV: &str = "MENUCACHE_URL";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  pub remote: RemoteConfig,
  pub cache: CacheConfig,
  /// Category toggles offered for filtering, in display order (case-insensitive)
  #[serde(deserialize_with = "deserialize_lowercase_list")]
  pub categories: Vec<String>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      remote: RemoteConfig::default(),
      cache: CacheConfig::default(),
      categories: vec!["starters".into(), "mains".into(), "desserts".into()],
    }
  }
}

fn deserialize_lowercase_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  let mut out: Vec<String> = Vec::with_capacity(v.len());
  for s in v {
    let s = s.trim().to_lowercase();
    if !s.is_empty() && !out.contains(&s) {
      out.push(s);
    }
  }
  Ok(out)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
  pub url: String,
  /// Abort the fetch after this many milliseconds
  pub timeout_ms: u64,
  /// Fetch attempts per bootstrap or resync
  pub fetch_attempts: u32,
  pub retry_delay_ms: u64,
  /// Image URL with an `{image}` placeholder for the record's image name
  pub image_url_template: String,
}

impl Default for RemoteConfig {
  fn default() -> Self {
    Self {
      url: DEFAULT_MENU_URL.to_string(),
      timeout_ms: 10_000,
      fetch_attempts: 1,
      retry_delay_ms: 500,
      image_url_template: DEFAULT_IMAGE_URL_TEMPLATE.to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Menu database location (defaults to the user data directory)
  pub database_path: Option<PathBuf>,
  /// Profile database location (defaults next to the menu database)
  pub profile_path: Option<PathBuf>,
  /// Filter debounce window
  pub debounce_ms: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      database_path: None,
      profile_path: None,
      debounce_ms: 500,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./menucache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/menucache/config.yaml
  ///
  /// Falls back to defaults when no file is found. `MENUCACHE_URL`
  /// overrides the remote URL either way.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(MenuError::Config(format!(
          "config file not found: {}",
          p.display()
        )));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    if let Ok(url) = std::env::var(URL_ENV) {
      config.remote.url = url;
    }

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("menucache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("menucache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
      MenuError::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;

    Self::from_yaml(&contents)
      .map_err(|e| MenuError::Config(format!("{}: {}", path.display(), e)))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents)
      .map_err(|e| MenuError::Config(format!("failed to parse config: {}", e)))
  }

  fn validate(&self) -> Result<()> {
    self.remote_url()?;
    if !self.remote.image_url_template.contains("{image}") {
      return Err(MenuError::Config(
        "remote.image_url_template must contain {image}".into(),
      ));
    }
    Ok(())
  }

  pub fn remote_url(&self) -> Result<Url> {
    Url::parse(&self.remote.url)
      .map_err(|e| MenuError::Config(format!("invalid remote.url '{}': {}", self.remote.url, e)))
  }

  pub fn remote_timeout(&self) -> Duration {
    Duration::from_millis(self.remote.timeout_ms)
  }

  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.cache.database_path {
      Some(p) => Ok(p.clone()),
      None => SqliteMenuStore::default_path(),
    }
  }

  pub fn profile_path(&self) -> Result<PathBuf> {
    match &self.cache.profile_path {
      Some(p) => Ok(p.clone()),
      None => Ok(self.database_path()?.with_file_name("profile.db")),
    }
  }

  pub fn cache_options(&self) -> CacheOptions {
    CacheOptions {
      debounce: Duration::from_millis(self.cache.debounce_ms),
      fetch_attempts: self.remote.fetch_attempts.max(1),
      retry_delay: Duration::from_millis(self.remote.retry_delay_ms),
    }
  }
}
