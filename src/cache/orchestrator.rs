//! Cache orchestrator: bootstraps the local store from the remote menu and
//! serves filtered, sectioned projections.
//!
//! Filter requests are coalesced. Each request takes a sequence number; a
//! request waits out the debounce window and only runs its query if it is
//! still the latest, and its result is only applied if no newer request was
//! issued while the query was in flight. Superseded work is not cancelled,
//! its result is dropped on arrival.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::query::{evaluate, MenuFilter};
use super::sections::project;
use super::storage::{menu_digest, MenuStore, SyncInfo};
use crate::error::{MenuError, Result};
use crate::menu::{FilterState, MenuRecord, MenuSource, Section};

/// Lifecycle of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
  Uninitialized,
  Bootstrapping,
  Ready,
  /// A filter query is running; the previous projection is still current
  Refreshing,
}

impl CacheState {
  pub fn is_ready(self) -> bool {
    matches!(self, CacheState::Ready | CacheState::Refreshing)
  }
}

/// Result of a filter request.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
  /// The request was the latest and its projection is now current
  Applied(Vec<Section>),
  /// A newer request was issued; this one's result was discarded
  Superseded,
}

/// Result of a forced resync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResyncOutcome {
  /// False when the remote menu matched the stored one and nothing was written
  pub changed: bool,
  pub record_count: usize,
}

/// Notifications delivered to subscribers.
#[derive(Debug, Clone)]
pub enum CacheEvent {
  /// A new projection became current
  Projection(Vec<Section>),
  /// A filter query failed; the previous projection stays current
  QueryFailed(String),
  /// Bootstrap failed; calling `bootstrap` again retries
  BootstrapFailed(String),
}

/// Tuning knobs for the orchestrator.
#[derive(Debug, Clone)]
pub struct CacheOptions {
  /// Quiet period a filter request waits before querying
  pub debounce: Duration,
  /// Remote fetch attempts per bootstrap or resync
  pub fetch_attempts: u32,
  pub retry_delay: Duration,
}

impl Default for CacheOptions {
  fn default() -> Self {
    Self {
      debounce: Duration::from_millis(500),
      fetch_attempts: 1,
      retry_delay: Duration::from_millis(500),
    }
  }
}

struct Shared {
  state: CacheState,
  projection: Vec<Section>,
  /// Filter behind `projection`
  filter: FilterState,
  /// Filter of the most recently issued request
  requested: FilterState,
}

struct Inner<S, R> {
  store: Arc<S>,
  source: R,
  options: CacheOptions,
  shared: Mutex<Shared>,
  latest_request: AtomicU64,
  /// Serializes bootstrap and resync
  sync_lock: tokio::sync::Mutex<()>,
  subscribers: Mutex<Vec<mpsc::UnboundedSender<CacheEvent>>>,
}

/// Entry point for the UI layer.
///
/// Cloning is cheap; all clones share state.
pub struct MenuCache<S: MenuStore, R: MenuSource> {
  inner: Arc<Inner<S, R>>,
}

impl<S: MenuStore, R: MenuSource> Clone for MenuCache<S, R> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<S: MenuStore, R: MenuSource> MenuCache<S, R> {
  pub fn new(store: S, source: R, options: CacheOptions) -> Self {
    Self {
      inner: Arc::new(Inner {
        store: Arc::new(store),
        source,
        options,
        shared: Mutex::new(Shared {
          state: CacheState::Uninitialized,
          projection: Vec::new(),
          filter: FilterState::default(),
          requested: FilterState::default(),
        }),
        latest_request: AtomicU64::new(0),
        sync_lock: tokio::sync::Mutex::new(()),
        subscribers: Mutex::new(Vec::new()),
      }),
    }
  }

  // ==========================================================================
  // Accessors
  // ==========================================================================

  pub fn state(&self) -> CacheState {
    self.shared().state
  }

  /// The current projection (empty until bootstrapped).
  pub fn projection(&self) -> Vec<Section> {
    self.shared().projection.clone()
  }

  /// The filter that produced the current projection.
  pub fn filter(&self) -> FilterState {
    self.shared().filter.clone()
  }

  pub async fn last_sync(&self) -> Result<Option<SyncInfo>> {
    self.with_store(|store| store.last_sync()).await
  }

  /// Receive projection updates and failure notices.
  pub fn subscribe(&self) -> mpsc::UnboundedReceiver<CacheEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    self.subscribers().push(tx);
    rx
  }

  // ==========================================================================
  // Bootstrap and resync
  // ==========================================================================

  /// Initialize the store, filling it from the remote source if empty, and
  /// publish the unfiltered projection.
  ///
  /// Returns immediately with the current projection once ready. On failure
  /// the cache stays in `Bootstrapping` and the call may be repeated.
  pub async fn bootstrap(&self) -> Result<Vec<Section>> {
    let _sync = self.inner.sync_lock.lock().await;

    {
      let shared = self.shared();
      if shared.state.is_ready() {
        debug!("bootstrap skipped, cache already ready");
        return Ok(shared.projection.clone());
      }
    }

    self.shared().state = CacheState::Bootstrapping;
    info!("bootstrapping menu cache");

    match self.load_initial_projection().await {
      Ok(sections) => {
        {
          let mut shared = self.shared();
          shared.state = CacheState::Ready;
          shared.projection = sections.clone();
          shared.filter = FilterState::default();
          shared.requested = FilterState::default();
          self.notify(CacheEvent::Projection(sections.clone()));
        }
        info!(sections = sections.len(), "menu cache ready");
        Ok(sections)
      }
      Err(e) => {
        let err = MenuError::bootstrap(e);
        warn!(error = %err, "menu cache bootstrap failed");
        self.notify(CacheEvent::BootstrapFailed(err.to_string()));
        Err(err)
      }
    }
  }

  async fn load_initial_projection(&self) -> Result<Vec<Section>> {
    self.with_store(|store| store.initialize()).await?;

    if self.with_store(|store| store.is_empty()).await? {
      info!("menu store is empty, fetching remote menu");
      let records = self.fetch_remote().await?;
      let count = records.len();
      self
        .with_store(move |store| store.replace_all(&records))
        .await?;
      info!(count, "menu store populated");
    }

    let records = self
      .with_store(|store| store.query(&MenuFilter::all()))
      .await?;
    Ok(project(&records))
  }

  /// Force a full replace of the stored menu from the remote source, then
  /// re-run the current filter. Skips the write when the menu is unchanged.
  pub async fn resync(&self) -> Result<ResyncOutcome> {
    if !self.state().is_ready() {
      return Err(MenuError::NotReady);
    }
    let _sync = self.inner.sync_lock.lock().await;

    let records = self.fetch_remote().await?;
    let record_count = records.len();
    let digest = menu_digest(&records);
    let previous = self.with_store(|store| store.last_sync()).await?;

    let changed = previous.map_or(true, |info| info.digest != digest);
    if changed {
      self
        .with_store(move |store| store.replace_all(&records))
        .await?;
      info!(count = record_count, "menu resynced");
    } else {
      info!("remote menu unchanged, skipping resync write");
    }

    // Re-run whatever the user asked for last under its own request number,
    // so a filter still waiting out its debounce is not superseded
    let (request, filter) = self.latest_requested();
    self
      .spawn_run(Some(request), filter, Duration::ZERO)
      .await
      .map_err(|e| MenuError::StorageReadError(format!("filter task failed: {}", e)))??;

    Ok(ResyncOutcome {
      changed,
      record_count,
    })
  }

  /// Fetch from the remote source, retrying transient failures.
  async fn fetch_remote(&self) -> Result<Vec<MenuRecord>> {
    let attempts = self.inner.options.fetch_attempts.max(1);
    let mut attempt = 1;

    loop {
      match self.inner.source.fetch().await {
        Ok(records) if records.is_empty() => {
          return Err(MenuError::RemoteMalformed(
            "menu document contains no items".into(),
          ));
        }
        Ok(records) => return Ok(records),
        Err(e) if e.is_retryable() && attempt < attempts => {
          warn!(attempt, attempts, error = %e, "remote menu fetch failed, retrying");
          attempt += 1;
          tokio::time::sleep(self.inner.options.retry_delay).await;
        }
        Err(e) => return Err(e),
      }
    }
  }

  // ==========================================================================
  // Filtering
  // ==========================================================================

  /// Query the store with `filter` and publish the sectioned result, unless
  /// a newer request supersedes this one first.
  ///
  /// The request is ordered against other requests when this is called, not
  /// when the returned future is first polled. The work runs on a spawned
  /// task, so dropping the future does not abandon a half-applied refresh.
  /// Must be called from within a Tokio runtime.
  ///
  /// On query failure the previous projection stays current and subscribers
  /// receive `QueryFailed`.
  pub fn apply_filter(
    &self,
    filter: FilterState,
  ) -> impl Future<Output = Result<FilterOutcome>> + Send + 'static {
    let handle = self.spawn_filter(filter);
    async move {
      handle
        .await
        .map_err(|e| MenuError::StorageReadError(format!("filter task failed: {}", e)))?
    }
  }

  /// Issue a filter request and run it on the runtime without waiting for it.
  pub fn spawn_filter(&self, filter: FilterState) -> JoinHandle<Result<FilterOutcome>> {
    let request = self.issue_request(&filter);
    self.spawn_run(request, filter, self.inner.options.debounce)
  }

  /// Take the next request number and remember `filter` as the latest one
  /// asked for. `None` when the cache is not ready.
  fn issue_request(&self, filter: &FilterState) -> Option<u64> {
    let mut shared = self.shared();
    if !shared.state.is_ready() {
      return None;
    }
    shared.requested = filter.clone();
    Some(self.inner.latest_request.fetch_add(1, Ordering::SeqCst) + 1)
  }

  fn latest_requested(&self) -> (u64, FilterState) {
    let shared = self.shared();
    (
      self.inner.latest_request.load(Ordering::SeqCst),
      shared.requested.clone(),
    )
  }

  fn spawn_run(
    &self,
    request: Option<u64>,
    filter: FilterState,
    debounce: Duration,
  ) -> JoinHandle<Result<FilterOutcome>> {
    let cache = self.clone();
    tokio::spawn(async move {
      match request {
        Some(request) => cache.run_filter(request, filter, debounce).await,
        None => Err(MenuError::NotReady),
      }
    })
  }

  async fn run_filter(
    &self,
    request: u64,
    filter: FilterState,
    debounce: Duration,
  ) -> Result<FilterOutcome> {
    if !debounce.is_zero() {
      tokio::time::sleep(debounce).await;
    }

    {
      let mut shared = self.shared();
      if !self.is_latest(request) {
        debug!(request, "filter request coalesced");
        return Ok(FilterOutcome::Superseded);
      }
      shared.state = CacheState::Refreshing;
    }

    let query_filter = filter.clone();
    let result = self
      .with_store(move |store| evaluate(store, &query_filter))
      .await;

    // Publish under the state lock so subscribers see projections in the
    // order they became current
    let mut shared = self.shared();
    if !self.is_latest(request) {
      debug!(request, "discarding superseded filter result");
      return Ok(FilterOutcome::Superseded);
    }
    shared.state = CacheState::Ready;

    match result {
      Ok(records) => {
        let sections = project(&records);
        shared.projection = sections.clone();
        shared.filter = filter;
        debug!(request, sections = sections.len(), "filter applied");
        self.notify(CacheEvent::Projection(sections.clone()));
        Ok(FilterOutcome::Applied(sections))
      }
      Err(e) => {
        warn!(request, error = %e, "filter query failed, keeping previous results");
        self.notify(CacheEvent::QueryFailed(e.to_string()));
        Err(e)
      }
    }
  }

  fn is_latest(&self, request: u64) -> bool {
    self.inner.latest_request.load(Ordering::SeqCst) == request
  }

  // ==========================================================================
  // Internals
  // ==========================================================================

  /// Run a store call on the blocking pool.
  async fn with_store<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&S) -> Result<T> + Send + 'static,
  {
    let store = Arc::clone(&self.inner.store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
      .await
      .map_err(|e| MenuError::StorageUnavailable(format!("store task failed: {}", e)))?
  }

  fn shared(&self) -> MutexGuard<'_, Shared> {
    // State is always left consistent, so a poisoned lock is still usable
    self
      .inner
      .shared
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn subscribers(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<CacheEvent>>> {
    self
      .inner
      .subscribers
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn notify(&self, event: CacheEvent) {
    self
      .subscribers()
      .retain(|tx| tx.send(event.clone()).is_ok());
  }
}
