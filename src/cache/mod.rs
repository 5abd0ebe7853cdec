//! Local-first menu cache.
//!
//! This module provides:
//! - A persistent SQLite store, replaced wholesale on each resync
//! - A parameterized text/category query engine
//! - Projection of query results into category sections
//! - An orchestrator that bootstraps from the remote menu and coalesces
//!   rapid filter changes

mod orchestrator;
mod query;
mod sections;
mod storage;

pub use orchestrator::{
  CacheEvent, CacheOptions, CacheState, FilterOutcome, MenuCache, ResyncOutcome,
};
pub use query::{evaluate, MenuFilter};
pub use sections::{compare_names, display_category, project};
pub use storage::{menu_digest, MenuStore, SqliteMenuStore, SyncInfo};
