//! Local-first restaurant menu cache.
//!
//! Fetches the published menu once, keeps it in SQLite, and answers combined
//! text/category queries against the local copy, grouped into sections.

pub mod cache;
pub mod config;
pub mod error;
pub mod menu;
pub mod profile;

pub use cache::{CacheEvent, CacheState, FilterOutcome, MenuCache};
pub use config::Config;
pub use error::{MenuError, Result};
pub use menu::{FilterState, MenuRecord, RemoteMenuSource, Section};
