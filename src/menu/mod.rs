//! Menu domain types and the remote menu source.

pub mod remote;
pub mod types;

pub use remote::{parse_menu_document, MenuSource, RemoteMenuSource};
pub use types::{FilterState, MenuRecord, Section};
