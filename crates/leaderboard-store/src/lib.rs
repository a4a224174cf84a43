//! Persistent key-value cache for leaderboard pages.
//!
//! All access to the shared storage goes through this crate: [`Storage`]
//! owns the raw key-value handle, [`LocalCache`] layers the entity maps and
//! page-index records of one listing on top of it, and [`eviction`] bounds
//! how many page records survive a navigation.

mod error;
/// Retention policy for page-index records.
pub mod eviction;
mod key;
mod cache;
mod logos;
mod storage;

pub use cache::{CachedPage, LocalCache};
pub use error::StorageError;
pub use eviction::retention_keys;
pub use key::PageKey;
pub use logos::{DEFAULT_TEAM_IMAGE, TEAM_LOGOS_KEY, TeamLogoCache};
pub use storage::{FileStorage, MemoryStorage, Storage};
