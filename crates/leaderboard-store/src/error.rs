//! Error types for leaderboard storage operations.

use thiserror::Error;

/// Errors raised by [`crate::Storage`] backends.
///
/// The cache layer never surfaces these to its callers; they are logged and
/// the operation proceeds without caching.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Writing would grow the storage past its byte quota.
    #[error("Storage quota exceeded: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded {
        /// Bytes the storage would hold after the write.
        needed: usize,
        /// Configured limit.
        quota: usize,
    },

    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be encoded or the backing file could not be decoded.
    #[error("Failed to encode cache entry: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Another thread panicked while holding the storage lock.
    #[error("Storage lock poisoned")]
    Lock,
}
