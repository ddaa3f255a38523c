//! Key-value store seam.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::CacheResult;

/// Synchronous key-value store scoped to a single namespace.
///
/// Keys written through one namespace are invisible to every other.
pub trait KeyValueStore: Send + Sync {
    /// Retrieve a value
    fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> CacheResult<()>;

    /// Delete a value. Returns whether it existed.
    fn delete(&self, key: &str) -> CacheResult<bool>;

    /// All keys in the namespace
    fn keys(&self) -> CacheResult<Vec<String>>;

    /// Keys starting with `prefix`
    fn keys_with_prefix(&self, prefix: &str) -> CacheResult<Vec<String>> {
        Ok(self
            .keys()?
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect())
    }

    /// Delete every key in the namespace. Returns how many were removed.
    fn clear(&self) -> CacheResult<usize> {
        let keys = self.keys()?;
        let mut removed = 0;
        for key in keys {
            if self.delete(&key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
