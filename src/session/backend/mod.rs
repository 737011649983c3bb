use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

#[cfg(test)]
pub(crate) mod testing;

/// Key-value primitives the session store is built on
///
/// Any engine offering a hash map per key, sets, absolute expiry and an atomic
/// rename can back the store. Each call is expected to be atomic on its own;
/// the store never relies on multi-command transactions.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Read every field of the hash at `key`; an empty map means the key is absent
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, Vec<u8>>>;

    /// Write the given fields into the hash at `key`, creating it if needed
    async fn hash_set(&self, key: &str, fields: &[(&str, Vec<u8>)]) -> Result<()>;

    /// Expire `key` at the given instant
    async fn expire_at(&self, key: &str, at: DateTime<Utc>) -> Result<()>;

    /// Remove `key` whatever its type
    async fn delete(&self, key: &str) -> Result<()>;

    /// Move `from` to `to`, keeping its TTL
    ///
    /// Fails with [`Error::KeyNotFound`](crate::Error::KeyNotFound) when `from`
    /// does not exist.
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    async fn set_add(&self, key: &str, member: &str) -> Result<()>;

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<()>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    /// Get storage backend name for logging/debugging
    fn backend_name(&self) -> &'static str;
}
