//! Backend wrapper failing chosen operations, for error-path tests.

use crate::error::{Error, Result};
use crate::session::backend::memory::MemoryBackend;
use crate::session::backend::SessionBackend;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;

/// Delegates to a [`MemoryBackend`] unless the operation was told to fail
pub(crate) struct FlakyBackend {
    inner: MemoryBackend,
    failures: DashMap<&'static str, Option<String>>,
}

impl FlakyBackend {
    /// Wrap `inner`; clones of it keep seeing the same data
    pub(crate) fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            failures: DashMap::new(),
        }
    }

    /// Fail every call of `op`
    pub(crate) fn fail(&self, op: &'static str) {
        self.failures.insert(op, None);
    }

    /// Fail calls of `op` on `key` only
    pub(crate) fn fail_on(&self, op: &'static str, key: impl Into<String>) {
        self.failures.insert(op, Some(key.into()));
    }

    pub(crate) fn heal(&self, op: &'static str) {
        self.failures.remove(op);
    }

    fn check(&self, op: &'static str, key: &str) -> Result<()> {
        let failing = self
            .failures
            .get(op)
            .is_some_and(|target| target.as_deref().map_or(true, |k| k == key));
        if failing {
            return Err(Error::backend(format!("{} failed on {}", op, key)));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionBackend for FlakyBackend {
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, Vec<u8>>> {
        self.check("hash_get_all", key)?;
        self.inner.hash_get_all(key).await
    }

    async fn hash_set(&self, key: &str, fields: &[(&str, Vec<u8>)]) -> Result<()> {
        self.check("hash_set", key)?;
        self.inner.hash_set(key, fields).await
    }

    async fn expire_at(&self, key: &str, at: DateTime<Utc>) -> Result<()> {
        self.check("expire_at", key)?;
        self.inner.expire_at(key, at).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check("delete", key)?;
        self.inner.delete(key).await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.check("rename", from)?;
        self.inner.rename(from, to).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        self.check("set_add", key)?;
        self.inner.set_add(key, member).await
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<()> {
        self.check("set_remove", key)?;
        self.inner.set_remove(key, members).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.check("set_members", key)?;
        self.inner.set_members(key).await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}
