use crate::error::{Error, Result};
use crate::session::backend::SessionBackend;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;

#[derive(Debug, Clone)]
enum Entry {
    Hash(HashMap<String, Vec<u8>>),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Slot {
    entry: Entry,
    expires_at: Option<DateTime<Utc>>,
}

impl Slot {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory backend using DashMap for lock-free concurrent access
///
/// Mirrors the Redis semantics the store depends on: expired keys vanish on
/// access, empty sets are removed and rename keeps the TTL. Suited to tests
/// and single-process deployments.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    data: Arc<DashMap<String, Slot>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend with a background task purging expired keys
    pub fn with_purge_interval(purge_interval: Duration) -> (Self, JoinHandle<()>) {
        let backend = Self::new();
        let handle = backend.spawn_purge_task(purge_interval);
        (backend, handle)
    }

    /// Start background task removing expired keys
    pub fn spawn_purge_task(&self, purge_interval: Duration) -> JoinHandle<()> {
        let backend = self.clone();

        tokio::spawn(async move {
            let mut interval = interval(purge_interval);

            loop {
                interval.tick().await;
                let purged = backend.purge_expired();
                if purged > 0 {
                    log::info!("Memory backend purged {} expired keys", purged);
                }
            }
        })
    }

    /// Remove every expired key, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.data.len();
        self.data.retain(|_, slot| !slot.is_expired(now));
        before.saturating_sub(self.data.len())
    }

    /// Check whether a live key exists
    pub fn exists(&self, key: &str) -> bool {
        self.live(key).is_some()
    }

    /// Expiry currently applied to `key`
    pub fn expires_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.live(key).and_then(|slot| slot.expires_at)
    }

    /// Number of stored keys, expired ones included until purged
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Snapshot of a live key, dropping it first if it has expired
    fn live(&self, key: &str) -> Option<Slot> {
        let now = Utc::now();
        if self
            .data
            .remove_if(key, |_, slot| slot.is_expired(now))
            .is_some()
        {
            log::debug!("MemoryBackend: Key {} expired and removed", key);
            return None;
        }
        self.data.get(key).map(|slot| slot.value().clone())
    }

    fn wrong_type(key: &str) -> Error {
        Error::backend(format!(
            "WRONGTYPE Operation against key {} holding the wrong kind of value",
            key
        ))
    }
}

#[async_trait]
impl SessionBackend for MemoryBackend {
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, Vec<u8>>> {
        match self.live(key) {
            Some(Slot {
                entry: Entry::Hash(fields),
                ..
            }) => Ok(fields),
            Some(_) => Err(Self::wrong_type(key)),
            None => Ok(HashMap::new()),
        }
    }

    async fn hash_set(&self, key: &str, fields: &[(&str, Vec<u8>)]) -> Result<()> {
        // Touch first so an expired hash is not resurrected with its old fields
        self.live(key);

        let mut slot = self.data.entry(key.to_string()).or_insert_with(|| Slot {
            entry: Entry::Hash(HashMap::new()),
            expires_at: None,
        });

        match &mut slot.entry {
            Entry::Hash(existing) => {
                for (field, value) in fields {
                    existing.insert((*field).to_string(), value.clone());
                }
                Ok(())
            }
            Entry::Set(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn expire_at(&self, key: &str, at: DateTime<Utc>) -> Result<()> {
        if at <= Utc::now() {
            self.data.remove(key);
            return Ok(());
        }
        if let Some(mut slot) = self.data.get_mut(key) {
            slot.expires_at = Some(at);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.data.remove(key);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let now = Utc::now();
        match self.data.remove(from) {
            Some((_, slot)) if !slot.is_expired(now) => {
                self.data.insert(to.to_string(), slot);
                Ok(())
            }
            _ => Err(Error::key_not_found(from)),
        }
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        self.live(key);

        let mut slot = self.data.entry(key.to_string()).or_insert_with(|| Slot {
            entry: Entry::Set(HashSet::new()),
            expires_at: None,
        });

        match &mut slot.entry {
            Entry::Set(members) => {
                members.insert(member.to_string());
                Ok(())
            }
            Entry::Hash(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<()> {
        let emptied = match self.data.get_mut(key) {
            Some(mut slot) => match &mut slot.entry {
                Entry::Set(existing) => {
                    for member in members {
                        existing.remove(member);
                    }
                    existing.is_empty()
                }
                Entry::Hash(_) => return Err(Self::wrong_type(key)),
            },
            None => false,
        };

        if emptied {
            self.data
                .remove_if(key, |_, slot| matches!(&slot.entry, Entry::Set(m) if m.is_empty()));
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        match self.live(key) {
            Some(Slot {
                entry: Entry::Set(members),
                ..
            }) => Ok(members.into_iter().collect()),
            Some(_) => Err(Self::wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
