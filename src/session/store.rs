//! Session persistence and the principal index.
//!
//! Each session is one hash record under `{namespace}:{name}:{id}` with three
//! fields: the serialized values, the serialized options (written once, at
//! creation) and the last-access unix timestamp. The record's TTL tracks the
//! earliest enabled timeout so the backend garbage-collects it no sooner than
//! it becomes logically invalid.
//!
//! Sessions belonging to an authenticated principal are listed in a set under
//! `{namespace}:INDEX:{name}:{principal}`. Entries are never swept eagerly;
//! lookups drop ids whose record is gone or expired.

use crate::auth::Authentication;
use crate::error::{Error, Result};
use crate::session::backend::SessionBackend;
use crate::session::settings::SettingReader;
use crate::session::{codec, generate_session_id, timeout_from_secs, Session, SessionOptions};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default key namespace
pub const DEFAULT_NAMESPACE: &str = "LANAI:SESSION";

/// Record field holding the serialized values
pub const VALUES_FIELD: &str = "values";
/// Record field holding the serialized options
pub const OPTIONS_FIELD: &str = "options";
/// Record field holding the last access time in unix seconds
pub const LAST_ACCESSED_FIELD: &str = "lastAccessed";

/// Global setting overriding the idle timeout of new sessions
pub const SETTING_IDLE_TIMEOUT: &str = "IDLE_SESSION_TIMEOUT_SECS";
/// Global setting overriding the absolute timeout of new sessions
pub const SETTING_ABSOLUTE_TIMEOUT: &str = "ABSOLUTE_SESSION_TIMEOUT_SECS";

/// Session store contract shared by request handling and security handlers
///
/// Implementations are stateless apart from their backend handle and are safe
/// to call from many tasks at once. Every method performs backend I/O and is
/// cancelled by dropping its future.
#[async_trait]
pub trait Store: Send + Sync {
    /// Load a session, or create a new one when `id` is empty, unknown or expired
    async fn get(&self, id: &str, name: &str) -> Result<Session>;

    /// Create a new, unsaved session
    async fn new_session(&self, name: &str) -> Result<Session>;

    /// Persist a session and refresh its TTL
    async fn save(&self, session: &mut Session) -> Result<()>;

    /// Remove a session record and its principal index entry
    async fn delete(&self, session: &Session) -> Result<()>;

    /// Delete each of the given sessions, stopping at the first failure
    async fn invalidate(&self, sessions: &[Session]) -> Result<()>;

    /// Delete every live session of a principal
    async fn invalidate_by_principal_name(&self, principal: &str, name: &str) -> Result<()>;

    /// Move the session record to a freshly generated id
    async fn change_id(&self, session: &mut Session) -> Result<()>;

    async fn add_to_principal_index(&self, principal: &str, session: &Session) -> Result<()>;

    async fn remove_from_principal_index(&self, principal: &str, session: &Session) -> Result<()>;

    /// Live sessions of a principal; stale index entries are cleaned up on the way
    async fn find_by_principal_name(&self, principal: &str, name: &str) -> Result<Vec<Session>>;

    /// Default options copied into new sessions
    fn options(&self) -> &SessionOptions;

    /// Shallow copy of this store bounding every backend call by `timeout`
    fn with_timeout(&self, timeout: Duration) -> Arc<dyn Store>;
}

/// Session store over any [`SessionBackend`]
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    options: Arc<SessionOptions>,
    namespace: String,
    command_timeout: Option<Duration>,
    setting_reader: Option<Arc<dyn SettingReader>>,
}

impl SessionStore {
    /// Create a store with default options and namespace
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self::with_options(backend, SessionOptions::default())
    }

    /// Create a store with custom session options
    pub fn with_options(backend: Arc<dyn SessionBackend>, options: SessionOptions) -> Self {
        Self {
            backend,
            options: Arc::new(options),
            namespace: DEFAULT_NAMESPACE.to_string(),
            command_timeout: None,
            setting_reader: None,
        }
    }

    /// Use a different key namespace
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Bound every backend call by `timeout`
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Read timeout overrides for new sessions from global settings
    pub fn setting_reader(mut self, reader: Arc<dyn SettingReader>) -> Self {
        self.setting_reader = Some(reader);
        self
    }

    /// Shared handle given to the sessions this store creates
    pub fn handle(&self) -> Arc<dyn Store> {
        Arc::new(self.clone())
    }

    pub fn backend(&self) -> &Arc<dyn SessionBackend> {
        &self.backend
    }

    /// Get the storage backend name
    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Backend key of a session record
    pub fn session_key(&self, name: &str, id: &str) -> String {
        format!("{}:{}:{}", self.namespace, name, id)
    }

    /// Backend key of a principal index
    pub fn principal_index_key(&self, principal: &str, name: &str) -> String {
        format!("{}:INDEX:{}:{}", self.namespace, name, principal)
    }

    /// Drop stale ids from a principal index, returning how many were removed
    pub async fn reconcile_index(
        &self,
        principal: &str,
        name: &str,
        stale_ids: &[String],
    ) -> Result<usize> {
        if stale_ids.is_empty() {
            return Ok(0);
        }

        let key = self.principal_index_key(principal, name);
        self.timed(self.backend.set_remove(&key, stale_ids)).await?;
        log::debug!(
            "Removed {} stale session ids from index {}",
            stale_ids.len(),
            key
        );
        Ok(stale_ids.len())
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        match self.command_timeout {
            Some(timeout) => tokio::time::timeout(timeout, fut).await.map_err(|_| {
                Error::timeout(format!(
                    "Session backend call exceeded {}ms",
                    timeout.as_millis()
                ))
            })?,
            None => fut.await,
        }
    }

    /// Load a live session; `None` when the record is absent or expired
    async fn load(&self, id: &str, name: &str) -> Result<Option<Session>> {
        let key = self.session_key(name, id);
        let record = self.timed(self.backend.hash_get_all(&key)).await?;

        if record.is_empty() {
            log::debug!("Session {} not found", key);
            return Ok(None);
        }

        let mut session = Session::new(self.handle(), name, (*self.options).clone());
        session.set_id(id.to_string());

        for (field, raw) in record {
            match field.as_str() {
                VALUES_FIELD => {
                    let values: Map<String, Value> = codec::deserialize(&raw)
                        .map_err(|e| e.with_context(format!("Cannot load values of {}", key)))?;
                    session.set_values(values);
                }
                OPTIONS_FIELD => {
                    let options: SessionOptions = codec::deserialize(&raw)
                        .map_err(|e| e.with_context(format!("Cannot load options of {}", key)))?;
                    session.set_options(options);
                }
                LAST_ACCESSED_FIELD => {
                    session.set_last_accessed(parse_timestamp(&raw)?);
                }
                _ => {}
            }
        }
        session.mark_persisted();

        if session.is_expired() {
            log::debug!("Session {} is expired", key);
            return Ok(None);
        }

        session.set_last_accessed(Utc::now());
        Ok(Some(session))
    }

    async fn read_timeout_setting(&self, key: &str) -> Option<Option<Duration>> {
        let reader = self.setting_reader.as_ref()?;
        match reader.read_secs(key).await {
            Ok(Some(secs)) => Some(timeout_from_secs(secs)),
            Ok(None) => None,
            Err(e) => {
                log::warn!("Failed to read session setting {}: {}", key, e);
                None
            }
        }
    }
}

fn parse_timestamp(raw: &[u8]) -> Result<DateTime<Utc>> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| Error::serialization(format!("Invalid last accessed time: {}", e)))?;
    let secs: i64 = text
        .trim()
        .parse()
        .map_err(|_| Error::serialization(format!("Invalid last accessed time: {}", text)))?;
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| Error::serialization(format!("Last accessed time out of range: {}", secs)))
}

/// Principal recorded in a session's authentication value
fn principal_name(session: &Session) -> Option<String> {
    Authentication::from_session(session).and_then(|auth| auth.principal)
}

#[async_trait]
impl Store for SessionStore {
    async fn get(&self, id: &str, name: &str) -> Result<Session> {
        if id.is_empty() {
            return self.new_session(name).await;
        }

        match self.load(id, name).await? {
            Some(session) => Ok(session),
            None => self.new_session(name).await,
        }
    }

    async fn new_session(&self, name: &str) -> Result<Session> {
        let mut options = (*self.options).clone();
        if let Some(idle) = self.read_timeout_setting(SETTING_IDLE_TIMEOUT).await {
            options.idle_timeout = idle;
        }
        if let Some(absolute) = self.read_timeout_setting(SETTING_ABSOLUTE_TIMEOUT).await {
            options.absolute_timeout = absolute;
        }

        Ok(Session::create(self.handle(), name, options))
    }

    async fn save(&self, session: &mut Session) -> Result<()> {
        if session.id().is_empty() {
            return Err(Error::usage("session id is empty"));
        }

        session.set_last_accessed(Utc::now());
        let key = self.session_key(session.name(), session.id());

        let mut fields: Vec<(&str, Vec<u8>)> = Vec::with_capacity(3);
        if session.is_dirty() || session.is_new() {
            fields.push((VALUES_FIELD, codec::serialize(session.values())?));
        }
        if session.is_new() {
            fields.push((OPTIONS_FIELD, codec::serialize(session.options())?));
        }
        fields.push((
            LAST_ACCESSED_FIELD,
            session.last_accessed().timestamp().to_string().into_bytes(),
        ));

        self.timed(self.backend.hash_set(&key, &fields)).await?;

        if let Some(expiration) = session.expiration() {
            self.timed(self.backend.expire_at(&key, expiration)).await?;
        }

        log::debug!(
            "Saved session {} (fields: {})",
            key,
            fields
                .iter()
                .map(|(field, _)| *field)
                .collect::<Vec<_>>()
                .join(",")
        );
        session.mark_persisted();
        Ok(())
    }

    async fn delete(&self, session: &Session) -> Result<()> {
        let key = self.session_key(session.name(), session.id());
        self.timed(self.backend.delete(&key)).await?;

        // Index removal is optional: a missing record is dropped from the index on read
        if let Some(principal) = principal_name(session) {
            if let Err(e) = self.remove_from_principal_index(&principal, session).await {
                log::warn!(
                    "Failed to remove session {} from index of {}: {}",
                    session.id(),
                    principal,
                    e
                );
            }
        }

        log::info!("Session {} destroyed", key);
        Ok(())
    }

    async fn invalidate(&self, sessions: &[Session]) -> Result<()> {
        for session in sessions {
            self.delete(session).await?;
        }
        Ok(())
    }

    async fn invalidate_by_principal_name(&self, principal: &str, name: &str) -> Result<()> {
        let sessions = self.find_by_principal_name(principal, name).await?;
        self.invalidate(&sessions).await
    }

    async fn change_id(&self, session: &mut Session) -> Result<()> {
        if session.id().is_empty() {
            return Err(Error::usage("cannot change id of a session without identity"));
        }

        let new_id = generate_session_id();
        let old_key = self.session_key(session.name(), session.id());
        let new_key = self.session_key(session.name(), &new_id);

        self.timed(self.backend.rename(&old_key, &new_key)).await?;

        log::info!("Session rotated: {} -> {}", old_key, new_key);
        session.set_id(new_id);
        Ok(())
    }

    async fn add_to_principal_index(&self, principal: &str, session: &Session) -> Result<()> {
        let key = self.principal_index_key(principal, session.name());
        self.timed(self.backend.set_add(&key, session.id())).await
    }

    async fn remove_from_principal_index(&self, principal: &str, session: &Session) -> Result<()> {
        let key = self.principal_index_key(principal, session.name());
        self.timed(self.backend.set_remove(&key, &[session.id().to_string()]))
            .await
    }

    async fn find_by_principal_name(&self, principal: &str, name: &str) -> Result<Vec<Session>> {
        let key = self.principal_index_key(principal, name);
        let ids = self.timed(self.backend.set_members(&key)).await?;

        let loaded =
            futures::future::try_join_all(ids.iter().map(|id| self.load(id, name))).await?;

        let mut found = Vec::with_capacity(ids.len());
        let mut stale = Vec::new();
        for (id, session) in ids.into_iter().zip(loaded) {
            match session {
                Some(session) => found.push(session),
                None => stale.push(id),
            }
        }

        if let Err(e) = self.reconcile_index(principal, name, &stale).await {
            log::warn!("Failed to clean up stale entries of index {}: {}", key, e);
        }

        Ok(found)
    }

    fn options(&self) -> &SessionOptions {
        &self.options
    }

    fn with_timeout(&self, timeout: Duration) -> Arc<dyn Store> {
        Arc::new(self.clone().command_timeout(timeout))
    }
}
