use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

pub mod backend;
pub mod codec;
pub mod config_adapter;
pub mod cookie;
pub mod factory;
pub mod handler;
pub mod settings;
pub mod store;

pub use store::{SessionStore, Store};

/// Default session name, also used as the cookie name
pub const DEFAULT_NAME: &str = "SESSION";

/// Default flash queue key
pub const FLASHES_KEY: &str = "_flash";

/// Reserved value key holding the creation timestamp
pub const CREATED_TIME_KEY: &str = "_created";

/// Cookie SameSite attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl std::fmt::Display for SameSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "Strict"),
            Self::Lax => write!(f, "Lax"),
            Self::None => write!(f, "None"),
        }
    }
}

/// Cookie attributes and expiration policy of a session
///
/// A copy of the store's options is taken when a session is created and
/// persisted with it. Options never change after the first save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub path: String,
    pub domain: Option<String>,
    /// Cookie Max-Age: 0 omits the attribute, negative expires the cookie now
    pub max_age: i64,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
    /// Inactivity window; `None` disables idle expiration
    pub idle_timeout: Option<Duration>,
    /// Hard ceiling measured from creation; `None` disables it
    pub absolute_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            max_age: 0,
            secure: false,
            http_only: true,
            same_site: SameSite::Lax,
            idle_timeout: Some(Duration::from_secs(900)),
            absolute_timeout: Some(Duration::from_secs(1800)),
        }
    }
}

/// Convert a timeout in seconds to an optional duration; non-positive disables it
pub fn timeout_from_secs(secs: i64) -> Option<Duration> {
    if secs > 0 {
        Some(Duration::from_secs(secs as u64))
    } else {
        None
    }
}

/// Generate a fresh session id
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn add_timeout(at: DateTime<Utc>, timeout: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Server-side session owned by a single request
///
/// Values are kept as JSON so any serializable type can be stored and the
/// whole map can be written as one blob. Flash queues live inside the same
/// map under their own keys.
#[derive(Clone)]
pub struct Session {
    id: String,
    name: String,
    values: Map<String, Value>,
    options: SessionOptions,
    last_accessed: DateTime<Utc>,
    is_new: bool,
    dirty: bool,
    store: Arc<dyn Store>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("values", &self.values)
            .field("options", &self.options)
            .field("last_accessed", &self.last_accessed)
            .field("is_new", &self.is_new)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Empty session shell, used when loading a record
    pub(crate) fn new(store: Arc<dyn Store>, name: &str, options: SessionOptions) -> Self {
        Self {
            id: String::new(),
            name: name.to_string(),
            values: Map::new(),
            options,
            last_accessed: DateTime::<Utc>::default(),
            is_new: true,
            dirty: false,
            store,
        }
    }

    /// Brand-new session with a fresh id and current timestamps
    pub(crate) fn create(store: Arc<dyn Store>, name: &str, options: SessionOptions) -> Self {
        let now = Utc::now();
        let mut session = Self::new(store, name, options);
        session.id = generate_session_id();
        session.last_accessed = now;
        session.values.insert(
            CREATED_TIME_KEY.to_string(),
            Value::String(now.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)),
        );
        session
    }

    /// Get the session ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the session name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Check if session has unsaved changes
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Force the next save to rewrite the value blob
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        self.last_accessed
    }

    /// Creation timestamp recorded in the reserved value key
    pub fn created_time(&self) -> Option<DateTime<Utc>> {
        self.values
            .get(CREATED_TIME_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// All values, including flash queues and reserved keys
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Get a raw session value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get a session value converted to `T`
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Set a session value
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.values.insert(key.to_string(), value);
        self.dirty = true;
        Ok(())
    }

    /// Remove a session value, marking dirty only if something was removed
    pub fn delete(&mut self, key: &str) -> Option<Value> {
        let removed = self.values.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Remove all values and flashes
    ///
    /// The creation timestamp survives so the absolute timeout keeps its anchor.
    pub fn clear(&mut self) {
        let created = self.values.remove(CREATED_TIME_KEY);
        self.values = Map::new();
        if let Some(created) = created {
            self.values.insert(CREATED_TIME_KEY.to_string(), created);
        }
        self.dirty = true;
    }

    /// Append a message to the default flash queue
    pub fn add_flash<T: Serialize>(&mut self, value: T) -> Result<()> {
        self.add_flash_to(FLASHES_KEY, value)
    }

    /// Append a message to the flash queue at `key`
    pub fn add_flash_to<T: Serialize>(&mut self, key: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        let queue = match self.values.remove(key) {
            Some(Value::Array(mut items)) => {
                items.push(value);
                items
            }
            Some(Value::Null) | None => vec![value],
            Some(other) => vec![other, value],
        };
        self.values.insert(key.to_string(), Value::Array(queue));
        self.dirty = true;
        Ok(())
    }

    /// Drain the default flash queue
    pub fn flashes(&mut self) -> Vec<Value> {
        self.flashes_for(FLASHES_KEY)
    }

    /// Drain the flash queue at `key`, oldest first
    ///
    /// Always marks the session dirty, even when the queue was empty.
    pub fn flashes_for(&mut self, key: &str) -> Vec<Value> {
        self.dirty = true;
        match self.values.remove(key) {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other],
        }
    }

    /// Drain the flash queue at `key` and return its most recent message
    pub fn flash(&mut self, key: &str) -> Option<Value> {
        self.flashes_for(key).pop()
    }

    /// Time at which the session stops being valid, if any timer is enabled
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        let idle = self
            .options
            .idle_timeout
            .map(|timeout| add_timeout(self.last_accessed, timeout));
        let absolute = self.options.absolute_timeout.map(|timeout| {
            add_timeout(self.created_time().unwrap_or_default(), timeout)
        });

        match (idle, absolute) {
            (Some(idle), Some(absolute)) => Some(idle.min(absolute)),
            (idle, absolute) => idle.or(absolute),
        }
    }

    /// Check if session is expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration().is_some_and(|expiration| expiration < now)
    }

    /// Persist pending changes; a clean session is not written
    pub async fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let store = Arc::clone(&self.store);
        store.save(self).await
    }

    /// Rotate the session id, keeping its content
    pub async fn change_id(&mut self) -> Result<()> {
        let store = Arc::clone(&self.store);
        store.change_id(self).await
    }

    /// Remove the session from the store right away
    pub async fn expire_now(&self) -> Result<()> {
        self.store.invalidate(std::slice::from_ref(self)).await
    }

    pub(crate) fn set_id(&mut self, id: String) {
        self.id = id;
    }

    pub(crate) fn set_last_accessed(&mut self, at: DateTime<Utc>) {
        self.last_accessed = at;
    }

    pub(crate) fn set_values(&mut self, values: Map<String, Value>) {
        self.values = values;
    }

    pub(crate) fn set_options(&mut self, options: SessionOptions) {
        self.options = options;
    }

    /// Record that the backend now holds this session's full content
    pub(crate) fn mark_persisted(&mut self) {
        self.dirty = false;
        self.is_new = false;
    }

    #[cfg(test)]
    pub(crate) fn set_created_time(&mut self, at: DateTime<Utc>) {
        self.values.insert(
            CREATED_TIME_KEY.to_string(),
            Value::String(at.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::backend::memory::MemoryBackend;
    use super::*;
    use serde_json::json;

    fn test_session(options: SessionOptions) -> Session {
        let store = SessionStore::new(Arc::new(MemoryBackend::new()));
        Session::create(store.handle(), "session-key", options)
    }

    fn with_timeouts(idle: u64, absolute: u64) -> SessionOptions {
        SessionOptions {
            idle_timeout: timeout_from_secs(idle as i64),
            absolute_timeout: timeout_from_secs(absolute as i64),
            ..SessionOptions::default()
        }
    }

    #[test]
    fn test_flashes_drain_in_fifo_order() {
        let mut session = test_session(SessionOptions::default());

        assert!(session.flashes().is_empty());

        session.add_flash("foo").unwrap();
        session.add_flash("bar").unwrap();
        session.add_flash_to("custom_key", "baz").unwrap();

        assert_eq!(session.flashes(), vec![json!("foo"), json!("bar")]);
        assert!(session.flashes().is_empty());

        assert_eq!(session.flashes_for("custom_key"), vec![json!("baz")]);
        assert!(session.flashes_for("custom_key").is_empty());
    }

    #[test]
    fn test_flashes_hold_structured_messages() {
        let mut session = test_session(SessionOptions::default());

        session
            .add_flash(json!({"type": 42, "message": "foo"}))
            .unwrap();

        let flashes = session.flashes();
        assert_eq!(flashes.len(), 1);
        assert_eq!(flashes[0]["type"], json!(42));
        assert_eq!(flashes[0]["message"], json!("foo"));
    }

    #[test]
    fn test_empty_flash_drain_keeps_other_queues() {
        let mut session = test_session(SessionOptions::default());
        session.add_flash_to("errors", "boom").unwrap();

        assert!(session.flashes_for("notices").is_empty());
        assert_eq!(session.flashes_for("errors"), vec![json!("boom")]);
    }

    #[test]
    fn test_flash_returns_last_message() {
        let mut session = test_session(SessionOptions::default());
        session.add_flash_to("notice", "first").unwrap();
        session.add_flash_to("notice", "second").unwrap();

        assert_eq!(session.flash("notice"), Some(json!("second")));
        assert_eq!(session.flash("notice"), None);
    }

    #[test]
    fn test_empty_flash_drain_marks_dirty() {
        let mut session = test_session(SessionOptions::default());
        assert!(!session.is_dirty());

        session.flashes();
        assert!(session.is_dirty());
    }

    #[test]
    fn test_dirty_tracking() {
        let mut session = test_session(SessionOptions::default());
        assert!(!session.is_dirty());

        // Reads never dirty the session
        assert_eq!(session.get("missing"), None);
        assert!(!session.is_dirty());

        // Deleting a missing key is not a mutation
        assert_eq!(session.delete("missing"), None);
        assert!(!session.is_dirty());

        session.set("k", "v").unwrap();
        assert!(session.is_dirty());
        assert_eq!(session.get_as::<String>("k"), Some("v".to_string()));

        session.mark_persisted();
        assert!(!session.is_dirty());
        assert_eq!(session.delete("k"), Some(json!("v")));
        assert!(session.is_dirty());

        session.mark_persisted();
        session.clear();
        assert!(session.is_dirty());

        session.mark_persisted();
        session.add_flash("hello").unwrap();
        assert!(session.is_dirty());
    }

    #[test]
    fn test_clear_keeps_creation_time() {
        let mut session = test_session(SessionOptions::default());
        let created = session.created_time();
        session.set("user", "alice").unwrap();
        session.add_flash("hi").unwrap();

        session.clear();

        assert!(session.get("user").is_none());
        assert!(session.get(FLASHES_KEY).is_none());
        assert_eq!(session.created_time(), created);
        assert!(created.is_some());
    }

    #[test]
    fn test_expiration() {
        let mut session = test_session(with_timeouts(900, 1800));
        let now = Utc::now();

        // just created
        assert!(!session.is_expired_at(now));

        // idle timeout wins over a recent creation
        session.set_last_accessed(now - chrono::Duration::seconds(901));
        session.set_created_time(now - chrono::Duration::seconds(901));
        assert!(session.is_expired_at(now));

        // absolute timeout wins over a recent access
        session.set_last_accessed(now - chrono::Duration::seconds(450));
        session.set_created_time(now - chrono::Duration::seconds(1801));
        assert!(session.is_expired_at(now));

        // neither timer has elapsed
        session.set_last_accessed(now - chrono::Duration::seconds(450));
        session.set_created_time(now - chrono::Duration::seconds(1700));
        assert!(!session.is_expired_at(now));
    }

    #[test]
    fn test_idle_timeout_disabled() {
        let mut session = test_session(with_timeouts(0, 1800));
        let now = Utc::now();
        assert!(!session.is_expired_at(now));

        session.set_last_accessed(now - chrono::Duration::seconds(1000));
        session.set_created_time(now - chrono::Duration::seconds(1700));
        assert!(!session.is_expired_at(now));

        session.set_created_time(now - chrono::Duration::seconds(1801));
        assert!(session.is_expired_at(now));
    }

    #[test]
    fn test_absolute_timeout_disabled() {
        let mut session = test_session(with_timeouts(900, 0));
        let now = Utc::now();
        assert!(!session.is_expired_at(now));

        session.set_last_accessed(now - chrono::Duration::seconds(450));
        session.set_created_time(now - chrono::Duration::seconds(5000));
        assert!(!session.is_expired_at(now));

        session.set_last_accessed(now - chrono::Duration::seconds(901));
        assert!(session.is_expired_at(now));
    }

    #[test]
    fn test_both_timeouts_disabled() {
        let mut session = test_session(with_timeouts(0, 0));
        let now = Utc::now();

        session.set_last_accessed(now - chrono::Duration::seconds(1000));
        session.set_created_time(now - chrono::Duration::seconds(2000));
        assert!(!session.is_expired_at(now));
        assert_eq!(session.expiration(), None);
    }

    #[test]
    fn test_expiration_is_earliest_enabled_timer() {
        let mut session = test_session(with_timeouts(900, 1800));
        let now = Utc::now();
        session.set_last_accessed(now);
        session.set_created_time(now - chrono::Duration::seconds(1200));

        assert_eq!(
            session.expiration(),
            Some(now - chrono::Duration::seconds(1200) + chrono::Duration::seconds(1800))
        );
    }

    #[test]
    fn test_timeout_from_secs() {
        assert_eq!(timeout_from_secs(0), None);
        assert_eq!(timeout_from_secs(-5), None);
        assert_eq!(timeout_from_secs(60), Some(Duration::from_secs(60)));
    }
}
