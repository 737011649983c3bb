//! Session reactions to authentication state changes.
//!
//! The authentication subsystem invokes these handlers after it has replaced
//! the current [`Authentication`]. Each handler returns the `Set-Cookie` values
//! the response has to carry.

use crate::auth::{is_being_authenticated, is_being_unauthenticated, Authentication};
use crate::error::{Error, Result};
use crate::session::cookie::{expired_cookie, session_cookie};
use crate::session::settings::SessionSettingService;
use crate::session::{Session, Store};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait AuthenticationSuccessHandler: Send + Sync {
    /// React to the transition `from` -> `to`, returning cookies to emit
    async fn handle_authentication_success(
        &self,
        session: &mut Session,
        from: Option<&Authentication>,
        to: Option<&Authentication>,
    ) -> Result<Vec<String>>;
}

/// Rotates the session id on login to defeat session fixation
///
/// A session created during this request has an id nobody else could have
/// planted, so it is left alone. Rotation failures abort the login.
#[derive(Debug, Clone, Default)]
pub struct ChangeSessionHandler;

#[async_trait]
impl AuthenticationSuccessHandler for ChangeSessionHandler {
    async fn handle_authentication_success(
        &self,
        session: &mut Session,
        from: Option<&Authentication>,
        to: Option<&Authentication>,
    ) -> Result<Vec<String>> {
        if !is_being_authenticated(from, to) || session.is_new() {
            return Ok(Vec::new());
        }

        session
            .change_id()
            .await
            .map_err(|e| Error::internal(format!("Unable to change session id: {}", e)))?;

        Ok(vec![session_cookie(
            session.name(),
            session.id(),
            session.options(),
        )])
    }
}

/// Caps the number of live sessions a principal may hold
///
/// The session performing the login is always kept. Older sessions beyond the
/// limit are evicted oldest first.
#[derive(Clone)]
pub struct ConcurrentSessionHandler {
    store: Arc<dyn Store>,
    settings: Arc<dyn SessionSettingService>,
}

impl ConcurrentSessionHandler {
    pub fn new(store: Arc<dyn Store>, settings: Arc<dyn SessionSettingService>) -> Self {
        Self { store, settings }
    }

    async fn evict(&self, principal: &str, victim: &Session) {
        if let Err(e) = self.store.delete(victim).await {
            log::warn!(
                "Failed to evict session {} of {}: {}",
                victim.id(),
                principal,
                e
            );
            return;
        }
        // Covers victims whose authentication value does not name the principal
        if let Err(e) = self.store.remove_from_principal_index(principal, victim).await {
            log::warn!(
                "Failed to remove evicted session {} from index of {}: {}",
                victim.id(),
                principal,
                e
            );
        }
        log::info!(
            "Evicted session {} of {}: concurrent session limit reached",
            victim.id(),
            principal
        );
    }
}

/// Order in which surplus sessions are evicted: oldest first, ties by id
fn eviction_order(a: &Session, b: &Session) -> std::cmp::Ordering {
    a.created_time()
        .cmp(&b.created_time())
        .then_with(|| a.id().cmp(b.id()))
}

#[async_trait]
impl AuthenticationSuccessHandler for ConcurrentSessionHandler {
    async fn handle_authentication_success(
        &self,
        session: &mut Session,
        from: Option<&Authentication>,
        to: Option<&Authentication>,
    ) -> Result<Vec<String>> {
        if !is_being_authenticated(from, to) {
            return Ok(Vec::new());
        }

        let principal = match to.and_then(|auth| auth.principal.as_deref()) {
            Some(principal) if !principal.is_empty() => principal,
            _ => return Ok(Vec::new()),
        };

        // The index must never point at a record that was not written yet
        if session.is_new() {
            self.store.save(session).await?;
        }
        self.store.add_to_principal_index(principal, session).await?;

        let max = self.settings.max_concurrent_sessions().await;
        if max <= 0 {
            return Ok(Vec::new());
        }

        let sessions = self
            .store
            .find_by_principal_name(principal, session.name())
            .await?;
        if sessions.len() as i64 <= max {
            return Ok(Vec::new());
        }

        let mut others: Vec<Session> = sessions
            .into_iter()
            .filter(|s| s.id() != session.id())
            .collect();
        others.sort_by(eviction_order);

        let keep = usize::try_from(max - 1).unwrap_or(usize::MAX);
        let surplus = others.len().saturating_sub(keep);
        for victim in others.iter().take(surplus) {
            self.evict(principal, victim).await;
        }

        Ok(Vec::new())
    }
}

/// Destroys the session when its principal logs out
#[derive(Clone)]
pub struct DeleteSessionOnLogoutHandler {
    store: Arc<dyn Store>,
}

impl DeleteSessionOnLogoutHandler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuthenticationSuccessHandler for DeleteSessionOnLogoutHandler {
    async fn handle_authentication_success(
        &self,
        session: &mut Session,
        from: Option<&Authentication>,
        to: Option<&Authentication>,
    ) -> Result<Vec<String>> {
        if !is_being_unauthenticated(from, to) {
            return Ok(Vec::new());
        }

        self.store.delete(session).await?;

        // The authentication value may already be gone from the session
        if let Some(principal) = from.and_then(|auth| auth.principal.as_deref()) {
            if let Err(e) = self
                .store
                .remove_from_principal_index(principal, session)
                .await
            {
                log::warn!(
                    "Failed to remove session {} from index of {}: {}",
                    session.id(),
                    principal,
                    e
                );
            }
        }

        Ok(vec![expired_cookie(session.name(), session.options())])
    }
}

/// Runs handlers in registration order, stopping at the first failure
#[derive(Clone, Default)]
pub struct CompositeSuccessHandler {
    handlers: Vec<Arc<dyn AuthenticationSuccessHandler>>,
}

impl CompositeSuccessHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rotation, then the concurrent session limit, then logout cleanup
    pub fn standard(store: Arc<dyn Store>, settings: Arc<dyn SessionSettingService>) -> Self {
        Self::new()
            .add(Arc::new(ChangeSessionHandler))
            .add(Arc::new(ConcurrentSessionHandler::new(store.clone(), settings)))
            .add(Arc::new(DeleteSessionOnLogoutHandler::new(store)))
    }

    pub fn add(mut self, handler: Arc<dyn AuthenticationSuccessHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[async_trait]
impl AuthenticationSuccessHandler for CompositeSuccessHandler {
    async fn handle_authentication_success(
        &self,
        session: &mut Session,
        from: Option<&Authentication>,
        to: Option<&Authentication>,
    ) -> Result<Vec<String>> {
        let mut cookies = Vec::new();
        for handler in &self.handlers {
            cookies.extend(
                handler
                    .handle_authentication_success(session, from, to)
                    .await?,
            );
        }
        Ok(cookies)
    }
}
