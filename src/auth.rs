//! Authentication value stored in sessions.
//!
//! The authentication subsystem keeps the current [`Authentication`] under the
//! reserved [`SESSION_KEY_SECURITY`] value key. Session handlers compare the
//! value before and after a login or logout to decide what to do.

use crate::error::Result;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Reserved session value key holding the current authentication
pub const SESSION_KEY_SECURITY: &str = "_security";

/// How far authentication has progressed, ordered from least to most trusted
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum AuthenticationState {
    #[default]
    Anonymous,
    PrincipalKnown,
    Authenticated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Authentication {
    pub principal: Option<String>,
    pub state: AuthenticationState,
    pub permissions: BTreeSet<String>,
    pub details: Map<String, Value>,
}

impl Authentication {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Principal identified but not yet verified, e.g. between MFA steps
    pub fn principal_known(principal: impl Into<String>) -> Self {
        Self {
            principal: Some(principal.into()),
            state: AuthenticationState::PrincipalKnown,
            ..Self::default()
        }
    }

    pub fn authenticated(principal: impl Into<String>) -> Self {
        Self {
            principal: Some(principal.into()),
            state: AuthenticationState::Authenticated,
            ..Self::default()
        }
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    pub fn is_fully_authenticated(&self) -> bool {
        self.state >= AuthenticationState::Authenticated
    }

    /// Authentication recorded in a session, if any
    pub fn from_session(session: &Session) -> Option<Self> {
        session.get_as(SESSION_KEY_SECURITY)
    }

    /// Record this authentication in a session
    pub fn store_in(&self, session: &mut Session) -> Result<()> {
        session.set(SESSION_KEY_SECURITY, self)
    }
}

/// Transition from anything short of authenticated into a fully authenticated state
pub fn is_being_authenticated(from: Option<&Authentication>, to: Option<&Authentication>) -> bool {
    let from_unauthenticated = from.map_or(true, |auth| {
        auth.state < AuthenticationState::Authenticated
    });
    let to_authenticated = to.is_some_and(|auth| auth.state > AuthenticationState::PrincipalKnown);
    from_unauthenticated && to_authenticated
}

/// Transition from any known principal back to anonymous
pub fn is_being_unauthenticated(
    from: Option<&Authentication>,
    to: Option<&Authentication>,
) -> bool {
    let from_authenticated = from.is_some_and(|auth| auth.state > AuthenticationState::Anonymous);
    let to_unauthenticated =
        to.map_or(true, |auth| auth.state <= AuthenticationState::Anonymous);
    from_authenticated && to_unauthenticated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_ordering() {
        assert!(AuthenticationState::Anonymous < AuthenticationState::PrincipalKnown);
        assert!(AuthenticationState::PrincipalKnown < AuthenticationState::Authenticated);
    }

    #[test]
    fn test_is_being_authenticated() {
        let anonymous = Authentication::anonymous();
        let known = Authentication::principal_known("alice");
        let authenticated = Authentication::authenticated("alice");

        assert!(is_being_authenticated(None, Some(&authenticated)));
        assert!(is_being_authenticated(Some(&anonymous), Some(&authenticated)));
        assert!(is_being_authenticated(Some(&known), Some(&authenticated)));

        assert!(!is_being_authenticated(Some(&anonymous), Some(&known)));
        assert!(!is_being_authenticated(Some(&authenticated), Some(&authenticated)));
        assert!(!is_being_authenticated(Some(&anonymous), None));
    }

    #[test]
    fn test_is_being_unauthenticated() {
        let anonymous = Authentication::anonymous();
        let known = Authentication::principal_known("alice");
        let authenticated = Authentication::authenticated("alice");

        assert!(is_being_unauthenticated(Some(&authenticated), None));
        assert!(is_being_unauthenticated(Some(&authenticated), Some(&anonymous)));
        assert!(is_being_unauthenticated(Some(&known), Some(&anonymous)));

        assert!(!is_being_unauthenticated(None, Some(&anonymous)));
        assert!(!is_being_unauthenticated(Some(&anonymous), None));
        assert!(!is_being_unauthenticated(Some(&known), Some(&authenticated)));
    }

    #[test]
    fn test_serde_defaults() {
        let auth: Authentication = serde_json::from_str(r#"{"principal":"bob"}"#).unwrap();
        assert_eq!(auth.principal.as_deref(), Some("bob"));
        assert_eq!(auth.state, AuthenticationState::Anonymous);
        assert!(auth.permissions.is_empty());

        let full = Authentication::authenticated("bob")
            .with_permission("ADMIN")
            .with_detail("tenant", Value::from("t1"));
        let json = serde_json::to_value(&full).unwrap();
        let back: Authentication = serde_json::from_value(json).unwrap();
        assert_eq!(back, full);
        assert!(back.is_fully_authenticated());
    }
}
