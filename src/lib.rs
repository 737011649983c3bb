//! RustF Session - distributed server-side sessions for RustF
//!
//! Provides:
//! - Sessions with dirty tracking and flash messages
//! - Idle and absolute expiration mirrored into backend TTLs
//! - Session id rotation on login
//! - A per-principal session index with concurrent-session limits
//! - Redis and in-memory backends

// Enforce error handling best practices
#![cfg_attr(
    not(test),
    warn(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
    )
)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used,))]

pub mod auth;
pub mod config;
pub mod error;
pub mod session;

pub use auth::{Authentication, AuthenticationState};
pub use config::{AppConfig, Environment, SessionConfig, SessionStorageConfig};
pub use error::{Error, Result};
pub use session::backend::memory::MemoryBackend;
#[cfg(feature = "redis")]
pub use session::backend::redis::RedisBackend;
pub use session::backend::SessionBackend;
pub use session::factory::SessionStoreFactory;
pub use session::handler::{
    AuthenticationSuccessHandler, ChangeSessionHandler, CompositeSuccessHandler,
    ConcurrentSessionHandler, DeleteSessionOnLogoutHandler,
};
pub use session::settings::{
    DefaultSettingService, SessionSettingService, SettingReader, StaticSettingReader,
};
pub use session::{SameSite, Session, SessionOptions, SessionStore, Store};
