use crate::config;
use crate::session::{timeout_from_secs, SameSite, SessionOptions};

/// Convert configured session settings into store options
impl From<&config::SessionConfig> for SessionOptions {
    fn from(cfg: &config::SessionConfig) -> Self {
        Self {
            path: cfg.path.clone(),
            domain: cfg.domain.clone().filter(|d| !d.is_empty()),
            max_age: cfg.max_age,
            secure: cfg.secure,
            http_only: cfg.http_only,
            same_site: parse_same_site(&cfg.same_site),
            idle_timeout: timeout_from_secs(cfg.idle_timeout),
            absolute_timeout: timeout_from_secs(cfg.absolute_timeout),
        }
    }
}

/// Parse SameSite string from config
pub fn parse_same_site(value: &str) -> SameSite {
    match value.to_lowercase().as_str() {
        "strict" => SameSite::Strict,
        "lax" => SameSite::Lax,
        "none" => SameSite::None,
        _ => {
            log::warn!("Invalid SameSite value '{}', defaulting to Lax", value);
            SameSite::Lax
        }
    }
}
