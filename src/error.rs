use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the RustF session store
#[derive(Error, Debug)]
pub enum Error {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Misuse of the API, e.g. saving a session without an id
    #[error("Invalid session usage: {0}")]
    Usage(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[cfg(feature = "redis")]
    #[error("Redis pool error: {0}")]
    RedisPool(String),

    // Error with context chain
    #[error("{message}")]
    WithContext {
        message: String,
        #[source]
        source: Box<Error>,
    },
}

// Redis-specific error conversions
#[cfg(feature = "redis")]
impl From<deadpool_redis::ConfigError> for Error {
    fn from(err: deadpool_redis::ConfigError) -> Self {
        Self::RedisPool(format!("Config error: {}", err))
    }
}

#[cfg(feature = "redis")]
impl From<deadpool_redis::CreatePoolError> for Error {
    fn from(err: deadpool_redis::CreatePoolError) -> Self {
        Self::RedisPool(format!("Pool creation error: {}", err))
    }
}

#[cfg(feature = "redis")]
impl From<deadpool_redis::PoolError> for Error {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::RedisPool(format!("Pool error: {}", err))
    }
}

impl Error {
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound(key.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    // Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            message: context.into(),
            source: Box::new(self),
        }
    }

    /// Check if error is a transient backend failure worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Backend(_) | Error::Timeout(_) => true,
            #[cfg(feature = "redis")]
            Error::Redis(e) => e.is_io_error() || e.is_timeout() || e.is_connection_dropped(),
            #[cfg(feature = "redis")]
            Error::RedisPool(_) => true,
            Error::WithContext { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Check if error was caused by calling the API incorrectly
    pub fn is_usage_error(&self) -> bool {
        match self {
            Error::Usage(_) => true,
            Error::WithContext { source, .. } => source.is_usage_error(),
            _ => false,
        }
    }

    /// Get error code for logs and API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Json(_) => "E_JSON",
            Error::Serialization(_) => "E_SERIALIZATION",
            Error::Usage(_) => "E_USAGE",
            Error::KeyNotFound(_) => "E_KEY_NOT_FOUND",
            Error::Backend(_) => "E_BACKEND",
            Error::Timeout(_) => "E_TIMEOUT",
            Error::Config(_) => "E_CONFIG",
            Error::Io(_) => "E_IO",
            Error::Internal(_) => "E_INTERNAL",
            #[cfg(feature = "redis")]
            Error::Redis(_) => "E_REDIS",
            #[cfg(feature = "redis")]
            Error::RedisPool(_) => "E_REDIS_POOL",
            Error::WithContext { source, .. } => source.error_code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_errors_are_not_retryable() {
        let err = Error::usage("session id is empty");
        assert!(err.is_usage_error());
        assert!(!err.is_retryable());
        assert_eq!(err.error_code(), "E_USAGE");
    }

    #[test]
    fn test_context_preserves_classification() {
        let err = Error::timeout("HGETALL timed out").with_context("loading session");
        assert!(err.is_retryable());
        assert!(!err.is_usage_error());
        assert_eq!(err.error_code(), "E_TIMEOUT");
        assert_eq!(err.to_string(), "loading session");
    }

    #[test]
    fn test_serialization_errors_surface_as_non_retryable() {
        let err = Error::serialization("unexpected end of input");
        assert!(!err.is_retryable());
        assert_eq!(err.error_code(), "E_SERIALIZATION");
    }
}
