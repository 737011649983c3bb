use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Global setting holding the maximum number of sessions per principal
pub const SETTING_MAX_CONCURRENT_SESSIONS: &str = "MAX_CONCURRENT_SESSIONS";

/// Source of global settings that can change while the process runs
#[async_trait]
pub trait SettingReader: Send + Sync {
    /// Read an integer setting; `Ok(None)` when it is not set
    async fn read_secs(&self, key: &str) -> Result<Option<i64>>;
}

/// In-process setting source, updatable at runtime
#[derive(Debug, Clone, Default)]
pub struct StaticSettingReader {
    values: Arc<DashMap<String, i64>>,
}

impl StaticSettingReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: i64) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) {
        self.values.remove(key);
    }
}

#[async_trait]
impl SettingReader for StaticSettingReader {
    async fn read_secs(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.values.get(key).map(|v| *v))
    }
}

/// Resolves session limits at call time
#[async_trait]
pub trait SessionSettingService: Send + Sync {
    /// Maximum live sessions per principal; zero or less means unlimited
    async fn max_concurrent_sessions(&self) -> i64;
}

/// Reads limits from an optional [`SettingReader`], falling back to configuration
#[derive(Clone)]
pub struct DefaultSettingService {
    max_concurrent_sessions: i64,
    reader: Option<Arc<dyn SettingReader>>,
}

impl DefaultSettingService {
    pub fn new(max_concurrent_sessions: i64) -> Self {
        Self {
            max_concurrent_sessions,
            reader: None,
        }
    }

    pub fn with_reader(mut self, reader: Arc<dyn SettingReader>) -> Self {
        self.reader = Some(reader);
        self
    }
}

#[async_trait]
impl SessionSettingService for DefaultSettingService {
    async fn max_concurrent_sessions(&self) -> i64 {
        if let Some(reader) = &self.reader {
            match reader.read_secs(SETTING_MAX_CONCURRENT_SESSIONS).await {
                Ok(Some(value)) => return value,
                Ok(None) => {}
                Err(e) => log::warn!(
                    "Failed to read {}, using configured value: {}",
                    SETTING_MAX_CONCURRENT_SESSIONS,
                    e
                ),
            }
        }
        self.max_concurrent_sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct FailingReader;

    #[async_trait]
    impl SettingReader for FailingReader {
        async fn read_secs(&self, _key: &str) -> Result<Option<i64>> {
            Err(Error::backend("settings unavailable"))
        }
    }

    #[test]
    fn test_configured_value_without_reader() {
        let service = DefaultSettingService::new(3);
        assert_eq!(tokio_test::block_on(service.max_concurrent_sessions()), 3);
    }

    #[tokio::test]
    async fn test_reader_overrides_configuration_at_runtime() {
        let reader = Arc::new(StaticSettingReader::new());
        let service = DefaultSettingService::new(3).with_reader(reader.clone());

        assert_eq!(service.max_concurrent_sessions().await, 3);

        reader.set(SETTING_MAX_CONCURRENT_SESSIONS, 1);
        assert_eq!(service.max_concurrent_sessions().await, 1);

        reader.remove(SETTING_MAX_CONCURRENT_SESSIONS);
        assert_eq!(service.max_concurrent_sessions().await, 3);
    }

    #[tokio::test]
    async fn test_reader_failure_falls_back() {
        let service = DefaultSettingService::new(2).with_reader(Arc::new(FailingReader));
        assert_eq!(service.max_concurrent_sessions().await, 2);
    }
}
