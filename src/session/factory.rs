use crate::config::{SessionConfig, SessionStorageConfig};
use crate::error::Result;
use crate::session::backend::memory::MemoryBackend;
use crate::session::backend::SessionBackend;
use crate::session::settings::{DefaultSettingService, SettingReader};
use crate::session::{SessionOptions, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Builds session backends and stores from configuration
pub struct SessionStoreFactory;

impl SessionStoreFactory {
    /// Create the storage backend named by the configuration
    ///
    /// Must run inside a Tokio runtime: the memory backend spawns its purge
    /// task and the Redis backend checks connectivity. The handle of the purge
    /// task, if one was started, is returned so the caller can abort it.
    pub async fn create_backend(
        config: &SessionStorageConfig,
    ) -> Result<(Arc<dyn SessionBackend>, Option<JoinHandle<()>>)> {
        match config {
            SessionStorageConfig::Memory { purge_interval } => {
                log::info!("Using in-memory session backend");
                if *purge_interval > 0 {
                    let (backend, handle) =
                        MemoryBackend::with_purge_interval(Duration::from_secs(*purge_interval));
                    Ok((Arc::new(backend), Some(handle)))
                } else {
                    Ok((Arc::new(MemoryBackend::new()), None))
                }
            }

            #[cfg(feature = "redis")]
            SessionStorageConfig::Redis {
                url,
                pool_size,
                connection_timeout,
                command_timeout,
            } => {
                use crate::session::backend::redis::RedisBackend;
                let backend = RedisBackend::from_url(
                    url,
                    *pool_size,
                    Duration::from_millis(*connection_timeout),
                    Duration::from_millis(*command_timeout),
                )
                .await?;
                log::info!("Using Redis session backend at {}", url);
                Ok((Arc::new(backend), None))
            }

            #[cfg(not(feature = "redis"))]
            SessionStorageConfig::Redis { .. } => Err(crate::error::Error::config(
                "Redis session storage requires the 'redis' feature",
            )),
        }
    }

    /// Create a store with options, namespace and deadline taken from configuration
    ///
    /// Also returns the backend's purge task handle, see [`Self::create_backend`].
    pub async fn create_store(
        config: &SessionConfig,
    ) -> Result<(SessionStore, Option<JoinHandle<()>>)> {
        let (backend, purge_task) = Self::create_backend(&config.storage).await?;
        Ok((Self::store_with_backend(config, backend), purge_task))
    }

    /// Create a store over an existing backend
    pub fn store_with_backend(
        config: &SessionConfig,
        backend: Arc<dyn SessionBackend>,
    ) -> SessionStore {
        let mut store = SessionStore::with_options(backend, SessionOptions::from(config))
            .namespace(config.namespace.clone());
        if let Some(ms) = config.command_timeout_ms.filter(|ms| *ms > 0) {
            store = store.command_timeout(Duration::from_millis(ms));
        }
        store
    }

    /// Settings service using the configured session limit as fallback
    pub fn settings_service(
        config: &SessionConfig,
        reader: Option<Arc<dyn SettingReader>>,
    ) -> DefaultSettingService {
        let service = DefaultSettingService::new(config.max_concurrent_sessions);
        match reader {
            Some(reader) => service.with_reader(reader),
            None => service,
        }
    }
}
