use crate::error::{Error, Result};
use crate::session::backend::SessionBackend;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::{Config, Pool, PoolConfig, Runtime};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

/// Redis backend with connection pooling
///
/// Session records are Redis hashes, principal indexes are Redis sets and
/// expiry is delegated to Redis TTLs set with PEXPIREAT.
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
    command_timeout: Duration,
}

impl RedisBackend {
    /// Create a Redis backend with the default configuration
    ///
    /// Uses Redis URL: redis://localhost:6379
    pub async fn new() -> Result<Self> {
        Self::from_url(
            "redis://localhost:6379",
            10,
            Duration::from_secs(5), // 5 seconds connection timeout
            Duration::from_secs(3), // 3 seconds command timeout
        )
        .await
    }

    /// Create Redis backend with custom URL and settings
    pub async fn from_url(
        redis_url: &str,
        pool_size: usize,
        connection_timeout: Duration,
        command_timeout: Duration,
    ) -> Result<Self> {
        let mut cfg = Config::from_url(redis_url);
        cfg.pool = Some(PoolConfig {
            max_size: pool_size,
            ..Default::default()
        });

        let pool = cfg.create_pool(Some(Runtime::Tokio1))?;
        Self::from_pool(pool, connection_timeout, command_timeout).await
    }

    /// Create Redis backend from an existing pool
    pub async fn from_pool(
        pool: Pool,
        connection_timeout: Duration,
        command_timeout: Duration,
    ) -> Result<Self> {
        // Test the connection with timeout
        let mut conn = tokio::time::timeout(connection_timeout, pool.get())
            .await
            .map_err(|_| Error::timeout("Redis connection timed out"))??;
        tokio::time::timeout(command_timeout, redis::cmd("PING").query_async::<String>(&mut conn))
            .await
            .map_err(|_| Error::timeout("Redis connection test timed out"))?
            .map_err(|e| Error::backend(format!("Redis connection test failed: {}", e)))?;

        Ok(Self {
            pool,
            command_timeout,
        })
    }

    /// Run one Redis command under the command timeout
    async fn timed<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        tokio::time::timeout(self.command_timeout, fut)
            .await
            .map_err(|_| Error::timeout(format!("Redis {} operation timed out", op)))?
            .map_err(Error::from)
    }

    /// Redis reports RENAME of a missing key as a response error
    fn is_no_such_key(err: &Error) -> bool {
        matches!(
            err,
            Error::Redis(e) if e.kind() == redis::ErrorKind::ResponseError
                && e.to_string().to_lowercase().contains("no such key")
        )
    }
}

/// PEXPIREAT argument, rounded up so the key never outlives its deadline early
fn expiry_millis(at: DateTime<Utc>) -> i64 {
    let millis = at.timestamp_millis();
    if at.timestamp_subsec_nanos() % 1_000_000 == 0 {
        millis
    } else {
        millis + 1
    }
}

#[async_trait]
impl SessionBackend for RedisBackend {
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, Vec<u8>>> {
        let mut conn = self.pool.get().await?;
        self.timed("HGETALL", conn.hgetall::<_, HashMap<String, Vec<u8>>>(key))
            .await
    }

    async fn hash_set(&self, key: &str, fields: &[(&str, Vec<u8>)]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.pool.get().await?;
        self.timed("HSET", conn.hset_multiple::<_, _, _, ()>(key, fields))
            .await
    }

    async fn expire_at(&self, key: &str, at: DateTime<Utc>) -> Result<()> {
        let mut conn = self.pool.get().await?;
        self.timed(
            "PEXPIREAT",
            redis::cmd("PEXPIREAT")
                .arg(key)
                .arg(expiry_millis(at))
                .query_async::<i64>(&mut conn),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        self.timed("DEL", conn.del::<_, i64>(key)).await?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        self.timed(
            "RENAME",
            redis::cmd("RENAME")
                .arg(from)
                .arg(to)
                .query_async::<()>(&mut conn),
        )
        .await
        .map_err(|e| {
            if Self::is_no_such_key(&e) {
                Error::key_not_found(from)
            } else {
                e
            }
        })
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        self.timed("SADD", conn.sadd::<_, _, i64>(key, member)).await?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        let mut conn = self.pool.get().await?;
        self.timed("SREM", conn.srem::<_, _, i64>(key, members)).await?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.pool.get().await?;
        let mut members = Vec::new();
        let mut cursor = 0u64;

        // SSCAN keeps a large index from blocking Redis
        loop {
            let (next, batch): (u64, Vec<String>) = self
                .timed(
                    "SSCAN",
                    redis::cmd("SSCAN")
                        .arg(key)
                        .arg(cursor)
                        .arg("COUNT")
                        .arg(100)
                        .query_async(&mut conn),
                )
                .await?;

            members.extend(batch);
            cursor = next;

            if cursor == 0 {
                break;
            }
        }

        Ok(members)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
