use std::future::Future;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError};
use serde_json::Value;
use tokio::time::timeout;

use crate::backend::{effective_ttl, BackendKind, CacheBackend, CacheError};

/// Redis-backed cache for production deployments.
///
/// Values are stored as JSON strings; TTLs use Redis' native expiring writes
/// with millisecond precision. Every command is bounded by the operation
/// timeout, and every failure (connection, protocol, timeout, bad payload)
/// is logged and reported through the [`CacheBackend`] failure contract.
pub struct RedisBackend {
    conn: RwLock<Option<ConnectionManager>>,
    op_timeout: Duration,
}

impl RedisBackend {
    /// Connect and verify the server answers `PING` within `connect_timeout`.
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
        op_timeout: Duration,
    ) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;

        let mut conn = timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout(connect_timeout))??;

        let pong: String = timeout(connect_timeout, redis::cmd("PING").query_async(&mut conn))
            .await
            .map_err(|_| CacheError::Timeout(connect_timeout))??;
        tracing::debug!(reply = %pong, "redis cache backend reachable");

        Ok(Self {
            conn: RwLock::new(Some(conn)),
            op_timeout,
        })
    }

    fn connection(&self) -> Result<ConnectionManager, CacheError> {
        self.conn
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(CacheError::Closed)
    }

    /// Run one command on a clone of the shared connection, bounded by the
    /// operation timeout.
    async fn run<T, F, Fut>(&self, op: F) -> Result<T, CacheError>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = Result<T, RedisError>>,
    {
        let conn = self.connection()?;
        match timeout(self.op_timeout, op(conn)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CacheError::Timeout(self.op_timeout)),
        }
    }

    async fn try_get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let raw: Option<String> = self
            .run(|mut conn| async move {
                let raw: Option<String> = conn.get(key).await?;
                Ok::<_, RedisError>(raw)
            })
            .await?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn try_set(
        &self,
        key: &str,
        value: &Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_string(value)?;

        self.run(|mut conn| async move {
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(payload);
            if let Some(ttl) = effective_ttl(ttl) {
                let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
                cmd.arg("PX").arg(millis);
            }
            let _: () = cmd.query_async(&mut conn).await?;
            Ok::<_, RedisError>(())
        })
        .await
    }

    async fn try_delete(&self, key: &str) -> Result<(), CacheError> {
        self.run(|mut conn| async move {
            let _: () = conn.del(key).await?;
            Ok::<_, RedisError>(())
        })
        .await
    }

    async fn try_clear(&self) -> Result<(), CacheError> {
        self.run(|mut conn| async move {
            let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
            Ok::<_, RedisError>(())
        })
        .await
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Option<Value> {
        match self.try_get(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "redis get error");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> bool {
        match self.try_set(key, &value, ttl).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "redis set error");
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        match self.try_delete(key).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "redis delete error");
                false
            }
        }
    }

    async fn clear(&self) -> bool {
        match self.try_clear().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "redis clear error");
                false
            }
        }
    }

    async fn close(&self) {
        let previous = self
            .conn
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            tracing::info!("redis cache connection closed");
        }
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }
}
