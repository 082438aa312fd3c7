//! Redis 저장소 구현.
//!
//! 값은 JSON 문자열로 저장하며 TTL은 `SET ... EX`로 설정합니다.

use async_trait::async_trait;
use market_core::RedisSettings;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::KeyedStore;
use crate::error::{CacheError, Result};

/// Redis 연결 래퍼.
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
}

impl RedisStore {
    /// 새로운 Redis 연결을 생성합니다.
    pub async fn connect(settings: &RedisSettings) -> Result<Self> {
        info!("Connecting to Redis...");

        let client = Client::open(settings.url.as_str())
            .map_err(|e| CacheError::ConnectionError(e.to_string()))?;

        let timeout = Duration::from_secs(settings.connection_timeout_secs.max(1));
        let connection = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| {
                CacheError::Timeout(format!(
                    "Redis 연결 {}초 초과",
                    settings.connection_timeout_secs
                ))
            })?
            .map_err(|e| CacheError::ConnectionError(e.to_string()))?;

        info!("Redis connection established");

        Ok(Self { connection })
    }
}

#[async_trait]
impl KeyedStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(key).await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, value))]
    async fn put(&self, key: &str, value: &Value, ttl_secs: u64) -> Result<()> {
        let json = serde_json::to_string(value)?;
        let mut conn = self.connection.clone();

        if ttl_secs == 0 {
            let _: () = conn.set(key, json).await?;
        } else {
            let _: () = conn.set_ex(key, json, ttl_secs).await?;
        }
        debug!(key, ttl_secs, "Redis 저장 완료");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection.clone();
        let deleted: i64 = conn.del(key).await?;
        Ok(deleted > 0)
    }

    async fn ping(&self) -> Result<bool> {
        let mut conn = self.connection.clone();
        let result: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(result == "PONG")
    }
}
