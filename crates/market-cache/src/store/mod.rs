//! 키-값 저장소 추상화.
//!
//! 캐시 정책은 항목별 만료를 지원하는 단일 공유 저장소 위에서 동작합니다.
//! - [`RedisStore`]: 운영용 Redis 구현
//! - [`MemoryStore`]: 단일 프로세스/테스트용 구현

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// 항목별 TTL을 지원하는 JSON 키-값 저장소.
///
/// `ttl_secs == 0`이면 만료 없이 저장합니다.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// 값을 조회합니다. 없거나 만료되었으면 `None`.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// 값을 저장합니다. 기존 값은 덮어씁니다.
    async fn put(&self, key: &str, value: &Value, ttl_secs: u64) -> Result<()>;

    /// 키를 삭제합니다. 실제로 삭제되었으면 `true`.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// 저장소 상태를 확인합니다.
    async fn ping(&self) -> Result<bool> {
        Ok(true)
    }
}
