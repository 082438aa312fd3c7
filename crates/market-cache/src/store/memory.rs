//! 프로세스 내 저장소.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::KeyedStore;
use crate::clock::{Clock, SystemClock};
use crate::error::Result;

#[derive(Debug, Clone)]
struct StoredValue {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

/// 만료 시각을 주입된 시계로 판단하는 `HashMap` 기반 저장소.
///
/// 만료된 항목은 조회 시 보이지 않으며, [`MemoryStore::purge_expired`]로 정리합니다.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoredValue>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// 만료된 항목을 제거하고 제거 개수를 반환합니다.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, stored| !is_expired(stored, now));
        before - entries.len()
    }

    /// 만료되지 않은 항목 수.
    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries.values().filter(|s| !is_expired(s, now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn is_expired(stored: &StoredValue, now: DateTime<Utc>) -> bool {
    stored.expires_at.is_some_and(|at| at <= now)
}

#[async_trait]
impl KeyedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|stored| !is_expired(stored, now))
            .map(|stored| stored.value.clone()))
    }

    async fn put(&self, key: &str, value: &Value, ttl_secs: u64) -> Result<()> {
        // 표현 범위를 넘는 TTL은 만료 없음으로 취급
        let expires_at = if ttl_secs == 0 {
            None
        } else {
            i64::try_from(ttl_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .and_then(|ttl| self.clock.now().checked_add_signed(ttl))
        };

        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            StoredValue {
                value: value.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        Ok(entries
            .remove(key)
            .is_some_and(|stored| !is_expired(&stored, now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use serde_json::json;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryStore::new();
        store.put("ticker:btc", &json!({"price": 1}), 60).await.unwrap();

        assert_eq!(store.get("ticker:btc").await.unwrap(), Some(json!({"price": 1})));
        assert!(store.delete("ticker:btc").await.unwrap());
        assert!(!store.delete("ticker:btc").await.unwrap());
        assert_eq!(store.get("ticker:btc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entry_expires_with_clock() {
        let clock = clock();
        let store = MemoryStore::with_clock(clock.clone());
        store.put("k", &json!(1), 10).await.unwrap();

        clock.advance(Duration::seconds(9));
        assert!(store.get("k").await.unwrap().is_some());

        clock.advance(Duration::seconds(1));
        assert!(store.get("k").await.unwrap().is_none());
        assert_eq!(store.purge_expired().await, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_zero_ttl_never_expires() {
        let clock = clock();
        let store = MemoryStore::with_clock(clock.clone());
        store.put("k", &json!("v"), 0).await.unwrap();

        clock.advance(Duration::days(3650));
        assert_eq!(store.get("k").await.unwrap(), Some(json!("v")));
    }
}
