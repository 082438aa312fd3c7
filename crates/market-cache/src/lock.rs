//! 키별 동시성 제어.
//!
//! 같은 키에 대한 동시 캐시 미스를 직렬화하여 두 번째 호출자가
//! 첫 번째 호출자의 저장 결과를 신선한 캐시로 받게 합니다.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// 이 개수를 넘으면 사용 중이 아닌 Lock을 정리합니다.
const PRUNE_THRESHOLD: usize = 1024;

/// 키별 Lock 맵.
#[derive(Clone, Default)]
pub struct KeyLocks {
    locks: Arc<RwLock<HashMap<String, Arc<Mutex<()>>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 키의 Lock을 획득합니다. 가드가 drop될 때 해제됩니다.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = self.get_or_create(key).await;
        lock.lock_owned().await
    }

    /// 등록된 Lock 수.
    pub async fn len(&self) -> usize {
        self.locks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 아무도 잡고 있지 않은 Lock을 제거하고 제거 개수를 반환합니다.
    pub async fn prune_idle(&self) -> usize {
        let mut locks = self.locks.write().await;
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    async fn get_or_create(&self, key: &str) -> Arc<Mutex<()>> {
        let locks = self.locks.read().await;
        if let Some(lock) = locks.get(key) {
            return lock.clone();
        }
        let crowded = locks.len() >= PRUNE_THRESHOLD;
        drop(locks);

        if crowded {
            self.prune_idle().await;
        }

        let mut locks = self.locks.write().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let locks = KeyLocks::new();
        let guard = locks.acquire("btc").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("btc").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyLocks::new();
        let _btc = locks.acquire("btc").await;
        let _eth = locks.acquire("eth").await;
        assert_eq!(locks.len().await, 2);
    }

    #[tokio::test]
    async fn test_prune_idle() {
        let locks = KeyLocks::new();
        let held = locks.acquire("held").await;
        drop(locks.acquire("idle").await);

        assert_eq!(locks.prune_idle().await, 1);
        assert_eq!(locks.len().await, 1);
        drop(held);
    }
}
