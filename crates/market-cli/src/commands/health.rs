//! 저장소 상태 점검 및 통계 조회.

use anyhow::{Context, Result};
use market_cache::{ResilientCache, StatsSnapshot};
use serde::Serialize;
use std::time::Instant;
use tracing::warn;

/// 상태 점검 결과.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub store_reachable: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.store_reachable
    }
}

/// 저장소에 PING을 보내 응답 여부와 지연 시간을 확인합니다.
pub async fn check(cache: &ResilientCache) -> HealthReport {
    let started = Instant::now();
    let result = cache.store().ping().await;
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match result {
        Ok(reachable) => HealthReport {
            store_reachable: reachable,
            latency_ms,
            error: None,
        },
        Err(e) => {
            warn!(error = %e, "저장소 PING 실패");
            HealthReport {
                store_reachable: false,
                latency_ms,
                error: Some(e.to_string()),
            }
        }
    }
}

/// 게시된 통계 스냅샷을 조회합니다.
pub async fn published_stats(cache: &ResilientCache) -> Result<Option<StatsSnapshot>> {
    cache
        .published_stats()
        .await
        .context("통계 스냅샷 조회 실패")
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_cache::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_memory_store_is_healthy() {
        let cache = ResilientCache::new(Arc::new(MemoryStore::new()));
        let report = check(&cache).await;
        assert!(report.is_healthy());
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn test_published_stats() {
        let cache = ResilientCache::new(Arc::new(MemoryStore::new()));
        assert!(published_stats(&cache).await.unwrap().is_none());

        cache.remember("fx:eur", 60, || async { Ok(json!(1.08)) }).await;
        cache.publish_stats().await.unwrap();

        let snapshot = published_stats(&cache).await.unwrap().unwrap();
        assert_eq!(snapshot.total_requests, 1);
        assert_eq!(snapshot.cache_hits, 0);
    }
}
