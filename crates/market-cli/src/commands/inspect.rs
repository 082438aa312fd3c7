//! 캐시 항목 조회/삭제 명령.

use anyhow::{Context, Result};
use market_cache::{ResilientCache, SeriesMeta};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

/// `probe` 결과.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub key: String,
    pub max_age_secs: u64,
    pub cached: bool,
    pub fresh: bool,
}

/// 제공자 호출 없이 키의 신선도를 확인합니다.
pub async fn probe(cache: &ResilientCache, key: &str, max_age_secs: u64) -> ProbeReport {
    let cached = cache.get_stale(key).await.is_some();
    let fresh = cached && cache.is_fresh(key, max_age_secs).await;

    ProbeReport {
        key: key.to_string(),
        max_age_secs,
        cached,
        fresh,
    }
}

/// 나이와 무관하게 캐시된 데이터를 조회합니다.
pub async fn stale(cache: &ResilientCache, key: &str) -> Option<Value> {
    cache.get_stale(key).await
}

/// 캐시 항목과 시계열 메타데이터를 삭제합니다.
pub async fn forget(cache: &ResilientCache, key: &str) -> Result<()> {
    cache
        .forget(key)
        .await
        .with_context(|| format!("캐시 삭제 실패: {}", key))?;
    info!(key, "캐시 항목 삭제 완료");
    Ok(())
}

/// 과거 시계열 메타데이터를 조회합니다.
pub async fn series(cache: &ResilientCache, key: &str) -> Result<Option<SeriesMeta>> {
    cache
        .series_state(key)
        .await
        .with_context(|| format!("시계열 메타데이터 조회 실패: {}", key))
}
