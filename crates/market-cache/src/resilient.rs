//! 장애 내성 조회 오케스트레이터.
//!
//! 제공자 호출(클로저)을 신선도 기반 캐싱과 단계적 대체로 감쌉니다.
//!
//! # 동작 흐름
//!
//! ```text
//! remember(key, window, primary, fallback?)
//!         │
//!   ┌─────▼─────┐   YES
//!   │ 신선한 캐시? ├────────► source=cache (네트워크 호출 없음)
//!   └─────┬─────┘
//!         │ NO
//!   ┌─────▼─────┐   성공
//!   │  primary  ├────────► 저장 → source=primary
//!   └─────┬─────┘
//!         │ 실패/빈 응답
//!   ┌─────▼─────┐   성공
//!   │ fallback  ├────────► 저장 → source=fallback
//!   └─────┬─────┘
//!         │ 실패/없음
//!   ┌─────▼─────┐   YES
//!   │ 기존 캐시? ├────────► source=stale_cache
//!   └─────┬─────┘
//!         │ NO
//!         ▼
//!    source=none (data: [])
//! ```
//!
//! 제공자 실패는 절대 호출자에게 전파되지 않습니다.

use chrono::{DateTime, Utc};
use market_core::CacheSettings;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::{Future, Ready};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::envelope::{has_data, DataSource, Envelope};
use crate::error::{FetchResult, Result};
use crate::freshness::{self, Freshness};
use crate::lock::KeyLocks;
use crate::stats::{OutcomeStats, StatsSnapshot};
use crate::store::KeyedStore;

/// 통계 스냅샷을 게시하는 키.
pub const STATS_KEY: &str = "api_stats";

type NoFallback = fn() -> Ready<FetchResult<Value>>;

/// 저장소에 기록되는 캐시 항목.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub payload: Value,
    pub stored_at: DateTime<Utc>,
}

/// 장애 내성 캐시.
///
/// 저장소와 통계는 `Arc`로 공유되므로 복제 비용이 낮습니다.
#[derive(Clone)]
pub struct ResilientCache {
    pub(crate) store: Arc<dyn KeyedStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) stats: Arc<OutcomeStats>,
    pub(crate) locks: Option<KeyLocks>,
    pub(crate) retention_secs: u64,
    pub(crate) historical_ttl_secs: u64,
    key_prefix: String,
}

/// [`ResilientCache`] 빌더.
pub struct ResilientCacheBuilder {
    store: Arc<dyn KeyedStore>,
    clock: Option<Arc<dyn Clock>>,
    stats: Option<Arc<OutcomeStats>>,
    settings: CacheSettings,
}

impl ResilientCacheBuilder {
    /// 시간 소스 지정 (기본: 시스템 시계).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// 외부에서 만든 통계 수집기 주입. 지정하지 않으면 빌더의 시계로 새로 만듭니다.
    pub fn stats(mut self, stats: Arc<OutcomeStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// 캐시 정책 설정 적용.
    pub fn settings(mut self, settings: CacheSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 같은 키의 동시 캐시 미스 직렬화 여부.
    pub fn coalesce_misses(mut self, enabled: bool) -> Self {
        self.settings.coalesce_misses = enabled;
        self
    }

    pub fn build(self) -> ResilientCache {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let stats = self.stats.unwrap_or_else(|| {
            Arc::new(OutcomeStats::new(
                self.settings.stats_window_secs,
                clock.clone(),
            ))
        });

        ResilientCache {
            store: self.store,
            clock,
            stats,
            locks: self.settings.coalesce_misses.then(KeyLocks::new),
            retention_secs: self.settings.retention_secs,
            historical_ttl_secs: self.settings.historical_ttl_secs,
            key_prefix: self.settings.key_prefix,
        }
    }
}

impl ResilientCache {
    /// 기본 설정으로 생성합니다.
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self::builder(store).build()
    }

    pub fn builder(store: Arc<dyn KeyedStore>) -> ResilientCacheBuilder {
        ResilientCacheBuilder {
            store,
            clock: None,
            stats: None,
            settings: CacheSettings::default(),
        }
    }

    pub fn stats(&self) -> &Arc<OutcomeStats> {
        &self.stats
    }

    pub fn store(&self) -> &Arc<dyn KeyedStore> {
        &self.store
    }

    /// 신선하면 캐시, 아니면 1차 제공자 → 오래된 캐시 순으로 응답합니다.
    ///
    /// `window_secs`가 0이면 1초로 취급합니다.
    pub async fn remember<P, PF>(&self, key: &str, window_secs: u64, primary: P) -> Envelope
    where
        P: FnOnce() -> PF,
        PF: Future<Output = FetchResult<Value>>,
    {
        self.remember_inner(key, window_secs, primary, None::<NoFallback>)
            .await
    }

    /// [`remember`](Self::remember)에 대체 제공자 단계를 추가한 버전.
    pub async fn remember_with_fallback<P, PF, F, FF>(
        &self,
        key: &str,
        window_secs: u64,
        primary: P,
        fallback: F,
    ) -> Envelope
    where
        P: FnOnce() -> PF,
        PF: Future<Output = FetchResult<Value>>,
        F: FnOnce() -> FF,
        FF: Future<Output = FetchResult<Value>>,
    {
        self.remember_inner(key, window_secs, primary, Some(fallback))
            .await
    }

    #[instrument(name = "remember", skip(self, primary, fallback), fields(source = tracing::field::Empty))]
    async fn remember_inner<P, PF, F, FF>(
        &self,
        key: &str,
        window_secs: u64,
        primary: P,
        fallback: Option<F>,
    ) -> Envelope
    where
        P: FnOnce() -> PF,
        PF: Future<Output = FetchResult<Value>>,
        F: FnOnce() -> FF,
        FF: Future<Output = FetchResult<Value>>,
    {
        let key = self.namespaced(key);
        let window_secs = freshness::effective_window(window_secs);
        let _guard = self.lock_key(&key).await;

        self.stats.record_request();
        let now = self.clock.now();
        let cached = self.read_entry_lenient(&key).await;

        if let Some(entry) = &cached {
            if freshness::classify(Some(entry.stored_at), now, window_secs) == Freshness::Fresh {
                self.stats.record_cache_hit();
                debug!(key = %key, "캐시 적중");
                return self.finish(Envelope::cached(
                    entry.payload.clone(),
                    entry.stored_at,
                    now,
                    DataSource::Cache,
                    window_secs,
                ));
            }
        }

        if let Some(data) = self.try_fetch(&key, DataSource::Primary, primary).await {
            return self.finish(self.persist_fetched(&key, data, DataSource::Primary).await);
        }

        if let Some(fallback) = fallback {
            if let Some(data) = self.try_fetch(&key, DataSource::Fallback, fallback).await {
                return self.finish(self.persist_fetched(&key, data, DataSource::Fallback).await);
            }
        }

        match cached {
            Some(entry) => {
                warn!(
                    key = %key,
                    stored_at = %entry.stored_at,
                    "모든 제공자 실패, 오래된 캐시 사용"
                );
                self.finish(Envelope::cached(
                    entry.payload,
                    entry.stored_at,
                    now,
                    DataSource::StaleCache,
                    window_secs,
                ))
            }
            None => {
                warn!(key = %key, "모든 제공자 실패, 캐시 없음");
                self.finish(Envelope::empty(now))
            }
        }
    }

    /// 신선도와 무관하게 기존 항목이 있으면 그대로 반환합니다.
    ///
    /// 항목이 전혀 없을 때만 제공자를 호출합니다. 백그라운드 갱신기가
    /// [`store_with_metadata`](Self::store_with_metadata)로 채우는 고비용 제공자용입니다.
    #[instrument(skip(self, primary), fields(source = tracing::field::Empty))]
    pub async fn remember_without_freshness<P, PF>(&self, key: &str, primary: P) -> Envelope
    where
        P: FnOnce() -> PF,
        PF: Future<Output = FetchResult<Value>>,
    {
        let key = self.namespaced(key);
        let _guard = self.lock_key(&key).await;

        self.stats.record_request();
        let now = self.clock.now();

        if let Some(entry) = self.read_entry_lenient(&key).await {
            self.stats.record_cache_hit();
            debug!(key = %key, "캐시 적중 (신선도 검사 없음)");
            return self.finish(Envelope::trusted(
                entry.payload,
                entry.stored_at,
                now,
                DataSource::Cache,
            ));
        }

        if let Some(data) = self.try_fetch(&key, DataSource::Primary, primary).await {
            return self.finish(self.persist_fetched(&key, data, DataSource::Primary).await);
        }

        warn!(key = %key, "제공자 실패, 캐시 없음");
        self.finish(Envelope::empty(now))
    }

    /// 데이터를 현재 시각으로 직접 저장합니다 (백그라운드 갱신기용).
    pub async fn store_with_metadata(&self, key: &str, data: Value) -> Result<()> {
        let key = self.namespaced(key);
        self.write_entry(&key, data).await
    }

    /// 캐시 항목과 (있다면) 과거 시계열 메타데이터를 삭제합니다.
    pub async fn forget(&self, key: &str) -> Result<()> {
        let key = self.namespaced(key);
        let removed = self.store.delete(&key).await?;
        let removed_meta = self.store.delete(&meta_key(&key)).await?;
        info!(key = %key, removed, removed_meta, "캐시 삭제");
        Ok(())
    }

    /// 제공자 호출 없이 항목이 `max_age_secs` 이내인지 확인합니다. 0은 1초로 취급합니다.
    pub async fn is_fresh(&self, key: &str, max_age_secs: u64) -> bool {
        let key = self.namespaced(key);
        let stored_at = self.read_entry_lenient(&key).await.map(|e| e.stored_at);
        let window_secs = freshness::effective_window(max_age_secs);
        freshness::classify(stored_at, self.clock.now(), window_secs) == Freshness::Fresh
    }

    /// 나이와 무관하게 캐시된 데이터를 반환합니다.
    pub async fn get_stale(&self, key: &str) -> Option<Value> {
        let key = self.namespaced(key);
        self.read_entry_lenient(&key).await.map(|e| e.payload)
    }

    /// 통계 스냅샷을 저장소에 통계 윈도우 TTL로 게시합니다.
    pub async fn publish_stats(&self) -> Result<()> {
        let snapshot = serde_json::to_value(self.stats.snapshot())?;
        let key = self.namespaced(STATS_KEY);
        self.store
            .put(&key, &snapshot, self.stats.window_secs())
            .await
    }

    /// 마지막으로 게시된 통계 스냅샷 (다른 프로세스가 게시한 것 포함).
    pub async fn published_stats(&self) -> Result<Option<StatsSnapshot>> {
        match self.store.get(&self.namespaced(STATS_KEY)).await? {
            Some(raw) => Ok(Some(serde_json::from_value(raw)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn namespaced(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.key_prefix, key)
        }
    }

    pub(crate) async fn lock_key(&self, key: &str) -> Option<OwnedMutexGuard<()>> {
        match &self.locks {
            Some(locks) => Some(locks.acquire(key).await),
            None => None,
        }
    }

    /// 제공자를 호출합니다. 실패와 빈 응답은 `None`으로 흡수합니다.
    async fn try_fetch<Op, Fut>(&self, key: &str, stage: DataSource, op: Op) -> Option<Value>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<Value>>,
    {
        match op().await {
            Ok(data) if has_data(&data) => {
                self.stats.record_api_success();
                Some(data)
            }
            Ok(_) => {
                debug!(key = %key, stage = %stage, "제공자 빈 응답");
                None
            }
            Err(e) => {
                warn!(key = %key, stage = %stage, kind = %e.kind, error = %e, "제공자 호출 실패");
                self.stats.record_api_failure(&e);
                None
            }
        }
    }

    /// 저장 실패는 응답을 막지 않습니다.
    async fn persist_fetched(&self, key: &str, data: Value, source: DataSource) -> Envelope {
        let now = self.clock.now();
        let entry = CacheEntry {
            payload: data,
            stored_at: now,
        };
        match serde_json::to_value(&entry) {
            Ok(raw) => {
                if let Err(e) = self.store.put(key, &raw, self.retention_secs).await {
                    warn!(key = %key, error = %e, "캐시 저장 실패");
                }
            }
            Err(e) => warn!(key = %key, error = %e, "캐시 항목 직렬화 실패"),
        }
        info!(key = %key, source = %source, "제공자 데이터 캐시 완료");
        Envelope::fetched(entry.payload, now, source)
    }

    pub(crate) async fn write_entry(&self, key: &str, data: Value) -> Result<()> {
        let entry = CacheEntry {
            payload: data,
            stored_at: self.clock.now(),
        };
        let raw = serde_json::to_value(&entry)?;
        self.store.put(key, &raw, self.retention_secs).await
    }

    pub(crate) async fn read_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        match self.store.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_value(raw)?)),
            None => Ok(None),
        }
    }

    /// 저장소 오류와 손상된 항목은 "항목 없음"으로 취급합니다.
    async fn read_entry_lenient(&self, key: &str) -> Option<CacheEntry> {
        match self.read_entry(key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "캐시 조회 실패, 항목 없음으로 처리");
                None
            }
        }
    }

    fn finish(&self, envelope: Envelope) -> Envelope {
        tracing::Span::current().record("source", tracing::field::display(envelope.source()));
        envelope
    }
}

/// 과거 시계열 메타데이터 키.
pub(crate) fn meta_key(key: &str) -> String {
    format!("{}:meta", key)
}
