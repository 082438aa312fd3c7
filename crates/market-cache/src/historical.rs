//! 과거 시계열 증분 캐시.
//!
//! 날짜 키가 붙은 시계열은 이미 가진 구간을 다시 받지 않습니다.
//! 마지막 날짜 다음 날부터 오늘까지의 빈 구간만 조회해서 기존 데이터와 병합합니다.
//!
//! # 저장 구조
//!
//! - `{key}`: 날짜순 정렬된 포인트 배열 ([`CacheEntry`](crate::resilient::CacheEntry) 형식)
//! - `{key}:meta`: [`SeriesMeta`]
//!
//! 일반 캐시 경로와 달리 저장소 오류는 호출자에게 전파됩니다.
//! 단, 병합 결과 저장에 실패해도 읽어 둔 기존 포인트가 있으면 `cache_on_error`로 응답합니다.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use tracing::{debug, info, instrument, warn};

use crate::envelope::{DataSource, Envelope};
use crate::error::{FetchResult, Result};
use crate::resilient::{meta_key, CacheEntry, ResilientCache};

/// 마지막 날짜가 오늘로부터 이 일수 이내이면 최신으로 봅니다.
pub const CURRENT_WITHIN_DAYS: i64 = 1;

/// 시계열 메타데이터.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesMeta {
    pub first_date: Option<String>,
    pub last_date: Option<String>,
    pub last_updated: DateTime<Utc>,
    pub count: usize,
}

impl SeriesMeta {
    fn describe(points: &[Value], date_field: &str, now: DateTime<Utc>) -> Self {
        Self {
            first_date: points.first().and_then(|p| date_of(p, date_field)).map(str::to_string),
            last_date: points.last().and_then(|p| date_of(p, date_field)).map(str::to_string),
            last_updated: now,
            count: points.len(),
        }
    }

    /// 마지막 날짜 (`YYYY-MM-DD` 앞 10자 기준).
    pub fn last_day(&self) -> Option<NaiveDate> {
        self.last_date.as_deref().and_then(parse_day)
    }
}

impl ResilientCache {
    /// 날짜 키 시계열을 증분 갱신하여 반환합니다.
    ///
    /// `fetch_range(from, to)`는 `from..=to` 구간의 포인트를 반환해야 합니다.
    /// `from`이 `None`이면 전체 이력을 요청합니다.
    ///
    /// # 반환 출처
    ///
    /// - `cache`: 마지막 날짜가 오늘로부터 하루 이내이거나 새 포인트가 없음
    /// - `merged`: 빈 구간을 받아 병합함
    /// - `cache_on_error`: 조회 실패, 기존 포인트 반환
    /// - `none`: 조회 실패 또는 빈 응답이고 기존 포인트도 없음
    #[instrument(skip(self, fetch_range), fields(source = tracing::field::Empty))]
    pub async fn remember_historical<F, Fut>(
        &self,
        key: &str,
        date_field: &str,
        ttl_secs: Option<u64>,
        fetch_range: F,
    ) -> Result<Envelope>
    where
        F: FnOnce(Option<NaiveDate>, NaiveDate) -> Fut,
        Fut: Future<Output = FetchResult<Vec<Value>>>,
    {
        let key = self.namespaced(key);
        let meta_key = meta_key(&key);
        let _guard = self.lock_key(&key).await;

        self.stats.record_request();
        let now = self.clock.now();
        let today = now.date_naive();

        let existing = self.read_points(&key).await?;
        let meta = self.read_meta(&meta_key).await?;
        let last_day = existing
            .last()
            .and_then(|p| date_of(p, date_field))
            .and_then(parse_day);
        let last_updated = meta.as_ref().map(|m| m.last_updated).unwrap_or(now);

        if let Some(last) = last_day {
            if (today - last).num_days() <= CURRENT_WITHIN_DAYS {
                self.stats.record_cache_hit();
                debug!(key = %key, last_date = %last, "시계열 최신 상태, 캐시 반환");
                return Ok(record_source(Envelope::trusted(
                    Value::Array(existing),
                    last_updated,
                    now,
                    DataSource::Cache,
                )));
            }
        }

        let from = last_day.and_then(|last| last.checked_add_signed(Duration::days(1)));
        info!(key = %key, from = ?from, to = %today, "시계열 빈 구간 조회");

        let incoming = match fetch_range(from, today).await {
            Ok(points) if !points.is_empty() => {
                self.stats.record_api_success();
                points
            }
            Ok(_) => {
                debug!(key = %key, "새 포인트 없음");
                return Ok(record_source(self.historical_unchanged(existing, last_updated, now)));
            }
            Err(e) => {
                warn!(key = %key, kind = %e.kind, error = %e, "시계열 조회 실패, 기존 데이터 사용");
                self.stats.record_api_failure(&e);
                return Ok(record_source(self.historical_fallback(existing, last_updated, now)));
            }
        };

        let fetched = incoming.len();
        let prior = existing.clone();
        let merged = merge_points(existing, incoming, date_field);
        let meta = SeriesMeta::describe(&merged, date_field, now);
        let ttl = ttl_secs.unwrap_or(self.historical_ttl_secs);
        let payload = Value::Array(merged);

        if let Err(e) = self.persist_series(&key, &meta_key, &payload, &meta, ttl).await {
            if prior.is_empty() {
                return Err(e);
            }
            warn!(key = %key, error = %e, "시계열 저장 실패, 기존 데이터 사용");
            return Ok(record_source(self.historical_fallback(prior, last_updated, now)));
        }

        info!(
            key = %key,
            fetched,
            total = meta.count,
            last_date = ?meta.last_date,
            "시계열 병합 완료"
        );

        Ok(record_source(Envelope::fetched(payload, now, DataSource::Merged)))
    }

    /// 시계열 메타데이터를 조회합니다.
    pub async fn series_state(&self, key: &str) -> Result<Option<SeriesMeta>> {
        let key = self.namespaced(key);
        self.read_meta(&meta_key(&key)).await
    }

    async fn persist_series(
        &self,
        key: &str,
        meta_key: &str,
        payload: &Value,
        meta: &SeriesMeta,
        ttl: u64,
    ) -> Result<()> {
        let entry = serde_json::to_value(CacheEntry {
            payload: payload.clone(),
            stored_at: meta.last_updated,
        })?;
        self.store.put(key, &entry, ttl).await?;
        self.store
            .put(meta_key, &serde_json::to_value(meta)?, ttl)
            .await
    }

    fn historical_unchanged(
        &self,
        existing: Vec<Value>,
        last_updated: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Envelope {
        if existing.is_empty() {
            return Envelope::empty(now);
        }
        Envelope::trusted(Value::Array(existing), last_updated, now, DataSource::Cache)
    }

    fn historical_fallback(
        &self,
        existing: Vec<Value>,
        last_updated: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Envelope {
        if existing.is_empty() {
            return Envelope::empty(now);
        }
        let mut envelope =
            Envelope::trusted(Value::Array(existing), last_updated, now, DataSource::CacheOnError);
        envelope.metadata.is_fresh = false;
        envelope
    }

    async fn read_points(&self, key: &str) -> Result<Vec<Value>> {
        Ok(match self.read_entry(key).await? {
            Some(entry) => match entry.payload {
                Value::Array(points) => points,
                _ => {
                    warn!(key = %key, "시계열 항목이 배열이 아님, 무시");
                    Vec::new()
                }
            },
            None => Vec::new(),
        })
    }

    async fn read_meta(&self, meta_key: &str) -> Result<Option<SeriesMeta>> {
        match self.store.get(meta_key).await? {
            Some(raw) => Ok(Some(serde_json::from_value(raw)?)),
            None => Ok(None),
        }
    }
}

/// 기존 포인트와 새 포인트를 날짜 키로 병합합니다.
///
/// 같은 날짜는 새 포인트가 이기고, 결과는 날짜 오름차순입니다.
/// 날짜 필드가 없는 포인트는 버립니다.
pub fn merge_points(existing: Vec<Value>, incoming: Vec<Value>, date_field: &str) -> Vec<Value> {
    let mut by_date: BTreeMap<String, Value> = BTreeMap::new();
    let mut dropped = 0usize;

    for point in existing.into_iter().chain(incoming) {
        match date_of(&point, date_field) {
            Some(date) => {
                by_date.insert(date.to_string(), point);
            }
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        warn!(dropped, date_field, "날짜 필드 없는 포인트 제외");
    }

    by_date.into_values().collect()
}

fn date_of<'a>(point: &'a Value, date_field: &str) -> Option<&'a str> {
    point
        .get(date_field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// 날짜 문자열 앞 10자를 `YYYY-MM-DD`로 해석합니다.
pub fn parse_day(date: &str) -> Option<NaiveDate> {
    let day = date.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn record_source(envelope: Envelope) -> Envelope {
    tracing::Span::current().record("source", tracing::field::display(envelope.source()));
    envelope
}
