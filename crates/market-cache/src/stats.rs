//! 결과 통계 수집기.
//!
//! 요청/캐시 적중/API 실패/요청 한도 초과 카운터와 마지막 성공·적중 시각을 집계합니다.
//! 윈도우(기본 1시간)가 지나면 다음 기록 시점에 스스로 초기화됩니다.
//! 인스턴스는 `Arc`로 주입되므로 테스트마다 격리된 통계를 검증할 수 있습니다.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::clock::{Clock, SystemClock};
use crate::error::{is_rate_limit_message, FetchError};

#[derive(Debug, Default, Clone, Copy)]
struct Timestamps {
    window_started: Option<DateTime<Utc>>,
    last_api_success: Option<DateTime<Utc>>,
    last_cache_hit: Option<DateTime<Utc>>,
}

/// 통계 스냅샷.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub api_failures: u64,
    pub rate_limits: u64,
    pub last_api_success: Option<DateTime<Utc>>,
    pub last_cache_hit: Option<DateTime<Utc>>,
    pub window_started: Option<DateTime<Utc>>,
    pub hit_rate: f64,
}

/// 프로세스 단위 결과 통계.
pub struct OutcomeStats {
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    api_failures: AtomicU64,
    rate_limits: AtomicU64,
    timestamps: RwLock<Timestamps>,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl OutcomeStats {
    pub fn new(window_secs: u64, clock: Arc<dyn Clock>) -> Self {
        let window = i64::try_from(window_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or_else(|| Duration::hours(1));

        Self {
            total_requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            api_failures: AtomicU64::new(0),
            rate_limits: AtomicU64::new(0),
            timestamps: RwLock::new(Timestamps::default()),
            window,
            clock,
        }
    }

    /// 시스템 시계, 1시간 윈도우.
    pub fn hourly() -> Self {
        Self::new(60 * 60, Arc::new(SystemClock))
    }

    pub fn record_request(&self) {
        self.roll_window();
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        let now = self.roll_window();
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        self.write_timestamps(|ts| ts.last_cache_hit = Some(now));
    }

    pub fn record_api_success(&self) {
        let now = self.roll_window();
        self.write_timestamps(|ts| ts.last_api_success = Some(now));
    }

    /// 제공자 실패를 기록합니다. 요청 한도 초과는 별도 카운터로 집계합니다.
    pub fn record_api_failure(&self, error: &FetchError) {
        self.roll_window();
        if error.is_rate_limited() {
            self.rate_limits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.api_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 메시지 문구만 있는 실패를 기록합니다 ("rate limit" / "429" → 요청 한도 초과).
    pub fn record_api_failure_message(&self, message: &str) {
        self.roll_window();
        if is_rate_limit_message(message) {
            self.rate_limits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.api_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 현재 통계를 가져옵니다.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.roll_window();
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let hit_rate = if total_requests > 0 {
            cache_hits as f64 / total_requests as f64
        } else {
            0.0
        };
        let ts = self.read_timestamps();

        StatsSnapshot {
            total_requests,
            cache_hits,
            api_failures: self.api_failures.load(Ordering::Relaxed),
            rate_limits: self.rate_limits.load(Ordering::Relaxed),
            last_api_success: ts.last_api_success,
            last_cache_hit: ts.last_cache_hit,
            window_started: ts.window_started,
            hit_rate,
        }
    }

    /// 통계를 초기화합니다.
    pub fn reset(&self) {
        let now = self.clock.now();
        self.clear(now);
    }

    pub fn window_secs(&self) -> u64 {
        u64::try_from(self.window.num_seconds()).unwrap_or(0)
    }

    /// 윈도우가 만료되었으면 초기화하고 현재 시각을 반환합니다.
    fn roll_window(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        let started = self.read_timestamps().window_started;

        match started {
            None => self.write_timestamps(|ts| {
                ts.window_started.get_or_insert(now);
            }),
            Some(at) if now - at >= self.window => self.clear(now),
            Some(_) => {}
        }
        now
    }

    fn clear(&self, now: DateTime<Utc>) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.api_failures.store(0, Ordering::Relaxed);
        self.rate_limits.store(0, Ordering::Relaxed);
        self.write_timestamps(|ts| {
            *ts = Timestamps {
                window_started: Some(now),
                ..Timestamps::default()
            }
        });
    }

    fn read_timestamps(&self) -> Timestamps {
        *self.timestamps.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_timestamps(&self, update: impl FnOnce(&mut Timestamps)) {
        let mut ts = self.timestamps.write().unwrap_or_else(|p| p.into_inner());
        update(&mut *ts);
    }
}

impl Default for OutcomeStats {
    fn default() -> Self {
        Self::hourly()
    }
}
