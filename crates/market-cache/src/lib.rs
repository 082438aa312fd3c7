//! 마켓 데이터 장애 내성 캐시 계층.
//!
//! 이 crate는 다음을 제공합니다:
//! - 신선도 기반 조회-캐시 정책 (1차 → 대체 → 오래된 캐시 → 빈 응답)
//! - 날짜 키 시계열의 빈 구간 증분 병합
//! - Redis / 인메모리 키-값 저장소
//! - 결과 통계 (요청, 캐시 적중, API 실패, 요청 한도 초과)

pub mod clock;
pub mod envelope;
pub mod error;
pub mod freshness;
pub mod historical;
pub mod lock;
pub mod resilient;
pub mod stats;
pub mod store;

pub use error::{CacheError, FetchError, FetchErrorKind, FetchResult, Result};

pub use clock::{Clock, ManualClock, SystemClock};
pub use envelope::{has_data, DataSource, Envelope, EnvelopeMetadata};
pub use freshness::Freshness;
pub use historical::{merge_points, SeriesMeta};
pub use lock::KeyLocks;
pub use resilient::{CacheEntry, ResilientCache, ResilientCacheBuilder, STATS_KEY};
pub use stats::{OutcomeStats, StatsSnapshot};

// 저장소 타입 재내보내기
pub use store::{KeyedStore, MemoryStore, RedisStore};
