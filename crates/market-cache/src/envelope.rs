//! 응답 봉투.
//!
//! 모든 호출자에게 돌려주는 단위이며 프론트엔드가 그대로 소비합니다.
//!
//! ```json
//! {
//!   "data": [...],
//!   "metadata": {
//!     "lastUpdated": "2024-06-05T12:00:00Z",
//!     "cacheAge": 42,
//!     "source": "stale_cache",
//!     "isFresh": false
//!   }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::freshness;

/// 데이터 출처.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// 1차 제공자에서 방금 가져옴
    Primary,
    /// 대체 제공자에서 방금 가져옴
    Fallback,
    /// 신선한 캐시
    Cache,
    /// 모든 제공자 실패, 오래된 캐시로 대체
    StaleCache,
    /// 과거 시계열 증분 병합
    Merged,
    /// 과거 시계열 조회 실패, 기존 캐시로 대체
    CacheOnError,
    /// 데이터 없음
    None,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Fallback => write!(f, "fallback"),
            Self::Cache => write!(f, "cache"),
            Self::StaleCache => write!(f, "stale_cache"),
            Self::Merged => write!(f, "merged"),
            Self::CacheOnError => write!(f, "cache_on_error"),
            Self::None => write!(f, "none"),
        }
    }
}

/// 봉투 메타데이터.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    pub last_updated: DateTime<Utc>,
    /// 초 단위
    pub cache_age: i64,
    pub source: DataSource,
    pub is_fresh: bool,
}

/// 응답 봉투.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub data: Value,
    pub metadata: EnvelopeMetadata,
}

impl Envelope {
    /// 방금 가져온 데이터.
    pub fn fetched(data: Value, now: DateTime<Utc>, source: DataSource) -> Self {
        Self {
            data,
            metadata: EnvelopeMetadata {
                last_updated: now,
                cache_age: 0,
                source,
                is_fresh: true,
            },
        }
    }

    /// 캐시된 데이터. `is_fresh`는 윈도우로 계산합니다.
    pub fn cached(
        data: Value,
        stored_at: DateTime<Utc>,
        now: DateTime<Utc>,
        source: DataSource,
        window_secs: u64,
    ) -> Self {
        let cache_age = freshness::age_secs(stored_at, now);
        Self {
            data,
            metadata: EnvelopeMetadata {
                last_updated: stored_at,
                cache_age,
                source,
                is_fresh: freshness::is_fresh(cache_age, window_secs),
            },
        }
    }

    /// 신선도 판단 없이 캐시된 데이터 (출처를 신뢰하는 경로).
    pub fn trusted(
        data: Value,
        stored_at: DateTime<Utc>,
        now: DateTime<Utc>,
        source: DataSource,
    ) -> Self {
        Self {
            data,
            metadata: EnvelopeMetadata {
                last_updated: stored_at,
                cache_age: freshness::age_secs(stored_at, now),
                source,
                is_fresh: true,
            },
        }
    }

    /// 데이터 없음 (`data: []`, `source: none`).
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            data: Value::Array(Vec::new()),
            metadata: EnvelopeMetadata {
                last_updated: now,
                cache_age: 0,
                source: DataSource::None,
                is_fresh: false,
            },
        }
    }

    pub fn source(&self) -> DataSource {
        self.metadata.source
    }

    pub fn is_fresh(&self) -> bool {
        self.metadata.is_fresh
    }

    /// 프론트엔드가 "데이터가 오래되었을 수 있음"을 표시해야 하는지.
    pub fn is_degraded(&self) -> bool {
        matches!(
            self.metadata.source,
            DataSource::StaleCache | DataSource::CacheOnError
        )
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.source == DataSource::None
    }

    /// 데이터를 제공자 고유 타입으로 변환합니다.
    pub fn data_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.data)
    }
}

/// 제공자 응답이 "데이터 있음"인지 판단합니다.
///
/// `null`, 빈 배열, 빈 객체, 빈 문자열은 데이터 없음으로 취급합니다.
pub fn has_data(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::String(s) => !s.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 5, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_wire_shape() {
        let envelope = Envelope::cached(
            json!([{"symbol": "BTC"}]),
            now() - Duration::seconds(42),
            now(),
            DataSource::StaleCache,
            30,
        );
        let wire = serde_json::to_value(&envelope).unwrap();

        assert_eq!(wire["metadata"]["cacheAge"], json!(42));
        assert_eq!(wire["metadata"]["source"], json!("stale_cache"));
        assert_eq!(wire["metadata"]["isFresh"], json!(false));
        assert_eq!(wire["metadata"]["lastUpdated"], json!("2024-06-05T11:59:18Z"));
        assert_eq!(wire["data"][0]["symbol"], json!("BTC"));
    }

    #[test]
    fn test_is_fresh_matches_window() {
        let envelope = Envelope::cached(
            json!(1),
            now() - Duration::seconds(10),
            now(),
            DataSource::Cache,
            11,
        );
        assert!(envelope.is_fresh());
        assert_eq!(envelope.metadata.cache_age, 10);
    }

    #[test]
    fn test_empty_envelope() {
        let envelope = Envelope::empty(now());
        assert_eq!(envelope.data, json!([]));
        assert_eq!(envelope.source(), DataSource::None);
        assert!(!envelope.is_fresh());
        assert!(envelope.is_empty());
        assert!(!envelope.is_degraded());
    }

    #[test]
    fn test_source_names() {
        for (source, name) in [
            (DataSource::Primary, "primary"),
            (DataSource::CacheOnError, "cache_on_error"),
            (DataSource::None, "none"),
        ] {
            assert_eq!(source.to_string(), name);
            assert_eq!(serde_json::to_value(source).unwrap(), json!(name));
        }
    }

    #[test]
    fn test_has_data() {
        assert!(!has_data(&json!(null)));
        assert!(!has_data(&json!([])));
        assert!(!has_data(&json!({})));
        assert!(!has_data(&json!("")));
        assert!(has_data(&json!(0)));
        assert!(has_data(&json!(false)));
        assert!(has_data(&json!([0])));
    }

    #[test]
    fn test_data_as() {
        #[derive(Deserialize)]
        struct Quote {
            price: f64,
        }
        let envelope = Envelope::fetched(json!({"price": 101.5}), now(), DataSource::Primary);
        let quote: Quote = envelope.data_as().unwrap();
        assert_eq!(quote.price, 101.5);
    }
}
