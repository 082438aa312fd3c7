//! 신선도 정책.
//!
//! 신선도 윈도우는 저장소 속성이 아니라 조회 시점의 해석입니다.
//! 같은 항목이 호출자의 윈도우에 따라 신선하기도, 오래되기도 합니다.

use chrono::{DateTime, Utc};

/// 캐시 항목 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// `age < window`
    Fresh,
    /// 존재하지만 `age >= window`
    Stale,
    /// 항목 없음
    Absent,
}

/// 허용되는 가장 짧은 윈도우(초).
pub const MIN_WINDOW_SECS: u64 = 1;

/// 호출자 윈도우를 최소 1초로 올립니다. 윈도우 0은 1초로 취급합니다.
pub fn effective_window(window_secs: u64) -> u64 {
    window_secs.max(MIN_WINDOW_SECS)
}

/// `age < window`이면 신선합니다.
pub fn is_fresh(age_secs: i64, window_secs: u64) -> bool {
    i128::from(age_secs) < i128::from(window_secs)
}

/// 저장 시각 기준 경과 초. 시계 역전으로 음수가 되면 0.
pub fn age_secs(stored_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - stored_at).num_seconds().max(0)
}

/// 저장 시각과 윈도우로 항목을 분류합니다.
pub fn classify(stored_at: Option<DateTime<Utc>>, now: DateTime<Utc>, window_secs: u64) -> Freshness {
    match stored_at {
        None => Freshness::Absent,
        Some(at) if is_fresh(age_secs(at, now), window_secs) => Freshness::Fresh,
        Some(_) => Freshness::Stale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_is_fresh_boundary() {
        assert!(is_fresh(0, 60));
        assert!(is_fresh(59, 60));
        assert!(!is_fresh(60, 60));
        assert!(!is_fresh(61, 60));
        assert!(!is_fresh(0, 0));
    }

    #[test]
    fn test_is_fresh_monotonic() {
        let window = 300;
        let mut seen_stale = false;
        for age in 0..600 {
            let fresh = is_fresh(age, window);
            assert_eq!(fresh, age < 300);
            // 한 번 stale이 되면 다시 fresh가 되지 않음
            if seen_stale {
                assert!(!fresh);
            }
            seen_stale |= !fresh;
        }
    }

    #[test]
    fn test_effective_window() {
        assert_eq!(effective_window(0), 1);
        assert_eq!(effective_window(1), 1);
        assert_eq!(effective_window(300), 300);
        assert!(is_fresh(0, effective_window(0)));
    }

    #[test]
    fn test_classify() {
        let now = Utc.with_ymd_and_hms(2024, 6, 5, 12, 0, 0).unwrap();
        assert_eq!(classify(None, now, 60), Freshness::Absent);
        assert_eq!(
            classify(Some(now - Duration::seconds(30)), now, 60),
            Freshness::Fresh
        );
        assert_eq!(
            classify(Some(now - Duration::seconds(30)), now, 10),
            Freshness::Stale
        );
    }

    #[test]
    fn test_age_clamps_future_timestamps() {
        let now = Utc.with_ymd_and_hms(2024, 6, 5, 12, 0, 0).unwrap();
        assert_eq!(age_secs(now + Duration::seconds(5), now), 0);
        assert_eq!(age_secs(now - Duration::minutes(2), now), 120);
    }
}
