//! 캐시 계층 오류 타입.
//!
//! - [`CacheError`]: 저장소/직렬화 등 캐시 계층 자체의 오류. 과거 시계열 경로에서만 호출자에게 전파됩니다.
//! - [`FetchError`]: 제공자 호출 실패. 항상 캐시 계층 내부에서 흡수됩니다.

use std::fmt;

use thiserror::Error;

/// 캐시 계층 오류.
#[derive(Debug, Error)]
pub enum CacheError {
    /// 저장소 연결 오류
    #[error("Store connection error: {0}")]
    ConnectionError(String),

    /// 저장소 명령 오류
    #[error("Store error: {0}")]
    StoreError(String),

    /// 직렬화/역직렬화 오류
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// 잘못된 데이터 형식
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// 타임아웃 오류
    #[error("Operation timeout: {0}")]
    Timeout(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() {
            CacheError::ConnectionError(err.to_string())
        } else {
            CacheError::StoreError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// 제공자 실패 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// 요청 한도 초과 (HTTP 429 등)
    RateLimited,
    /// 일시적 오류 (타임아웃, 5xx, 네트워크)
    Transient,
    /// 재시도해도 해결되지 않는 오류 (인증 실패, 잘못된 심볼)
    Fatal,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Transient => write!(f, "transient"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// 제공자 호출 실패.
///
/// 제공자 클라이언트가 자신의 오류를 이 타입으로 변환해 반환합니다.
/// 분류를 알 수 없는 경우 [`FetchError::classify`]로 메시지 기반 분류를 사용합니다.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::RateLimited, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Transient, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Fatal, message)
    }

    /// 메시지 문구로 유형을 추정합니다.
    ///
    /// "rate limit" 또는 "429"가 포함되면 `RateLimited`, 그 외는 `Transient`.
    /// 구조화된 오류를 제공하지 않는 업스트림과의 호환용입니다.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = if is_rate_limit_message(&message) {
            FetchErrorKind::RateLimited
        } else {
            FetchErrorKind::Transient
        };
        Self { kind, message }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == FetchErrorKind::RateLimited
    }

    /// 재시도 가능한 오류인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            FetchErrorKind::RateLimited | FetchErrorKind::Transient
        )
    }
}

pub(crate) fn is_rate_limit_message(message: &str) -> bool {
    message.to_lowercase().contains("rate limit") || message.contains("429")
}

/// 제공자 호출 결과.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit_wording() {
        assert!(FetchError::classify("API rate limit exceeded").is_rate_limited());
        assert!(FetchError::classify("HTTP 429 Too Many Requests").is_rate_limited());
        assert!(FetchError::classify("Rate Limit reached").is_rate_limited());
        assert!(!FetchError::classify("connection reset by peer").is_rate_limited());
        assert_eq!(
            FetchError::classify("timeout").kind,
            FetchErrorKind::Transient
        );
    }

    #[test]
    fn test_retryable() {
        assert!(FetchError::transient("503").is_retryable());
        assert!(FetchError::rate_limited("slow down").is_retryable());
        assert!(!FetchError::fatal("invalid api key").is_retryable());
    }

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::rate_limited("quota exhausted");
        assert_eq!(err.to_string(), "rate_limited: quota exhausted");
    }
}
