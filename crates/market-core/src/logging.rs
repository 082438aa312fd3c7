//! 로깅 초기화.
//!
//! 설정 파일의 `[logging]` 섹션으로 구독자를 구성합니다.
//! `RUST_LOG`가 있으면 `level`보다 우선합니다.
//!
//! ```toml
//! [logging]
//! level = "info,market_cache=debug"
//! format = "json"       # pretty | json | compact
//! span_events = true    # remember/remember_historical span 종료 시 소요 시간 기록
//! ```

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::LoggingSettings;
use crate::error::{CoreError, CoreResult};

/// 로그 출력 형식.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// 개발용 여러 줄 형식
    #[default]
    Pretty,
    /// 로그 집계용
    Json,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            _ => Err(CoreError::InvalidInput(format!(
                "알 수 없는 로그 형식: {} (pretty, json, compact)",
                s
            ))),
        }
    }
}

/// 설정으로 전역 로깅을 초기화합니다.
///
/// 알 수 없는 형식이나 잘못된 레벨 필터는 구독자를 설치하기 전에 거부합니다.
pub fn init_logging(settings: &LoggingSettings) -> CoreResult<()> {
    let format: LogFormat = settings.format.parse()?;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .map_err(|e| CoreError::Logging(e.to_string()))?;

    tracing_subscriber::registry()
        .with(fmt_layer(format, span_events(settings.span_events)).with_filter(filter))
        .try_init()
        .map_err(|e| CoreError::Logging(e.to_string()))?;

    tracing::info!(format = ?format, level = %settings.level, "로깅 초기화 완료");
    Ok(())
}

fn fmt_layer(format: LogFormat, span_events: FmtSpan) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer = fmt::layer().with_target(true).with_span_events(span_events);
    match format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

fn span_events(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

/// 캐시 키 필드가 붙은 span.
#[macro_export]
macro_rules! cache_span {
    ($name:expr, $key:expr) => {
        tracing::info_span!($name, key = %$key)
    };
    ($name:expr, $key:expr, $window:expr) => {
        tracing::info_span!($name, key = %$key, window_secs = $window)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_unknown_format_is_rejected_before_install() {
        let settings = LoggingSettings {
            format: "xml".to_string(),
            ..LoggingSettings::default()
        };
        assert!(matches!(
            init_logging(&settings),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_span_events_toggle() {
        assert_eq!(span_events(true), FmtSpan::CLOSE);
        assert_eq!(span_events(false), FmtSpan::NONE);
    }

    #[test]
    fn test_cache_span_fields() {
        let span = cache_span!("stale", "quote:aapl", 300u64);
        // 구독자가 없으면 비활성 span
        assert!(span.is_disabled());
    }
}
