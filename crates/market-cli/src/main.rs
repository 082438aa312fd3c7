//! 마켓 데이터 캐시 운영 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 5분 기준으로 신선한지 확인
//! market-cache probe quote:aapl --max-age 300
//!
//! # 오래되었더라도 캐시된 데이터 출력
//! market-cache stale macro:gdp
//!
//! # 캐시 무효화
//! market-cache forget history:spy
//!
//! # 게시된 통계 / 저장소 상태
//! market-cache stats
//! market-cache health
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use market_cache::{RedisStore, ResilientCache};
use market_cli::commands::{health, inspect};
use market_core::{cache_span, init_logging, AppConfig};
use tracing::{info, Instrument};

#[derive(Parser)]
#[command(name = "market-cache")]
#[command(about = "Market data cache CLI - 캐시 상태 확인 및 무효화 도구", long_about = None)]
#[command(version)]
struct Cli {
    /// 설정 파일 경로 (기본: config/default.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 제공자 호출 없이 키가 신선한지 확인
    Probe {
        /// 캐시 키 (예: quote:aapl)
        key: String,

        /// 신선도 윈도우 (초)
        #[arg(short, long, default_value = "300")]
        max_age: u64,
    },

    /// 나이와 무관하게 캐시된 데이터 출력
    Stale {
        /// 캐시 키
        key: String,
    },

    /// 캐시 항목과 시계열 메타데이터 삭제
    Forget {
        /// 캐시 키
        key: String,
    },

    /// 과거 시계열 메타데이터 조회 (firstDate, lastDate, count)
    Series {
        /// 시계열 캐시 키 (예: history:spy)
        key: String,
    },

    /// 게시된 요청/캐시 적중/실패 통계 조회
    Stats,

    /// 저장소 연결 상태 확인
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load(Some(path)),
        None => AppConfig::load_default(),
    }
    .context("설정 로드 실패")?;

    init_logging(&config.logging).context("로깅 초기화 실패")?;

    let store = RedisStore::connect(&config.redis)
        .await
        .with_context(|| format!("Redis 연결 실패: {}", config.redis.url))?;
    let cache = ResilientCache::builder(Arc::new(store))
        .settings(config.cache.clone())
        .build();

    match cli.command {
        Commands::Probe { key, max_age } => {
            let report = inspect::probe(&cache, &key, max_age)
                .instrument(cache_span!("probe", key, max_age))
                .await;

            let status = match (report.cached, report.fresh) {
                (true, true) => "✅ 신선함",
                (true, false) => "⚠️  오래됨",
                (false, _) => "❌ 캐시 없음",
            };
            println!("\n{} ({}초 기준): {}", key, max_age, status);
        }

        Commands::Stale { key } => {
            match inspect::stale(&cache, &key)
                .instrument(cache_span!("stale", key))
                .await
            {
                Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
                None => println!("\n❌ 캐시 없음: {}", key),
            }
        }

        Commands::Forget { key } => {
            inspect::forget(&cache, &key)
                .instrument(cache_span!("forget", key))
                .await?;
            println!("\n캐시 삭제 완료: {}", key);
        }

        Commands::Series { key } => {
            match inspect::series(&cache, &key)
                .instrument(cache_span!("series", key))
                .await?
            {
                Some(meta) => {
                    println!("\n시계열: {}", key);
                    println!("  시작일: {}", meta.first_date.as_deref().unwrap_or("-"));
                    println!("  종료일: {}", meta.last_date.as_deref().unwrap_or("-"));
                    println!("  포인트: {}", meta.count);
                    println!("  갱신 시각: {}", meta.last_updated);
                }
                None => println!("\n❌ 시계열 메타데이터 없음: {}", key),
            }
        }

        Commands::Stats => match health::published_stats(&cache).await? {
            Some(snapshot) => println!("{}", serde_json::to_string_pretty(&snapshot)?),
            None => println!("\n게시된 통계 없음 (윈도우 만료 또는 미게시)"),
        },

        Commands::Health => {
            info!("Checking store health...");
            println!("\n저장소 상태 확인 중...");

            let report = health::check(&cache).await;
            if report.is_healthy() {
                println!("✅ Redis: 정상 ({}ms)", report.latency_ms);
            } else {
                println!(
                    "❌ Redis: 응답 없음 ({})",
                    report.error.as_deref().unwrap_or("unknown")
                );
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
