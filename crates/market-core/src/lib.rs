//! # Market Core
//!
//! 마켓 데이터 캐시 계층이 공유하는 기반 타입을 제공합니다.
//!
//! - 설정 관리 (파일 + 환경 변수)
//! - 로깅 인프라
//! - 공통 에러 타입

pub mod config;
pub mod error;
pub mod logging;

pub use config::*;
pub use error::*;
pub use logging::*;
