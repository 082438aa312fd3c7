//! 캐시 운영 도구 모음.
//!
//! 이 crate는 다음 기능을 제공합니다:
//! - 키 신선도 확인 및 캐시 데이터 조회
//! - 캐시 항목 삭제 (캐시 무효화)
//! - 저장소 상태 점검 및 통계 조회

pub mod commands;

pub use commands::*;
