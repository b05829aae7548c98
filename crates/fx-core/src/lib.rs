//! 환율 수집 핵심 도메인.
//!
//! 이 crate는 다음을 제공합니다:
//! - 통화, 스냅샷, 환율 행, 날짜 범위 등 도메인 타입
//! - 스냅샷 선택 및 교차 환율 환산 (`RateResolver`)
//! - 에러 타입 (`FxError`)
//! - 설정 로드 (`FxConfig`)
//! - 로깅 초기화

pub mod config;
pub mod error;
pub mod logging;
pub mod resolver;
pub mod types;

pub use config::{
    DatabaseConfig, FxConfig, IngestConfig, LoadStrategy, ServerConfig, SourceConfig, TargetTable,
};
pub use error::{FxError, FxResult, LoadStep};
pub use resolver::RateResolver;
pub use types::*;
