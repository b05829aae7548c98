//! 일별 환율 수집기.
//!
//! 이 crate는 다음을 제공합니다:
//! - 수집 파이프라인 (`Orchestrator`): 소스 조회 → 날짜별 해석 → 멱등 적재
//! - 실행 요약 (`RunSummary`)
//! - HTTP 트리거 (`/ingest`, `/health`)

pub mod pipeline;
pub mod server;
pub mod stats;

pub use pipeline::{IngestRequest, Orchestrator, RunError};
pub use server::create_router;
pub use stats::{DateOutcome, RunStatus, RunSummary};
