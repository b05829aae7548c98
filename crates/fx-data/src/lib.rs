//! 환율 소스 조회와 적재.
//!
//! 이 crate는 다음을 제공합니다:
//! - ECB 벌크 이력 소스 (`EcbRateSource`, 재시도 포함)
//! - 환율 테이블 저장소 (`PgRateStore`, 테스트용 `MemoryRateStore`)
//! - 멱등 적재기 (`RateLoader`: 날짜별 삭제 후 삽입 / 스테이징 병합)

pub mod error;
pub mod loader;
pub mod source;
pub mod storage;

pub use error::{Result, StorageError};
pub use loader::{LoadCounts, RateLoader};
pub use source::{EcbRateSource, RateSource, RetryConfig};
pub use storage::{PgRateStore, RateStore, ReplaceCounts, StageTable};

#[cfg(any(test, feature = "test-utils"))]
pub use storage::{FailPoint, MemoryRateStore};
