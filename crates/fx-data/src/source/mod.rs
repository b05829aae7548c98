//! 환율 소스.
//!
//! 소스는 전체 이력을 한 번에 내려받아 `SnapshotTable`로 반환합니다.
//! 날짜별 호출 대신 실행당 한 번만 조회하고 결과를 모든 날짜 해석에 공유합니다.

pub mod ecb;
pub mod payload;
pub mod retry;

use async_trait::async_trait;
use fx_core::{DateRange, FxResult, SnapshotTable};

pub use ecb::EcbRateSource;
pub use retry::RetryConfig;

/// 벌크 환율 소스.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// 최소한 `window`를 포함하는 스냅샷 테이블 조회.
    async fn fetch(&self, window: &DateRange) -> FxResult<SnapshotTable>;

    /// 로그용 소스 이름.
    fn name(&self) -> &str;
}
