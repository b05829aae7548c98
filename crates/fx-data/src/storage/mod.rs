//! 환율 테이블 저장소.
//!
//! 적재기(`RateLoader`)가 사용하는 저장소 연산을 정의합니다.
//! 각 연산은 그 자체로 하나의 완결된 단위이며, 멱등성은 키
//! `(rate_date, currency)` 기준 삭제/업서트로 보장합니다.
//!
//! - `PgRateStore`: PostgreSQL (sqlx)
//! - `MemoryRateStore`: 테스트용 인메모리 구현 (`test-utils` feature)

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod postgres;

use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use fx_core::{ResolvedRate, TargetTable};
use std::fmt;

#[cfg(any(test, feature = "test-utils"))]
pub use memory::{FailPoint, MemoryRateStore};
pub use postgres::PgRateStore;

/// 날짜 교체 결과.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceCounts {
    /// 삭제된 기존 행 수
    pub deleted: u64,
    /// 삽입된 행 수
    pub inserted: u64,
}

/// 병합용 임시 스테이징 테이블.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTable {
    /// 스키마 (대상과 동일)
    pub dataset: String,
    /// 실행마다 고유한 테이블 이름
    pub table: String,
}

impl StageTable {
    /// 대상 테이블 옆에 실행 고유 이름으로 스테이징 테이블 이름 생성.
    pub fn for_target(target: &TargetTable) -> Self {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            dataset: target.dataset.clone(),
            table: format!("{}_stage_{}", target.table, &run_id[..12]),
        }
    }
}

impl fmt::Display for StageTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

/// 환율 테이블 저장소.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// 대상 테이블 존재 여부.
    async fn table_exists(&self, target: &TargetTable) -> Result<bool>;

    /// 대상 테이블 생성 (`rate_date DATE, currency, rate_to_base DOUBLE`).
    /// 이미 존재하면 아무것도 하지 않습니다.
    async fn create_table(&self, target: &TargetTable) -> Result<()>;

    /// 하나의 트랜잭션으로 해당 날짜의 모든 행을 삭제하고 `rows`를 삽입합니다.
    async fn replace_date(
        &self,
        target: &TargetTable,
        date: NaiveDate,
        rows: &[ResolvedRate],
    ) -> Result<ReplaceCounts>;

    /// 스테이징 테이블을 만들고 `rows`를 적재합니다.
    async fn stage(&self, target: &TargetTable, stage: &StageTable, rows: &[ResolvedRate])
        -> Result<u64>;

    /// `(rate_date, currency)` 기준으로 스테이징 → 대상 병합. 영향받은 행 수 반환.
    async fn merge(&self, target: &TargetTable, stage: &StageTable) -> Result<u64>;

    /// 스테이징 테이블 삭제 (없어도 성공).
    async fn drop_stage(&self, stage: &StageTable) -> Result<()>;
}
