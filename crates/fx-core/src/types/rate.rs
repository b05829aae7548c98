//! 해석된 환율 행.

use super::Currency;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 저장 대상 환율 행.
///
/// `rate_date`는 요청된 날짜이며, 주말/공휴일 대체로 사용한 스냅샷 날짜가 아닙니다.
/// `rate_to_base`는 해당 통화 1단위에 해당하는 기준 통화 금액입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRate {
    pub rate_date: NaiveDate,
    pub currency: Currency,
    pub rate_to_base: f64,
}

impl ResolvedRate {
    pub fn new(rate_date: NaiveDate, currency: Currency, rate_to_base: f64) -> Self {
        Self {
            rate_date,
            currency,
            rate_to_base,
        }
    }
}

/// 한 날짜의 해석 결과.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// 요청 날짜
    pub requested: NaiveDate,
    /// 실제 사용한 스냅샷 날짜 (추적용)
    pub snapshot_date: NaiveDate,
    /// 통화 코드 오름차순 행
    pub rates: Vec<ResolvedRate>,
}

impl Resolution {
    /// 이전 영업일 스냅샷으로 대체되었는지 여부.
    pub fn is_fallback(&self) -> bool {
        self.snapshot_date != self.requested
    }
}
