//! 날짜별 환율 해석.
//!
//! 벌크 스냅샷 테이블에서 요청 날짜에 사용할 스냅샷을 고르고,
//! 앵커 통화 기준 시세를 "통화 1단위당 기준 통화 금액"으로 환산합니다.
//!
//! # 스냅샷 선택
//!
//! 소스는 주말/공휴일 데이터를 제공하지 않으므로, 요청 날짜부터 하루씩
//! 거슬러 올라가며 처음 발견된 스냅샷을 사용합니다 (가장 가까운 이전 날짜).
//! 공휴일은 소스마다 다르므로 영업일 달력 대신 실제 데이터 존재 여부만 봅니다.
//!
//! # 환산
//!
//! ```text
//! rate_to_base(C) = anchor_to_base / anchor_to_C
//! ```

use crate::error::{FxError, FxResult};
use crate::types::{Currency, RateSnapshot, Resolution, ResolvedRate, SnapshotTable};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeSet;
use tracing::debug;

/// 기본 역방향 탐색 일수 (요청 날짜 포함 15일 조회).
pub const DEFAULT_LOOKBACK_DAYS: u32 = 14;

/// 환율 해석기.
#[derive(Debug, Clone)]
pub struct RateResolver {
    base: Currency,
    lookback_days: u32,
}

impl RateResolver {
    /// 기준 통화로 해석기 생성.
    pub fn new(base: Currency) -> Self {
        Self {
            base,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }

    /// 역방향 탐색 일수 지정.
    #[must_use]
    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    pub fn base(&self) -> &Currency {
        &self.base
    }

    pub fn lookback_days(&self) -> u32 {
        self.lookback_days
    }

    /// 요청 날짜에 사용할 스냅샷 탐색.
    ///
    /// 오프셋 0(요청 날짜)부터 `lookback_days`까지 순서대로 확인하고
    /// 처음 일치하는 날짜를 반환합니다.
    pub fn locate<'a>(
        &self,
        table: &'a SnapshotTable,
        requested: NaiveDate,
    ) -> FxResult<&'a RateSnapshot> {
        for offset in 0..=i64::from(self.lookback_days) {
            // 표현 가능한 가장 이른 날짜 이전으로는 탐색하지 않음
            let Some(candidate) = requested.checked_sub_signed(Duration::days(offset)) else {
                break;
            };
            if let Some(snapshot) = table.get(candidate) {
                return Ok(snapshot);
            }
        }
        Err(FxError::NoRateFound(requested))
    }

    /// 요청 날짜의 환율 행 생성.
    ///
    /// 기준 통화는 요청 목록에 없어도 항상 1.0으로 포함됩니다.
    /// 스냅샷에 없거나 0 이하인 통화는 조용히 제외됩니다.
    pub fn resolve(
        &self,
        table: &SnapshotTable,
        requested: NaiveDate,
        currencies: &[Currency],
    ) -> FxResult<Resolution> {
        let snapshot = self.locate(table, requested)?;
        let anchor = table.anchor();

        let anchor_to_base = snapshot
            .quote(&self.base, anchor)
            .filter(|r| r.is_finite() && *r > 0.0)
            .ok_or_else(|| FxError::MissingBaseRate {
                requested,
                snapshot: snapshot.date,
                base: self.base.to_string(),
            })?;

        // BTreeSet: 중복 제거 + 코드 오름차순
        let mut wanted: BTreeSet<&Currency> = currencies.iter().collect();
        wanted.insert(&self.base);

        let mut rates = Vec::with_capacity(wanted.len());
        let mut skipped = Vec::new();

        for currency in wanted {
            if currency == &self.base {
                rates.push(ResolvedRate::new(requested, currency.clone(), 1.0));
                continue;
            }

            let anchor_to_currency = match snapshot.quote(currency, anchor) {
                Some(rate) if rate.is_finite() && rate > 0.0 => rate,
                _ => {
                    skipped.push(currency.as_str());
                    continue;
                }
            };

            let rate_to_base = anchor_to_base / anchor_to_currency;
            if !rate_to_base.is_finite() || rate_to_base <= 0.0 {
                skipped.push(currency.as_str());
                continue;
            }

            rates.push(ResolvedRate::new(requested, currency.clone(), rate_to_base));
        }

        if !skipped.is_empty() {
            debug!(
                requested = %requested,
                snapshot_date = %snapshot.date,
                skipped = ?skipped,
                "스냅샷에 없는 통화 제외"
            );
        }

        if snapshot.date != requested {
            debug!(
                requested = %requested,
                snapshot_date = %snapshot.date,
                "이전 스냅샷으로 대체"
            );
        }

        Ok(Resolution {
            requested,
            snapshot_date: snapshot.date,
            rates,
        })
    }
}
