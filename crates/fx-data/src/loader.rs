//! 멱등 환율 적재기.
//!
//! 같은 행 집합을 몇 번 적재해도 최종 상태가 같도록 두 가지 전략을 제공합니다.
//!
//! # 전략
//!
//! - **DeleteInsert**: 날짜별로 기존 행 삭제 후 삽입 (하나의 트랜잭션).
//!   해당 날짜에 더 이상 요청되지 않은 통화 행도 함께 사라집니다.
//! - **Merge**: 전체 배치를 스테이징 테이블에 적재한 뒤 `(rate_date, currency)`
//!   기준으로 업서트. 스테이징 테이블은 병합 실패 시에도 삭제됩니다.
//!   요청에서 빠진 통화의 기존 행은 그대로 남습니다.
//!
//! 저장소 오류는 재시도하지 않고 실패 지점(날짜 또는 병합 단계)과 함께
//! `FxError::Load`로 반환합니다. 이미 커밋된 날짜는 영향을 받지 않습니다.

use crate::storage::{RateStore, StageTable};
use chrono::NaiveDate;
use fx_core::{FxError, FxResult, LoadStep, LoadStrategy, ResolvedRate, TargetTable};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// 적재 결과.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadCounts {
    /// 날짜별 기록된 행 수
    pub by_date: BTreeMap<NaiveDate, usize>,
    /// 삭제된 기존 행 수 (DeleteInsert)
    pub deleted: u64,
    /// 기록된 총 행 수
    pub written: usize,
}

/// 환율 적재기.
pub struct RateLoader {
    store: Arc<dyn RateStore>,
    target: TargetTable,
    strategy: LoadStrategy,
    table_ready: OnceCell<()>,
}

impl RateLoader {
    pub fn new(store: Arc<dyn RateStore>, target: TargetTable, strategy: LoadStrategy) -> Self {
        Self {
            store,
            target,
            strategy,
            table_ready: OnceCell::new(),
        }
    }

    pub fn target(&self) -> &TargetTable {
        &self.target
    }

    pub fn strategy(&self) -> LoadStrategy {
        self.strategy
    }

    /// 대상 테이블 확인 후 없으면 생성.
    ///
    /// 적재기 인스턴스당 한 번만 실제로 확인합니다. 동시 생성 경합으로 인한
    /// "이미 존재" 오류는 성공으로 간주합니다.
    pub async fn ensure_table(&self) -> FxResult<()> {
        self.table_ready
            .get_or_try_init(|| async {
                let exists = self
                    .store
                    .table_exists(&self.target)
                    .await
                    .map_err(|e| FxError::load(LoadStep::EnsureTable, e))?;

                if exists {
                    debug!(target_table = %self.target, "대상 테이블 존재 확인");
                    return Ok(());
                }

                match self.store.create_table(&self.target).await {
                    Ok(()) => {
                        info!(target_table = %self.target, "대상 테이블 생성");
                        Ok(())
                    }
                    Err(e) if e.is_already_exists() => {
                        debug!(target_table = %self.target, "다른 실행이 먼저 테이블 생성");
                        Ok(())
                    }
                    Err(e) => Err(FxError::load(LoadStep::EnsureTable, e)),
                }
            })
            .await
            .map(|_| ())
    }

    /// 행 적재.
    pub async fn apply(&self, rows: &[ResolvedRate]) -> FxResult<LoadCounts> {
        let rows = dedup_by_key(rows);
        if rows.is_empty() {
            debug!("적재할 행 없음");
            return Ok(LoadCounts::default());
        }

        self.ensure_table().await?;

        match self.strategy {
            LoadStrategy::DeleteInsert => self.apply_delete_insert(&rows).await,
            LoadStrategy::Merge => self.apply_merge(&rows).await,
        }
    }

    /// 날짜별 삭제 후 삽입 (날짜 오름차순).
    async fn apply_delete_insert(&self, rows: &[ResolvedRate]) -> FxResult<LoadCounts> {
        let mut by_date: BTreeMap<NaiveDate, Vec<ResolvedRate>> = BTreeMap::new();
        for row in rows {
            by_date.entry(row.rate_date).or_default().push(row.clone());
        }

        let mut counts = LoadCounts::default();
        for (date, day_rows) in by_date {
            let replaced = self
                .store
                .replace_date(&self.target, date, &day_rows)
                .await
                .map_err(|e| FxError::load(LoadStep::Replace(date), e))?;

            debug!(
                date = %date,
                deleted = replaced.deleted,
                inserted = day_rows.len(),
                "날짜 교체 완료"
            );
            counts.by_date.insert(date, day_rows.len());
            counts.deleted += replaced.deleted;
            counts.written += day_rows.len();
        }

        Ok(counts)
    }

    /// 스테이징 후 병합. 스테이징 테이블은 항상 정리합니다.
    async fn apply_merge(&self, rows: &[ResolvedRate]) -> FxResult<LoadCounts> {
        let stage = StageTable::for_target(&self.target);

        let merged = self.stage_and_merge(&stage, rows).await;
        let cleanup = self.store.drop_stage(&stage).await;

        match (&merged, cleanup) {
            (_, Ok(())) => {}
            (Ok(_), Err(e)) => {
                warn!(stage = %stage, error = %e, "스테이징 테이블 삭제 실패 (병합은 완료됨)");
            }
            (Err(_), Err(e)) => {
                warn!(stage = %stage, error = %e, "병합 실패 후 스테이징 테이블 삭제도 실패");
            }
        }

        let affected = merged?;
        let mut counts = LoadCounts::default();
        for row in rows {
            *counts.by_date.entry(row.rate_date).or_default() += 1;
        }
        counts.written = rows.len();

        info!(
            target_table = %self.target,
            rows = rows.len(),
            affected = affected,
            dates = counts.by_date.len(),
            "스테이징 병합 완료"
        );
        Ok(counts)
    }

    async fn stage_and_merge(&self, stage: &StageTable, rows: &[ResolvedRate]) -> FxResult<u64> {
        let staged = self
            .store
            .stage(&self.target, stage, rows)
            .await
            .map_err(|e| FxError::load(LoadStep::Stage, e))?;
        debug!(stage = %stage, staged = staged, "스테이징 적재 완료");

        self.store
            .merge(&self.target, stage)
            .await
            .map_err(|e| FxError::load(LoadStep::Merge, e))
    }
}

/// `(rate_date, currency)` 중복 제거. 나중 값이 우선하며 키 오름차순으로 정렬됩니다.
fn dedup_by_key(rows: &[ResolvedRate]) -> Vec<ResolvedRate> {
    let mut latest: HashMap<(NaiveDate, &str), &ResolvedRate> = HashMap::with_capacity(rows.len());
    for row in rows {
        latest.insert((row.rate_date, row.currency.as_str()), row);
    }
    let mut out: Vec<ResolvedRate> = latest.into_values().cloned().collect();
    out.sort_by(|a, b| {
        a.rate_date
            .cmp(&b.rate_date)
            .then_with(|| a.currency.cmp(&b.currency))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FailPoint, MemoryRateStore};
    use fx_core::Currency;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(d: NaiveDate, code: &str, rate: f64) -> ResolvedRate {
        ResolvedRate::new(d, Currency::parse(code).unwrap(), rate)
    }

    fn target() -> TargetTable {
        TargetTable::new("analytics", "ext", "fx_rates")
    }

    fn loader(store: &Arc<MemoryRateStore>, strategy: LoadStrategy) -> RateLoader {
        RateLoader::new(store.clone(), target(), strategy)
    }

    fn batch() -> Vec<ResolvedRate> {
        let d1 = date(2024, 3, 1);
        let d2 = date(2024, 3, 2);
        vec![
            row(d1, "EUR", 1.0852),
            row(d1, "GBP", 1.2686),
            row(d1, "USD", 1.0),
            row(d2, "EUR", 1.0852),
            row(d2, "GBP", 1.2686),
            row(d2, "USD", 1.0),
        ]
    }

    #[tokio::test]
    async fn test_ensure_table_creates_once() {
        let store = Arc::new(MemoryRateStore::new());
        let loader = loader(&store, LoadStrategy::DeleteInsert);

        loader.ensure_table().await.unwrap();
        loader.ensure_table().await.unwrap();
        assert_eq!(store.create_calls(), 1);

        // 이미 존재하는 테이블은 다시 만들지 않음
        let second = RateLoader::new(store.clone(), target(), LoadStrategy::Merge);
        second.ensure_table().await.unwrap();
        assert_eq!(store.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_ensure_table_failure_is_load_error() {
        let store = Arc::new(MemoryRateStore::new());
        store.fail_on(FailPoint::CreateTable);
        let err = loader(&store, LoadStrategy::Merge).ensure_table().await.unwrap_err();
        assert!(matches!(err, FxError::Load { step: LoadStep::EnsureTable, .. }));
    }

    #[tokio::test]
    async fn test_delete_insert_is_idempotent() {
        let store = Arc::new(MemoryRateStore::new());
        let loader = loader(&store, LoadStrategy::DeleteInsert);

        let first = loader.apply(&batch()).await.unwrap();
        let after_first = store.rows(&target());
        let second = loader.apply(&batch()).await.unwrap();

        assert_eq!(store.rows(&target()), after_first);
        assert_eq!(after_first.len(), 6);
        assert_eq!(first.deleted, 0);
        assert_eq!(second.deleted, 6);
        assert_eq!(second.by_date[&date(2024, 3, 2)], 3);
    }

    #[tokio::test]
    async fn test_delete_insert_wipes_stale_currencies() {
        let store = Arc::new(MemoryRateStore::new());
        let loader = loader(&store, LoadStrategy::DeleteInsert);
        let d = date(2024, 3, 1);

        loader.apply(&batch()).await.unwrap();
        loader
            .apply(&[row(d, "EUR", 1.09), row(d, "USD", 1.0)])
            .await
            .unwrap();

        assert_eq!(store.rate(&target(), d, "EUR"), Some(1.09));
        assert_eq!(store.rate(&target(), d, "GBP"), None);
        // 다른 날짜는 그대로
        assert_eq!(store.rate(&target(), date(2024, 3, 2), "GBP"), Some(1.2686));
    }

    #[tokio::test]
    async fn test_merge_is_idempotent_and_keeps_other_currencies() {
        let store = Arc::new(MemoryRateStore::new());
        let loader = loader(&store, LoadStrategy::Merge);
        let d = date(2024, 3, 1);

        loader.apply(&batch()).await.unwrap();
        let once = store.rows(&target());
        loader.apply(&batch()).await.unwrap();
        assert_eq!(store.rows(&target()), once);

        loader.apply(&[row(d, "EUR", 1.09)]).await.unwrap();
        assert_eq!(store.rate(&target(), d, "EUR"), Some(1.09));
        // 병합은 키 단위 업서트이므로 GBP는 남는다
        assert_eq!(store.rate(&target(), d, "GBP"), Some(1.2686));
        assert_eq!(store.live_stages(), 0);
        assert_eq!(store.dropped_stages().len(), 3);
    }

    #[tokio::test]
    async fn test_stage_dropped_when_merge_fails() {
        let store = Arc::new(MemoryRateStore::new());
        store.fail_on(FailPoint::Merge);
        let loader = loader(&store, LoadStrategy::Merge);

        let err = loader.apply(&batch()).await.unwrap_err();

        assert!(matches!(err, FxError::Load { step: LoadStep::Merge, .. }));
        assert_eq!(store.live_stages(), 0);
        assert_eq!(store.dropped_stages().len(), 1);
        assert!(store.rows(&target()).is_empty());
    }

    #[tokio::test]
    async fn test_merge_error_wins_over_cleanup_error() {
        let store = Arc::new(MemoryRateStore::new());
        store.fail_on(FailPoint::Merge);
        store.fail_on(FailPoint::DropStage);

        let err = loader(&store, LoadStrategy::Merge)
            .apply(&batch())
            .await
            .unwrap_err();
        assert!(matches!(err, FxError::Load { step: LoadStep::Merge, .. }));
    }

    #[tokio::test]
    async fn test_cleanup_failure_after_merge_is_not_fatal() {
        let store = Arc::new(MemoryRateStore::new());
        store.fail_on(FailPoint::DropStage);

        let counts = loader(&store, LoadStrategy::Merge)
            .apply(&batch())
            .await
            .unwrap();
        assert_eq!(counts.written, 6);
        assert_eq!(store.rows(&target()).len(), 6);
    }

    #[tokio::test]
    async fn test_failed_date_keeps_prior_dates() {
        let store = Arc::new(MemoryRateStore::new());
        store.fail_on(FailPoint::ReplaceDate(date(2024, 3, 2)));
        let loader = loader(&store, LoadStrategy::DeleteInsert);

        let err = loader.apply(&batch()).await.unwrap_err();

        assert_eq!(err.date(), Some(date(2024, 3, 2)));
        assert_eq!(store.rows(&target()).len(), 3);
        assert!(store.rows(&target()).iter().all(|r| r.rate_date == date(2024, 3, 1)));
    }

    #[tokio::test]
    async fn test_empty_rows_is_noop() {
        let store = Arc::new(MemoryRateStore::new());
        let counts = loader(&store, LoadStrategy::Merge).apply(&[]).await.unwrap();
        assert_eq!(counts, LoadCounts::default());
        assert_eq!(store.create_calls(), 0);
    }

    #[test]
    fn test_dedup_keeps_last_value() {
        let d = date(2024, 3, 1);
        let rows = vec![row(d, "GBP", 1.0), row(d, "EUR", 1.1), row(d, "GBP", 2.0)];
        let out = dedup_by_key(&rows);
        assert_eq!(out, vec![row(d, "EUR", 1.1), row(d, "GBP", 2.0)]);
    }
}
