//! 환율 수집 파이프라인.
//!
//! 한 번의 실행은 다음 순서로 진행됩니다:
//!
//! 1. 날짜 범위와 통화 목록 확정 (검증 실패 시 네트워크/저장소 호출 없이 종료)
//! 2. 소스에서 전체 이력을 한 번 조회
//! 3. 대상 테이블 확인/생성
//! 4. 날짜 오름차순으로 해석 후 적재
//!    - `delete_insert`: 날짜마다 즉시 적재 (날짜 단위 진행)
//!    - `merge`: 모든 날짜를 해석한 뒤 한 번에 병합
//!
//! 첫 번째 실패에서 실행을 멈추고, 그때까지 커밋된 날짜와 실패 날짜를 담은
//! 부분 요약을 `RunError`로 돌려줍니다.

use crate::stats::{DateOutcome, RunSummary};
use chrono::{NaiveDate, Utc};
use fx_core::{
    Currency, DateRange, DateToken, FxConfig, FxError, FxResult, IngestConfig, LoadStrategy,
    RateResolver, SnapshotTable, TargetTable,
};
use fx_data::{RateLoader, RateSource, RateStore};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// 실행 요청. 비어 있는 필드는 설정 기본값을 사용합니다.
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    pub start: Option<DateToken>,
    pub end: Option<DateToken>,
    pub currencies: Option<Vec<Currency>>,
    pub strategy: Option<LoadStrategy>,
}

impl IngestRequest {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_range(mut self, start: DateToken, end: DateToken) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    #[must_use]
    pub fn with_currencies(mut self, currencies: Vec<Currency>) -> Self {
        self.currencies = Some(currencies);
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: LoadStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

/// 실패한 실행. 부분 요약을 함께 보관합니다.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunError {
    pub error: FxError,
    pub summary: RunSummary,
}

impl RunError {
    /// 실패 날짜 (요약의 실패 항목 우선).
    pub fn date(&self) -> Option<NaiveDate> {
        self.summary
            .by_date
            .iter()
            .find(|o| o.is_failed())
            .map(|o| o.date)
            .or_else(|| self.error.date())
    }
}

/// 확정된 실행 계획.
#[derive(Debug)]
struct RunPlan {
    range: DateRange,
    currencies: Vec<Currency>,
    strategy: LoadStrategy,
}

/// 수집 오케스트레이터.
pub struct Orchestrator {
    source: Arc<dyn RateSource>,
    store: Arc<dyn RateStore>,
    target: TargetTable,
    resolver: RateResolver,
    defaults: IngestConfig,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn RateSource>,
        store: Arc<dyn RateStore>,
        target: TargetTable,
        defaults: IngestConfig,
    ) -> Self {
        let resolver = RateResolver::new(defaults.base_currency.clone())
            .with_lookback_days(defaults.lookback_days);
        Self {
            source,
            store,
            target,
            resolver,
            defaults,
        }
    }

    /// 설정으로 생성.
    pub fn from_config(
        config: &FxConfig,
        source: Arc<dyn RateSource>,
        store: Arc<dyn RateStore>,
    ) -> Self {
        Self::new(source, store, config.target.clone(), config.ingest.clone())
    }

    pub fn target(&self) -> &TargetTable {
        &self.target
    }

    /// 오늘(UTC) 기준으로 실행.
    pub async fn run(&self, request: IngestRequest) -> Result<RunSummary, RunError> {
        self.run_at(request, Utc::now().date_naive()).await
    }

    /// 지정한 오늘 날짜 기준으로 실행.
    #[instrument(skip(self, request), fields(target = %self.target, source = self.source.name()))]
    pub async fn run_at(
        &self,
        request: IngestRequest,
        today: NaiveDate,
    ) -> Result<RunSummary, RunError> {
        let started = Instant::now();
        let mut summary = RunSummary::new();

        let outcome = self.execute(&request, today, &mut summary).await;
        summary.elapsed = started.elapsed();

        match outcome {
            Ok(()) => Ok(summary),
            Err(error) => {
                summary.mark_failed();
                Err(RunError { error, summary })
            }
        }
    }

    async fn execute(
        &self,
        request: &IngestRequest,
        today: NaiveDate,
        summary: &mut RunSummary,
    ) -> FxResult<()> {
        let plan = self.plan(request, today)?;
        info!(
            range = %plan.range,
            dates = plan.range.len(),
            currencies = ?plan.currencies.iter().map(Currency::as_str).collect::<Vec<_>>(),
            base = %self.resolver.base(),
            strategy = %plan.strategy,
            "환율 수집 시작"
        );

        let table = self.source.fetch(&plan.range).await?;

        let loader = RateLoader::new(self.store.clone(), self.target.clone(), plan.strategy);
        loader.ensure_table().await?;

        match plan.strategy {
            LoadStrategy::DeleteInsert => self.load_each_date(&plan, &table, &loader, summary).await,
            LoadStrategy::Merge => self.load_batch(&plan, &table, &loader, summary).await,
        }
    }

    /// 요청과 설정 기본값으로 범위/통화/전략 확정.
    fn plan(&self, request: &IngestRequest, today: NaiveDate) -> FxResult<RunPlan> {
        let start = request.start.unwrap_or(self.defaults.start_date);
        let end = request.end.unwrap_or(self.defaults.end_date);
        let range = DateRange::new(start.resolve(today), end.resolve(today))?;

        let requested = request
            .currencies
            .as_ref()
            .unwrap_or(&self.defaults.currencies);
        let mut currencies: Vec<Currency> = Vec::with_capacity(requested.len());
        for currency in requested {
            if !currencies.contains(currency) {
                currencies.push(currency.clone());
            }
        }
        if currencies.is_empty() {
            return Err(FxError::InvalidInput("no currencies provided".to_string()));
        }

        Ok(RunPlan {
            range,
            currencies,
            strategy: request.strategy.unwrap_or(self.defaults.load_strategy),
        })
    }

    /// 날짜별 해석 후 즉시 적재.
    async fn load_each_date(
        &self,
        plan: &RunPlan,
        table: &SnapshotTable,
        loader: &RateLoader,
        summary: &mut RunSummary,
    ) -> FxResult<()> {
        for date in plan.range.days() {
            let resolution = match self.resolver.resolve(table, date, &plan.currencies) {
                Ok(resolution) => resolution,
                Err(e) => {
                    warn!(date = %date, error = %e, "환율 해석 실패");
                    summary.record_failed(DateOutcome::failed(date, &e));
                    return Err(e);
                }
            };

            let counts = match loader.apply(&resolution.rates).await {
                Ok(counts) => counts,
                Err(e) => {
                    warn!(date = %date, error = %e, "날짜 적재 실패");
                    summary.record_failed(DateOutcome::failed(date, &e));
                    return Err(e);
                }
            };

            if resolution.is_fallback() {
                info!(
                    date = %date,
                    snapshot_date = %resolution.snapshot_date,
                    "이전 스냅샷으로 대체"
                );
            }
            debug!(date = %date, inserted = counts.written, "날짜 적재 완료");
            summary.record_loaded(DateOutcome::loaded(
                date,
                resolution.snapshot_date,
                counts.written,
            ));
        }
        Ok(())
    }

    /// 전체 날짜 해석 후 한 번에 병합.
    async fn load_batch(
        &self,
        plan: &RunPlan,
        table: &SnapshotTable,
        loader: &RateLoader,
        summary: &mut RunSummary,
    ) -> FxResult<()> {
        let mut pending = Vec::with_capacity(plan.range.len());
        let mut rows = Vec::new();

        for date in plan.range.days() {
            let resolution = match self.resolver.resolve(table, date, &plan.currencies) {
                Ok(resolution) => resolution,
                Err(e) => {
                    warn!(date = %date, error = %e, "환율 해석 실패 (병합 전 중단)");
                    summary.record_failed(DateOutcome::failed(date, &e));
                    return Err(e);
                }
            };
            pending.push(DateOutcome::loaded(
                date,
                resolution.snapshot_date,
                resolution.rates.len(),
            ));
            rows.extend(resolution.rates);
        }

        // 병합이 실패하면 커밋된 날짜가 없으므로 요약에 기록하지 않음
        loader.apply(&rows).await?;

        for outcome in pending {
            summary.record_loaded(outcome);
        }
        Ok(())
    }
}
