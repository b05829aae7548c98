//! 수집 파이프라인 통합 테스트.
//!
//! 소스(mockito 또는 고정 테이블)와 인메모리 저장소로 전체 실행을 검증합니다.

use async_trait::async_trait;
use chrono::NaiveDate;
use fx_collector::{IngestRequest, Orchestrator, RunStatus};
use fx_core::{
    Currency, DateRange, DateToken, FxError, FxResult, IngestConfig, LoadStep, LoadStrategy,
    RateSnapshot, SnapshotTable, SourceConfig, TargetTable,
};
use fx_data::{EcbRateSource, FailPoint, MemoryRateStore, RateSource, RetryConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const HISTORY_CSV: &str = "\
Date,USD,JPY,GBP,
2024-03-04,1.0853,162.88,0.8557,
2024-03-01,1.0852,162.51,0.8554,
2024-02-29,1.0813,162.40,0.8562,
";

/// 호출 횟수를 세는 고정 테이블 소스.
struct CountingSource {
    table: SnapshotTable,
    calls: AtomicUsize,
}

impl CountingSource {
    fn new(snapshots: Vec<(NaiveDate, f64, f64)>) -> Arc<Self> {
        let table = SnapshotTable::from_snapshots(
            Currency::eur(),
            snapshots.into_iter().map(|(date, usd, gbp)| {
                RateSnapshot::new(
                    date,
                    HashMap::from([(ccy("USD"), usd), (ccy("GBP"), gbp)]),
                )
            }),
        );
        Arc::new(Self {
            table,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateSource for CountingSource {
    async fn fetch(&self, _window: &DateRange) -> FxResult<SnapshotTable> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.table.clone())
    }

    fn name(&self) -> &str {
        "counting"
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn ccy(code: &str) -> Currency {
    Currency::parse(code).unwrap()
}

fn target() -> TargetTable {
    TargetTable::new("analytics", "ext", "fx_rates")
}

fn orchestrator(source: Arc<dyn RateSource>, store: Arc<MemoryRateStore>) -> Orchestrator {
    Orchestrator::new(source, store, target(), IngestConfig::default())
}

fn request(start: NaiveDate, end: NaiveDate, currencies: &[&str]) -> IngestRequest {
    IngestRequest::new()
        .with_range(DateToken::Fixed(start), DateToken::Fixed(end))
        .with_currencies(currencies.iter().map(|c| ccy(c)).collect())
}

fn friday_source() -> Arc<CountingSource> {
    CountingSource::new(vec![
        (date(2024, 2, 29), 1.0813, 0.8562),
        (date(2024, 3, 1), 1.0852, 0.8554),
        (date(2024, 3, 4), 1.0853, 0.8557),
    ])
}

#[tokio::test]
async fn test_saturday_run_against_http_source() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/eurofxref-hist.csv")
        .with_status(200)
        .with_body(HISTORY_CSV)
        .expect(1)
        .create_async()
        .await;

    let config = SourceConfig {
        url: format!("{}/eurofxref-hist.csv", server.url()),
        timeout_secs: 5,
        ..Default::default()
    };
    let source = EcbRateSource::new(&config)
        .unwrap()
        .with_required_column(Currency::usd())
        .with_retry(RetryConfig {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        });
    let store = Arc::new(MemoryRateStore::new());
    let orch = orchestrator(Arc::new(source), store.clone());

    let saturday = date(2024, 3, 2);
    let summary = orch
        .run_at(request(saturday, saturday, &["eur", "gbp"]), date(2024, 3, 3))
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Ok);
    assert_eq!(summary.total_inserted, 3);
    assert_eq!(summary.fallbacks, 1);

    let rows = store.rows(&target());
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.rate_date == saturday));
    assert_eq!(store.rate(&target(), saturday, "EUR"), Some(1.0852));
    assert!((store.rate(&target(), saturday, "GBP").unwrap() - 1.0852 / 0.8554).abs() < 1e-12);
    assert_eq!(store.rate(&target(), saturday, "USD"), Some(1.0));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_inverted_range_fails_before_any_io() {
    let source = friday_source();
    let store = Arc::new(MemoryRateStore::new());
    let orch = orchestrator(source.clone(), store.clone());

    let err = orch
        .run_at(request(date(2024, 3, 5), date(2024, 3, 1), &["EUR"]), date(2024, 3, 6))
        .await
        .unwrap_err();

    assert!(matches!(err.error, FxError::InvalidRange { .. }));
    assert_eq!(err.summary.status, RunStatus::Error);
    assert!(err.summary.by_date.is_empty());
    assert_eq!(source.calls(), 0);
    assert_eq!(store.create_calls(), 0);
}

#[tokio::test]
async fn test_source_is_fetched_once_per_run() {
    let source = friday_source();
    let store = Arc::new(MemoryRateStore::new());
    let orch = orchestrator(source.clone(), store.clone());

    let summary = orch
        .run_at(request(date(2024, 2, 29), date(2024, 3, 4), &["GBP"]), date(2024, 3, 5))
        .await
        .unwrap();

    assert_eq!(source.calls(), 1);
    assert_eq!(summary.by_date.len(), 5);
    // 03-02, 03-03 → 03-01 스냅샷
    assert_eq!(summary.fallbacks, 2);
    assert_eq!(store.rows(&target()).len(), 10);
}

#[tokio::test]
async fn test_failure_keeps_committed_dates() {
    let store = Arc::new(MemoryRateStore::new());
    store.fail_on(FailPoint::ReplaceDate(date(2024, 3, 2)));
    let orch = orchestrator(friday_source(), store.clone());

    let err = orch
        .run_at(request(date(2024, 3, 1), date(2024, 3, 3), &["EUR"]), date(2024, 3, 4))
        .await
        .unwrap_err();

    assert!(matches!(
        err.error,
        FxError::Load { step: LoadStep::Replace(d), .. } if d == date(2024, 3, 2)
    ));
    assert_eq!(err.date(), Some(date(2024, 3, 2)));

    let outcomes = &err.summary.by_date;
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].date, date(2024, 3, 1));
    assert_eq!(outcomes[0].inserted, 2);
    assert!(outcomes[1].is_failed());
    assert_eq!(err.summary.total_inserted, 2);

    let rows = store.rows(&target());
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.rate_date == date(2024, 3, 1)));
}

#[tokio::test]
async fn test_reruns_are_idempotent_for_both_strategies() {
    for strategy in [LoadStrategy::DeleteInsert, LoadStrategy::Merge] {
        let store = Arc::new(MemoryRateStore::new());
        let orch = orchestrator(friday_source(), store.clone());
        let req = request(date(2024, 2, 29), date(2024, 3, 4), &["EUR", "GBP"])
            .with_strategy(strategy);

        orch.run_at(req.clone(), date(2024, 3, 5)).await.unwrap();
        let first = store.rows(&target());
        orch.run_at(req, date(2024, 3, 5)).await.unwrap();

        assert_eq!(store.rows(&target()), first, "strategy {strategy}");
        assert_eq!(first.len(), 15);
        assert_eq!(store.live_stages(), 0);
    }
}

#[tokio::test]
async fn test_revised_rates_overwrite_previous_run() {
    let store = Arc::new(MemoryRateStore::new());
    let friday = date(2024, 3, 1);

    let first = orchestrator(friday_source(), store.clone());
    first
        .run_at(request(friday, friday, &["GBP"]), date(2024, 3, 2))
        .await
        .unwrap();

    let revised = CountingSource::new(vec![(friday, 1.10, 0.88)]);
    let second = orchestrator(revised, store.clone());
    second
        .run_at(
            request(friday, friday, &["GBP"]).with_strategy(LoadStrategy::Merge),
            date(2024, 3, 2),
        )
        .await
        .unwrap();

    let gbp = store.rate(&target(), friday, "GBP").unwrap();
    assert!((gbp - 1.10 / 0.88).abs() < 1e-12);
    assert_eq!(store.rows(&target()).len(), 2);
}

#[tokio::test]
async fn test_merge_failure_leaves_table_untouched() {
    let store = Arc::new(MemoryRateStore::new());
    store.fail_on(FailPoint::Merge);
    let orch = orchestrator(friday_source(), store.clone());

    let err = orch
        .run_at(
            request(date(2024, 3, 1), date(2024, 3, 4), &["EUR"]).with_strategy(LoadStrategy::Merge),
            date(2024, 3, 5),
        )
        .await
        .unwrap_err();

    assert!(matches!(err.error, FxError::Load { step: LoadStep::Merge, .. }));
    assert!(err.summary.by_date.is_empty());
    assert!(store.rows(&target()).is_empty());
    assert_eq!(store.live_stages(), 0);
}
