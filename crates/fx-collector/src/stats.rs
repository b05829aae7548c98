//! 수집 실행 요약.

use chrono::NaiveDate;
use serde::Serialize;
use std::time::Duration;

/// 실행 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Ok,
    Error,
}

/// 날짜별 결과.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateOutcome {
    pub date: NaiveDate,
    /// 적재된 행 수 (실패한 날짜는 0)
    pub inserted: usize,
    /// 실제 사용한 스냅샷 날짜
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_date: Option<NaiveDate>,
    /// 실패 메시지
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DateOutcome {
    pub fn loaded(date: NaiveDate, snapshot_date: NaiveDate, inserted: usize) -> Self {
        Self {
            date,
            inserted,
            snapshot_date: Some(snapshot_date),
            error: None,
        }
    }

    pub fn failed(date: NaiveDate, error: impl ToString) -> Self {
        Self {
            date,
            inserted: 0,
            snapshot_date: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// 수집 실행 통계.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub status: RunStatus,
    /// 날짜 오름차순 결과
    pub by_date: Vec<DateOutcome>,
    /// 적재된 총 행 수
    pub total_inserted: usize,
    /// 이전 스냅샷으로 대체된 날짜 수
    pub fallbacks: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            status: RunStatus::Ok,
            by_date: Vec::new(),
            total_inserted: 0,
            fallbacks: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// 적재 성공 날짜 기록.
    pub fn record_loaded(&mut self, outcome: DateOutcome) {
        if outcome.snapshot_date.is_some_and(|s| s != outcome.date) {
            self.fallbacks += 1;
        }
        self.total_inserted += outcome.inserted;
        self.by_date.push(outcome);
    }

    /// 실패 날짜 기록. 이후 상태는 `Error`.
    pub fn record_failed(&mut self, outcome: DateOutcome) {
        self.status = RunStatus::Error;
        self.by_date.push(outcome);
    }

    /// 날짜와 무관한 실패 (소스 조회, 테이블 생성 등).
    pub fn mark_failed(&mut self) {
        self.status = RunStatus::Error;
    }

    pub fn is_ok(&self) -> bool {
        self.status == RunStatus::Ok
    }

    /// 성공한 날짜 수.
    pub fn loaded_dates(&self) -> usize {
        self.by_date.iter().filter(|o| !o.is_failed()).count()
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        if self.is_ok() {
            tracing::info!(
                operation = operation,
                dates = self.by_date.len(),
                total_inserted = self.total_inserted,
                fallbacks = self.fallbacks,
                elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
                "수집 완료"
            );
        } else {
            tracing::error!(
                operation = operation,
                loaded_dates = self.loaded_dates(),
                total_inserted = self.total_inserted,
                failed_date = ?self.by_date.iter().find(|o| o.is_failed()).map(|o| o.date),
                elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
                "수집 실패"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_record_counts_fallbacks() {
        let mut summary = RunSummary::new();
        summary.record_loaded(DateOutcome::loaded(date(1), date(1), 3));
        summary.record_loaded(DateOutcome::loaded(date(2), date(1), 3));
        summary.record_loaded(DateOutcome::loaded(date(3), date(1), 3));

        assert!(summary.is_ok());
        assert_eq!(summary.total_inserted, 9);
        assert_eq!(summary.fallbacks, 2);
        assert_eq!(summary.loaded_dates(), 3);
    }

    #[test]
    fn test_failed_date_flips_status() {
        let mut summary = RunSummary::new();
        summary.record_loaded(DateOutcome::loaded(date(1), date(1), 3));
        summary.record_failed(DateOutcome::failed(date(2), "boom"));

        assert!(!summary.is_ok());
        assert_eq!(summary.total_inserted, 3);
        assert_eq!(summary.loaded_dates(), 1);
        assert_eq!(summary.by_date[1].error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_serialized_shape() {
        let mut summary = RunSummary::new();
        summary.record_loaded(DateOutcome::loaded(date(2), date(1), 3));
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["status"], "ok");
        assert_eq!(json["total_inserted"], 3);
        assert_eq!(json["by_date"][0]["date"], "2024-03-02");
        assert_eq!(json["by_date"][0]["snapshot_date"], "2024-03-01");
        assert!(json["by_date"][0].get("error").is_none());
        assert!(json.get("elapsed").is_none());
    }
}
