//! 인메모리 저장소 (테스트용).
//!
//! PostgreSQL 저장소와 같은 키 의미(`(rate_date, currency)` 단일 키)를 따르며,
//! 실패 지점을 주입해 적재기의 오류 처리와 스테이징 정리를 검증할 수 있습니다.

use super::{RateStore, ReplaceCounts, StageTable};
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use chrono::NaiveDate;
use fx_core::{Currency, ResolvedRate, TargetTable};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// 주입 가능한 실패 지점.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailPoint {
    CreateTable,
    ReplaceDate(NaiveDate),
    Stage,
    Merge,
    DropStage,
}

type Rows = BTreeMap<(NaiveDate, Currency), f64>;

#[derive(Default)]
struct State {
    tables: HashMap<String, Rows>,
    stages: HashMap<String, Vec<ResolvedRate>>,
    dropped_stages: Vec<String>,
    fail_points: Vec<FailPoint>,
    create_calls: usize,
}

/// 인메모리 환율 저장소.
#[derive(Default)]
pub struct MemoryRateStore {
    state: Mutex<State>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 실패 지점 추가.
    pub fn fail_on(&self, point: FailPoint) {
        self.lock().fail_points.push(point);
    }

    /// 대상 테이블의 모든 행 (키 오름차순).
    pub fn rows(&self, target: &TargetTable) -> Vec<ResolvedRate> {
        self.lock()
            .tables
            .get(&target.to_string())
            .map(|rows| {
                rows.iter()
                    .map(|((date, ccy), rate)| ResolvedRate::new(*date, ccy.clone(), *rate))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 특정 행의 값.
    pub fn rate(&self, target: &TargetTable, date: NaiveDate, currency: &str) -> Option<f64> {
        let currency = Currency::parse(currency).ok()?;
        self.lock()
            .tables
            .get(&target.to_string())
            .and_then(|rows| rows.get(&(date, currency)).copied())
    }

    /// 남아 있는 스테이징 테이블 수.
    pub fn live_stages(&self) -> usize {
        self.lock().stages.len()
    }

    /// 삭제된 스테이징 테이블 이름.
    pub fn dropped_stages(&self) -> Vec<String> {
        self.lock().dropped_stages.clone()
    }

    /// `create_table` 호출 횟수.
    pub fn create_calls(&self) -> usize {
        self.lock().create_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // 테스트 중 패닉으로 오염되어도 상태는 계속 사용
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl State {
    fn check(&self, point: FailPoint) -> Result<()> {
        if self.fail_points.contains(&point) {
            return Err(StorageError::QueryError(format!("injected failure: {:?}", point)));
        }
        Ok(())
    }

    fn table_mut(&mut self, target: &TargetTable) -> Result<&mut Rows> {
        self.tables
            .get_mut(&target.to_string())
            .ok_or_else(|| StorageError::QueryError(format!("relation {} does not exist", target)))
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn table_exists(&self, target: &TargetTable) -> Result<bool> {
        Ok(self.lock().tables.contains_key(&target.to_string()))
    }

    async fn create_table(&self, target: &TargetTable) -> Result<()> {
        let mut state = self.lock();
        state.check(FailPoint::CreateTable)?;
        state.create_calls += 1;
        state.tables.entry(target.to_string()).or_default();
        Ok(())
    }

    async fn replace_date(
        &self,
        target: &TargetTable,
        date: NaiveDate,
        rows: &[ResolvedRate],
    ) -> Result<ReplaceCounts> {
        let mut state = self.lock();
        state.check(FailPoint::ReplaceDate(date))?;
        let table = state.table_mut(target)?;

        let before = table.len();
        table.retain(|(d, _), _| *d != date);
        let deleted = (before - table.len()) as u64;

        for row in rows {
            table.insert((row.rate_date, row.currency.clone()), row.rate_to_base);
        }

        Ok(ReplaceCounts {
            deleted,
            inserted: rows.len() as u64,
        })
    }

    async fn stage(
        &self,
        _target: &TargetTable,
        stage: &StageTable,
        rows: &[ResolvedRate],
    ) -> Result<u64> {
        let mut state = self.lock();
        state.check(FailPoint::Stage)?;
        if state.stages.contains_key(&stage.to_string()) {
            return Err(StorageError::AlreadyExists(stage.to_string()));
        }
        state.stages.insert(stage.to_string(), rows.to_vec());
        Ok(rows.len() as u64)
    }

    async fn merge(&self, target: &TargetTable, stage: &StageTable) -> Result<u64> {
        let mut state = self.lock();
        state.check(FailPoint::Merge)?;
        let staged = state
            .stages
            .get(&stage.to_string())
            .cloned()
            .ok_or_else(|| StorageError::QueryError(format!("relation {} does not exist", stage)))?;

        let table = state.table_mut(target)?;
        for row in &staged {
            table.insert((row.rate_date, row.currency.clone()), row.rate_to_base);
        }
        Ok(staged.len() as u64)
    }

    async fn drop_stage(&self, stage: &StageTable) -> Result<()> {
        let mut state = self.lock();
        state.check(FailPoint::DropStage)?;
        state.stages.remove(&stage.to_string());
        state.dropped_stages.push(stage.to_string());
        Ok(())
    }
}
