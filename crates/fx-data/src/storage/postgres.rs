//! PostgreSQL 환율 저장소.
//!
//! # 스키마
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS "ext"."fx_rates" (
//!     rate_date    DATE             NOT NULL,
//!     currency     VARCHAR(8)       NOT NULL,
//!     rate_to_base DOUBLE PRECISION NOT NULL,
//!     PRIMARY KEY (rate_date, currency)
//! );
//! ```
//!
//! 식별자는 설정 로드 시 단순 식별자로 검증되며, 여기서는 따옴표로 감싸기만 합니다.
//! 대량 삽입은 배열 바인딩 + `UNNEST`로 한 번의 쿼리로 처리합니다.

use super::{RateStore, ReplaceCounts, StageTable};
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use chrono::NaiveDate;
use fx_core::{DatabaseConfig, ResolvedRate, TargetTable};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// PostgreSQL 저장소.
#[derive(Clone)]
pub struct PgRateStore {
    pool: PgPool,
}

impl PgRateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 설정으로 연결 풀 생성.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(StorageError::ConnectionError(
                "database url is not configured (DATABASE_URL)".to_string(),
            ));
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        info!(max_connections = config.max_connections, "데이터베이스 연결 성공");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// `"schema"."table"`
fn qualified(dataset: &str, table: &str) -> String {
    format!("\"{}\".\"{}\"", dataset, table)
}

fn create_table_sql(target: &TargetTable) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            rate_date    DATE             NOT NULL,
            currency     VARCHAR(8)       NOT NULL,
            rate_to_base DOUBLE PRECISION NOT NULL,
            PRIMARY KEY (rate_date, currency)
        )
        "#,
        qualified(&target.dataset, &target.table)
    )
}

/// 배열 파라미터 `$1..$3`을 펼쳐 삽입하고, 키가 겹치면 값을 갱신합니다.
fn upsert_unnest_sql(dataset: &str, table: &str) -> String {
    format!(
        r#"
        INSERT INTO {} (rate_date, currency, rate_to_base)
        SELECT * FROM UNNEST($1::date[], $2::text[], $3::float8[])
        ON CONFLICT (rate_date, currency)
        DO UPDATE SET rate_to_base = EXCLUDED.rate_to_base
        "#,
        qualified(dataset, table)
    )
}

fn merge_sql(target: &TargetTable, stage: &StageTable) -> String {
    format!(
        r#"
        INSERT INTO {} (rate_date, currency, rate_to_base)
        SELECT rate_date, currency, rate_to_base FROM {}
        ON CONFLICT (rate_date, currency)
        DO UPDATE SET rate_to_base = EXCLUDED.rate_to_base
        "#,
        qualified(&target.dataset, &target.table),
        qualified(&stage.dataset, &stage.table)
    )
}

/// 행을 컬럼별 배열로 분해.
fn columns(rows: &[ResolvedRate]) -> (Vec<NaiveDate>, Vec<String>, Vec<f64>) {
    let mut dates = Vec::with_capacity(rows.len());
    let mut currencies = Vec::with_capacity(rows.len());
    let mut rates = Vec::with_capacity(rows.len());
    for row in rows {
        dates.push(row.rate_date);
        currencies.push(row.currency.as_str().to_string());
        rates.push(row.rate_to_base);
    }
    (dates, currencies, rates)
}

#[async_trait]
impl RateStore for PgRateStore {
    #[instrument(skip(self), fields(target = %target))]
    async fn table_exists(&self, target: &TargetTable) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            )
            "#,
        )
        .bind(&target.dataset)
        .bind(&target.table)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    #[instrument(skip(self), fields(target = %target))]
    async fn create_table(&self, target: &TargetTable) -> Result<()> {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", target.dataset))
            .execute(&self.pool)
            .await?;

        sqlx::query(&create_table_sql(target))
            .execute(&self.pool)
            .await?;

        info!("환율 테이블 생성 완료");
        Ok(())
    }

    #[instrument(skip(self, rows), fields(target = %target, rows = rows.len()))]
    async fn replace_date(
        &self,
        target: &TargetTable,
        date: NaiveDate,
        rows: &[ResolvedRate],
    ) -> Result<ReplaceCounts> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        let deleted = sqlx::query(&format!(
            "DELETE FROM {} WHERE rate_date = $1",
            qualified(&target.dataset, &target.table)
        ))
        .bind(date)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let mut inserted = 0;
        if !rows.is_empty() {
            let (dates, currencies, rates) = columns(rows);
            inserted = sqlx::query(&upsert_unnest_sql(&target.dataset, &target.table))
                .bind(dates)
                .bind(currencies)
                .bind(rates)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        debug!(deleted = deleted, inserted = inserted, "날짜 교체 완료");
        Ok(ReplaceCounts { deleted, inserted })
    }

    #[instrument(skip(self, rows), fields(stage = %stage, rows = rows.len()))]
    async fn stage(
        &self,
        target: &TargetTable,
        stage: &StageTable,
        rows: &[ResolvedRate],
    ) -> Result<u64> {
        sqlx::query(&format!(
            "CREATE UNLOGGED TABLE {} (LIKE {} INCLUDING DEFAULTS)",
            qualified(&stage.dataset, &stage.table),
            qualified(&target.dataset, &target.table)
        ))
        .execute(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(0);
        }

        let (dates, currencies, rates) = columns(rows);
        let staged = sqlx::query(&format!(
            "INSERT INTO {} (rate_date, currency, rate_to_base) \
             SELECT * FROM UNNEST($1::date[], $2::text[], $3::float8[])",
            qualified(&stage.dataset, &stage.table)
        ))
        .bind(dates)
        .bind(currencies)
        .bind(rates)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(staged)
    }

    #[instrument(skip(self), fields(target = %target, stage = %stage))]
    async fn merge(&self, target: &TargetTable, stage: &StageTable) -> Result<u64> {
        let affected = sqlx::query(&merge_sql(target, stage))
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected)
    }

    #[instrument(skip(self), fields(stage = %stage))]
    async fn drop_stage(&self, stage: &StageTable) -> Result<()> {
        sqlx::query(&format!(
            "DROP TABLE IF EXISTS {}",
            qualified(&stage.dataset, &stage.table)
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
