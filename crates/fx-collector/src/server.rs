//! HTTP 트리거.
//!
//! - `GET /health`: liveness
//! - `GET /ingest?start=&end=&currencies=&strategy=`
//! - `POST /ingest` (같은 필드의 JSON 본문, 쿼리 파라미터가 우선)
//!
//! # 응답
//!
//! ```json
//! { "status": "ok", "total_inserted": 21, "by_date": [{ "date": "2024-03-02", "inserted": 7 }] }
//! ```
//!
//! 실패 시 `{ "status": "error", "code", "message", "date", "by_date" }`를 반환하며,
//! 입력 검증 실패는 400, 그 외는 500입니다.

use crate::pipeline::{IngestRequest, Orchestrator, RunError};
use crate::stats::DateOutcome;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use fx_core::{parse_currency_list, Currency, DateToken, FxError, FxResult, LoadStrategy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

/// 라우터 생성. 모든 요청이 하나의 오케스트레이터를 공유합니다.
pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ingest", get(ingest_query).post(ingest_body))
        .layer(TraceLayer::new_for_http())
        .with_state(orchestrator)
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// 쿼리 파라미터.
#[derive(Debug, Default, Deserialize)]
pub struct IngestQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    /// 쉼표 구분 (`EUR,GBP`)
    pub currencies: Option<String>,
    pub strategy: Option<String>,
}

/// JSON 본문.
#[derive(Debug, Default, Deserialize)]
pub struct IngestBody {
    pub start: Option<String>,
    pub end: Option<String>,
    pub currencies: Option<CurrencyField>,
    pub strategy: Option<String>,
}

/// 본문의 통화 목록은 배열 또는 쉼표 구분 문자열.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CurrencyField {
    List(Vec<String>),
    Csv(String),
}

impl CurrencyField {
    /// 통화 목록 해석.
    ///
    /// 빈 문자열은 지정하지 않은 것(설정 기본값)으로 취급하지만,
    /// 명시적인 배열은 비어 있어도 그대로 전달되어 검증에서 거부됩니다.
    fn into_currencies(self) -> FxResult<Option<Vec<Currency>>> {
        match self {
            Self::Csv(s) if s.trim().is_empty() => Ok(None),
            Self::Csv(s) => parse_currency_list(&s).map(Some),
            Self::List(items) => parse_currency_list(&items.join(",")).map(Some),
        }
    }
}

impl IngestBody {
    /// 쿼리 파라미터로 필드별 덮어쓰기 (쿼리 우선).
    fn overridden_by(self, query: IngestQuery) -> Self {
        Self {
            start: query.start.or(self.start),
            end: query.end.or(self.end),
            currencies: query.currencies.map(CurrencyField::Csv).or(self.currencies),
            strategy: query.strategy.or(self.strategy),
        }
    }

    /// 실행 요청으로 변환. 모든 검증은 여기서 끝납니다.
    fn into_request(self) -> FxResult<IngestRequest> {
        let start = self.start.map(|s| s.parse::<DateToken>()).transpose()?;
        let end = self.end.map(|s| s.parse::<DateToken>()).transpose()?;
        let currencies = match self.currencies {
            Some(field) => field.into_currencies()?,
            None => None,
        };
        let strategy = self
            .strategy
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<LoadStrategy>())
            .transpose()?;

        Ok(IngestRequest {
            start,
            end,
            currencies,
            strategy,
        })
    }
}

/// 성공 응답.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: String,
    pub total_inserted: usize,
    pub by_date: Vec<DateOutcome>,
}

/// 실패 응답 본문.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: String,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub by_date: Vec<DateOutcome>,
}

/// 트리거 에러.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(error: &FxError, date: Option<NaiveDate>, by_date: Vec<DateOutcome>) -> Self {
        let status = if error.is_validation() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            body: ErrorBody {
                status: "error".to_string(),
                code: error.code().to_string(),
                message: error.to_string(),
                date,
                by_date,
            },
        }
    }
}

impl From<FxError> for ApiError {
    fn from(error: FxError) -> Self {
        let date = error.date();
        Self::new(&error, date, Vec::new())
    }
}

impl From<RunError> for ApiError {
    fn from(err: RunError) -> Self {
        let date = err.date();
        Self::new(&err.error, date, err.summary.by_date)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(code = %self.body.code, message = %self.body.message, "수집 트리거 실패");
        } else {
            warn!(code = %self.body.code, message = %self.body.message, "잘못된 수집 요청");
        }
        (self.status, Json(self.body)).into_response()
    }
}

/// GET /ingest
pub async fn ingest_query(
    State(orchestrator): State<Arc<Orchestrator>>,
    Query(query): Query<IngestQuery>,
) -> Result<Json<IngestResponse>, ApiError> {
    trigger(&orchestrator, IngestBody::default().overridden_by(query)).await
}

/// POST /ingest
pub async fn ingest_body(
    State(orchestrator): State<Arc<Orchestrator>>,
    Query(query): Query<IngestQuery>,
    body: Bytes,
) -> Result<Json<IngestResponse>, ApiError> {
    let body: IngestBody = if body.iter().all(u8::is_ascii_whitespace) {
        IngestBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| FxError::InvalidInput(format!("invalid JSON body: {}", e)))?
    };
    trigger(&orchestrator, body.overridden_by(query)).await
}

async fn trigger(
    orchestrator: &Orchestrator,
    params: IngestBody,
) -> Result<Json<IngestResponse>, ApiError> {
    let request = params.into_request()?;
    let summary = orchestrator.run(request).await?;
    summary.log_summary("HTTP 수집");

    Ok(Json(IngestResponse {
        status: "ok".to_string(),
        total_inserted: summary.total_inserted,
        by_date: summary.by_date,
    }))
}
