//! 환율 수집 파이프라인의 에러 타입.
//!
//! 입력 검증, 소스 조회, 환율 해석, 적재 단계에서 발생하는 에러를 하나의
//! 열거형으로 정의합니다. HTTP 트리거는 `is_validation()`으로 4xx/5xx를 구분합니다.

use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

/// 적재 실패 지점.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStep {
    /// 대상 테이블 확인/생성
    EnsureTable,
    /// 특정 날짜의 삭제 후 삽입
    Replace(NaiveDate),
    /// 스테이징 테이블 적재
    Stage,
    /// 스테이징 → 대상 병합
    Merge,
}

impl LoadStep {
    /// 실패 지점이 특정 날짜에 묶여 있으면 해당 날짜를 반환합니다.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Self::Replace(date) => Some(*date),
            _ => None,
        }
    }
}

impl fmt::Display for LoadStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnsureTable => write!(f, "ensure_table"),
            Self::Replace(date) => write!(f, "replace({})", date),
            Self::Stage => write!(f, "stage"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

/// 환율 수집 에러.
#[derive(Debug, Error)]
pub enum FxError {
    /// 종료일이 시작일보다 앞섬
    #[error("Invalid date range: end {end} is before start {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    /// 잘못된 입력 (날짜 토큰, 통화 코드, 빈 통화 목록 등)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 재시도 소진 후에도 소스 조회 실패
    #[error("Rate source unavailable after {attempts} attempt(s) ({url}): {reason}")]
    SourceUnavailable {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// 소스 페이로드 형식 오류
    #[error("Malformed rate source: {0}")]
    MalformedSource(String),

    /// 조회 범위 내 사용 가능한 스냅샷 없음
    #[error("No rate snapshot found for {0} within the lookback window")]
    NoRateFound(NaiveDate),

    /// 선택된 스냅샷에 기준 통화 환율이 없음
    #[error("Snapshot {snapshot} (requested {requested}) has no usable {base} rate")]
    MissingBaseRate {
        requested: NaiveDate,
        snapshot: NaiveDate,
        base: String,
    },

    /// 저장소 작업 실패
    #[error("Load failed at {step}: {cause}")]
    Load { step: LoadStep, cause: String },

    /// 설정 오류
    #[error("Configuration error: {0}")]
    Config(String),
}

/// 환율 수집 작업을 위한 Result 타입.
pub type FxResult<T> = Result<T, FxError>;

impl FxError {
    /// 사용자 입력 검증 에러인지 확인합니다 (HTTP 4xx 대상).
    pub fn is_validation(&self) -> bool {
        matches!(self, FxError::InvalidRange { .. } | FxError::InvalidInput(_))
    }

    /// 에러와 연관된 날짜 (알 수 있는 경우).
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            FxError::NoRateFound(date) => Some(*date),
            FxError::MissingBaseRate { requested, .. } => Some(*requested),
            FxError::Load { step, .. } => step.date(),
            _ => None,
        }
    }

    /// 응답 본문에 사용하는 에러 코드.
    pub fn code(&self) -> &'static str {
        match self {
            FxError::InvalidRange { .. } => "INVALID_RANGE",
            FxError::InvalidInput(_) => "INVALID_INPUT",
            FxError::SourceUnavailable { .. } => "SOURCE_UNAVAILABLE",
            FxError::MalformedSource(_) => "MALFORMED_SOURCE",
            FxError::NoRateFound(_) => "NO_RATE_FOUND",
            FxError::MissingBaseRate { .. } => "MISSING_BASE_RATE",
            FxError::Load { .. } => "LOAD_ERROR",
            FxError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// 적재 에러 생성 헬퍼.
    pub fn load(step: LoadStep, cause: impl fmt::Display) -> Self {
        FxError::Load {
            step,
            cause: cause.to_string(),
        }
    }
}

impl From<config::ConfigError> for FxError {
    fn from(err: config::ConfigError) -> Self {
        FxError::Config(err.to_string())
    }
}
