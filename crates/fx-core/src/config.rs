//! 설정 관리.
//!
//! 설정은 시작 시 한 번 로드되어 각 구성 요소의 생성자로 전달됩니다.
//! 로드 순서는 기본값 → TOML 파일 → 환경 변수(`FX__SECTION__KEY`)이며,
//! `DATABASE_URL` 환경 변수는 `database.url`보다 우선합니다.

use crate::error::{FxError, FxResult};
use crate::resolver::DEFAULT_LOOKBACK_DAYS;
use crate::types::{Currency, DateSpec, DateToken};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// 기본 설정 파일 경로.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// ECB 전체 이력 아카이브.
pub const ECB_HISTORY_URL: &str = "https://www.ecb.europa.eu/stats/eurofxref/eurofxref-hist.zip";

/// 애플리케이션 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FxConfig {
    /// 적재 대상 테이블
    pub target: TargetTable,
    /// 환율 소스 설정
    #[serde(default)]
    pub source: SourceConfig,
    /// 수집 기본값
    #[serde(default)]
    pub ingest: IngestConfig,
    /// 데이터베이스 설정
    #[serde(default)]
    pub database: DatabaseConfig,
    /// HTTP 트리거 서버 설정
    #[serde(default)]
    pub server: ServerConfig,
}

/// 세 부분으로 된 대상 테이블 이름 (`project.dataset.table`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TargetTable {
    /// 프로젝트/카탈로그 (Postgres에서는 연결된 데이터베이스)
    pub project: String,
    /// 데이터셋/스키마
    #[serde(default = "default_dataset")]
    pub dataset: String,
    /// 테이블
    #[serde(default = "default_table")]
    pub table: String,
}

impl TargetTable {
    pub fn new(
        project: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// 식별자 검증 (SQL에 그대로 삽입되므로 단순 식별자만 허용).
    pub fn validate(&self) -> FxResult<()> {
        for (name, value) in [
            ("target.project", &self.project),
            ("target.dataset", &self.dataset),
            ("target.table", &self.table),
        ] {
            if !is_identifier(value) {
                return Err(FxError::Config(format!(
                    "{} must be a plain identifier, got {:?}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for TargetTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// 환율 소스 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    /// 벌크 이력 파일 URL
    pub url: String,
    /// 소스가 시세를 표기하는 앵커 통화
    pub anchor_currency: Currency,
    /// 요청당 타임아웃 (초)
    pub timeout_secs: u64,
    /// 최대 시도 횟수 (첫 요청 포함)
    pub max_attempts: u32,
    /// 백오프 시작 지연 (밀리초)
    pub backoff_base_ms: u64,
    /// 백오프 최대 지연 (밀리초)
    pub backoff_max_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: ECB_HISTORY_URL.to_string(),
            anchor_currency: Currency::eur(),
            timeout_secs: 60,
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 8_000,
        }
    }
}

impl SourceConfig {
    /// 요청당 타임아웃을 Duration으로 반환
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 적재 전략.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStrategy {
    /// 날짜별 삭제 후 삽입 (날짜 단위 진행 상황 확인 가능)
    #[default]
    DeleteInsert,
    /// 스테이징 후 일괄 병합 (한 번의 MERGE)
    Merge,
}

impl FromStr for LoadStrategy {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "delete_insert" => Ok(Self::DeleteInsert),
            "merge" => Ok(Self::Merge),
            other => Err(FxError::InvalidInput(format!(
                "unknown load strategy: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeleteInsert => f.write_str("delete_insert"),
            Self::Merge => f.write_str("merge"),
        }
    }
}

/// 수집 기본값.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestConfig {
    /// 출력 기준 통화
    pub base_currency: Currency,
    /// 기본 수집 통화 목록
    pub currencies: Vec<Currency>,
    /// 시작일 토큰 (`yesterday` 또는 `YYYY-MM-DD`)
    pub start_date: DateToken,
    /// 종료일 토큰
    pub end_date: DateToken,
    /// 스냅샷 역방향 탐색 일수
    pub lookback_days: u32,
    /// 적재 전략
    pub load_strategy: LoadStrategy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        let currencies = ["USD", "EUR", "GBP", "ILS", "CAD", "AUD"]
            .iter()
            .filter_map(|c| Currency::parse(c).ok())
            .collect();
        Self {
            base_currency: Currency::usd(),
            currencies,
            start_date: DateToken::Yesterday,
            end_date: DateToken::Yesterday,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            load_strategy: LoadStrategy::DeleteInsert,
        }
    }
}

impl IngestConfig {
    /// 기본 날짜 범위 토큰.
    pub fn date_spec(&self) -> DateSpec {
        DateSpec::new(self.start_date, self.end_date)
    }
}

/// 데이터베이스 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 연결 URL
    pub url: String,
    /// 최대 연결 수
    pub max_connections: u32,
    /// 연결 타임아웃 (초)
    pub connection_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 5,
            connection_timeout_secs: 30,
        }
    }
}

/// HTTP 트리거 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl FxConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> FxResult<Self> {
        dotenvy::dotenv().ok();

        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("FX")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut cfg: FxConfig = builder.build()?.try_deserialize()?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            cfg.database.url = url;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// 설정 값 검증.
    pub fn validate(&self) -> FxResult<()> {
        self.target.validate()?;

        if self.source.url.trim().is_empty() {
            return Err(FxError::Config("source.url is empty".to_string()));
        }
        if self.source.max_attempts == 0 {
            return Err(FxError::Config(
                "source.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.ingest.lookback_days == 0 {
            return Err(FxError::Config(
                "ingest.lookback_days must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_dataset() -> String {
    "ext".to_string()
}

fn default_table() -> String {
    "fx_rates".to_string()
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[target]
project = "analytics"
dataset = "ext"
table = "fx_rates"

[ingest]
base_currency = "usd"
currencies = ["eur", "GBP"]
start_date = "2024-01-30"
end_date = "yesterday"
lookback_days = 14
load_strategy = "merge"
"#;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(SAMPLE);
        let cfg = FxConfig::load(file.path()).unwrap();

        assert_eq!(cfg.target.to_string(), "analytics.ext.fx_rates");
        assert_eq!(cfg.ingest.base_currency, Currency::usd());
        assert_eq!(cfg.ingest.currencies.len(), 2);
        assert_eq!(cfg.ingest.currencies[0].as_str(), "EUR");
        assert_eq!(cfg.ingest.load_strategy, LoadStrategy::Merge);
        assert_eq!(cfg.ingest.end_date, DateToken::Yesterday);
        assert_eq!(cfg.source.anchor_currency, Currency::eur());
        assert_eq!(cfg.source.max_attempts, 3);
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let file = write_config("[target]\nproject = \"p\"\n");
        let cfg = FxConfig::load(file.path()).unwrap();

        assert_eq!(cfg.target.dataset, "ext");
        assert_eq!(cfg.target.table, "fx_rates");
        assert_eq!(cfg.ingest.date_spec(), DateSpec::default());
        assert_eq!(cfg.ingest.load_strategy, LoadStrategy::DeleteInsert);
        assert_eq!(cfg.server.port, 8080);
    }

    #[test]
    fn test_rejects_unsafe_identifiers() {
        let target = TargetTable::new("p", "ext", "fx_rates; DROP TABLE x");
        assert!(target.validate().is_err());
        assert!(TargetTable::new("p", "1ext", "t").validate().is_err());
        assert!(TargetTable::new("p", "ext", "fx_rates").validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_currency_in_file() {
        let file = write_config("[target]\nproject = \"p\"\n[ingest]\ncurrencies = [\"EURO\"]\n");
        assert!(FxConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_strategy_parsing() {
        assert_eq!("merge".parse::<LoadStrategy>().unwrap(), LoadStrategy::Merge);
        assert_eq!(
            "delete-insert".parse::<LoadStrategy>().unwrap(),
            LoadStrategy::DeleteInsert
        );
        assert!("upsert".parse::<LoadStrategy>().is_err());
    }
}
