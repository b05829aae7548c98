//! ECB(유럽중앙은행) 환율 이력 소스.
//!
//! `eurofxref-hist.zip` 한 파일에 1999년 이후 전체 일별 환율이 들어 있습니다.
//! 모든 시세는 EUR 1단위당 해당 통화 수량입니다.
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! use fx_data::source::{EcbRateSource, RateSource};
//!
//! let source = EcbRateSource::new(&config.source)?.with_required_column(Currency::usd());
//! let table = source.fetch(&range).await?;
//! ```

use super::payload::decode_payload;
use super::retry::{is_retryable_error, is_retryable_status, RetryConfig};
use super::RateSource;
use async_trait::async_trait;
use fx_core::{Currency, DateRange, FxError, FxResult, SnapshotTable, SourceConfig};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// ECB 벌크 이력 소스.
pub struct EcbRateSource {
    client: reqwest::Client,
    url: String,
    anchor: Currency,
    required: Vec<Currency>,
    retry: RetryConfig,
}

impl EcbRateSource {
    /// 설정으로 소스 생성.
    pub fn new(config: &SourceConfig) -> FxResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("fx-collector/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout())
            .build()
            .map_err(|e| FxError::Config(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            anchor: config.anchor_currency.clone(),
            required: Vec::new(),
            retry: RetryConfig::from_source(config),
        })
    }

    /// 헤더에 반드시 있어야 하는 통화 컬럼 추가 (기준 통화 환산에 필요한 컬럼).
    #[must_use]
    pub fn with_required_column(mut self, currency: Currency) -> Self {
        if !self.required.contains(&currency) {
            self.required.push(currency);
        }
        self
    }

    /// 재시도 정책 교체.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// 재시도 포함 다운로드.
    async fn download(&self) -> FxResult<Vec<u8>> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_reason = String::new();

        for attempt in 1..=max_attempts {
            match self.client.get(&self.url).send().await {
                Ok(response) if response.status().is_success() => {
                    match response.bytes().await {
                        Ok(body) => return Ok(body.to_vec()),
                        Err(e) if is_retryable_error(&e) => {
                            last_reason = format!("응답 본문 수신 실패: {}", e);
                        }
                        Err(e) => return Err(self.unavailable(attempt, e.to_string())),
                    }
                }
                Ok(response) => {
                    let status = response.status();
                    if !is_retryable_status(status) {
                        return Err(self.unavailable(attempt, format!("HTTP {}", status)));
                    }
                    last_reason = format!("HTTP {}", status);
                }
                Err(e) if is_retryable_error(&e) => {
                    last_reason = e.to_string();
                }
                Err(e) => return Err(self.unavailable(attempt, e.to_string())),
            }

            if attempt < max_attempts {
                let delay = self.retry.delay_for(attempt);
                debug!(
                    url = %self.url,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    reason = %last_reason,
                    "소스 다운로드 재시도 예정"
                );
                tokio::time::sleep(delay).await;
            }
        }

        warn!(url = %self.url, attempts = max_attempts, reason = %last_reason, "소스 다운로드 최종 실패");
        Err(self.unavailable(max_attempts, last_reason))
    }

    fn unavailable(&self, attempts: u32, reason: String) -> FxError {
        FxError::SourceUnavailable {
            url: self.url.clone(),
            attempts,
            reason,
        }
    }
}

#[async_trait]
impl RateSource for EcbRateSource {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self, window: &DateRange) -> FxResult<SnapshotTable> {
        let started = Instant::now();
        let bytes = self.download().await?;
        let table = decode_payload(&bytes, &self.anchor, &self.required)?;

        if let Some((first, last)) = table.date_bounds() {
            if first > window.start() {
                warn!(
                    first_snapshot = %first,
                    window_start = %window.start(),
                    "소스 이력이 요청 범위 시작일을 포함하지 않음"
                );
            }
            info!(
                bytes = bytes.len(),
                snapshots = table.len(),
                first = %first,
                last = %last,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "환율 이력 조회 완료"
            );
        }

        Ok(table)
    }

    fn name(&self) -> &str {
        "ecb"
    }
}
