//! HTTP 재시도 정책.
//!
//! 멱등 GET 요청에만 사용합니다. 일시적 상태 코드(429/500/502/503/504)와
//! 연결/타임아웃 오류만 재시도하고, 404 같은 영구 실패는 즉시 반환합니다.

use fx_core::SourceConfig;
use reqwest::StatusCode;
use std::time::Duration;

/// 재시도 대상 상태 코드.
const RETRYABLE_STATUS: [StatusCode; 5] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// 지수 백오프 재시도 설정.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 최대 시도 횟수 (첫 요청 포함)
    pub max_attempts: u32,
    /// 첫 재시도 전 대기
    pub base_delay: Duration,
    /// 대기 상한
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryConfig {
    pub fn from_source(config: &SourceConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.backoff_base_ms),
            max_delay: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// `attempt`번째 시도(1부터) 실패 후 대기 시간: base * 2^(attempt-1), 상한 적용.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

/// 재시도 가능한 상태 코드인지 확인합니다.
pub fn is_retryable_status(status: StatusCode) -> bool {
    RETRYABLE_STATUS.contains(&status)
}

/// 재시도 가능한 전송 오류인지 확인합니다 (연결 실패, 타임아웃, 본문 수신 중단).
pub fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_body()
}
