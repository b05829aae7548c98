//! 통화 코드 타입.

use crate::error::{FxError, FxResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// ISO 4217 통화 코드 (대문자 3자리).
///
/// 입력은 공백 제거 후 대문자로 정규화되므로 `"eur"`와 `" EUR "`는 같은 값입니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    /// 통화 코드 파싱 및 정규화.
    pub fn parse(code: &str) -> FxResult<Self> {
        let normalized = code.trim().to_ascii_uppercase();
        if normalized.len() != 3 || !normalized.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(FxError::InvalidInput(format!(
                "invalid currency code: {:?}",
                code
            )));
        }
        Ok(Self(normalized))
    }

    /// 코드 문자열 반환.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 미국 달러.
    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    /// 유로.
    pub fn eur() -> Self {
        Self("EUR".to_string())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Currency {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Currency::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// 쉼표로 구분된 통화 목록 파싱.
///
/// 빈 토큰은 무시하고, 중복은 처음 등장한 순서를 유지한 채 제거합니다.
pub fn parse_currency_list(s: &str) -> FxResult<Vec<Currency>> {
    let mut out: Vec<Currency> = Vec::new();
    for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let currency = Currency::parse(token)?;
        if !out.contains(&currency) {
            out.push(currency);
        }
    }
    Ok(out)
}
