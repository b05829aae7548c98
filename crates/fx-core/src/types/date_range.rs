//! 수집 날짜 범위.
//!
//! 설정/요청에서 받은 날짜 토큰(`yesterday` 또는 `YYYY-MM-DD`)은 `DateSpec`으로
//! 보관하고, 실행 시점의 오늘 날짜로 `DateRange`를 만듭니다. 장시간 떠 있는
//! 서버 프로세스도 매 실행마다 새로운 "어제"를 사용합니다.

use crate::error::{FxError, FxResult};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 날짜 토큰.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DateToken {
    /// 실행 시점 기준 어제
    Yesterday,
    /// 고정 날짜
    Fixed(NaiveDate),
}

impl DateToken {
    /// 오늘 날짜 기준으로 실제 날짜를 계산합니다.
    pub fn resolve(&self, today: NaiveDate) -> NaiveDate {
        match self {
            Self::Yesterday => today - Duration::days(1),
            Self::Fixed(date) => *date,
        }
    }
}

impl FromStr for DateToken {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("yesterday") {
            return Ok(Self::Yesterday);
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Self::Fixed)
            .map_err(|e| FxError::InvalidInput(format!("invalid date {:?}: {}", s, e)))
    }
}

impl TryFrom<String> for DateToken {
    type Error = FxError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DateToken> for String {
    fn from(token: DateToken) -> Self {
        token.to_string()
    }
}

impl fmt::Display for DateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yesterday => f.write_str("yesterday"),
            Self::Fixed(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

impl Default for DateToken {
    fn default() -> Self {
        Self::Yesterday
    }
}

/// 아직 오늘 날짜가 적용되지 않은 시작/종료 토큰 쌍.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateSpec {
    pub start: DateToken,
    pub end: DateToken,
}

impl DateSpec {
    pub fn new(start: DateToken, end: DateToken) -> Self {
        Self { start, end }
    }

    /// 오늘 날짜를 적용해 검증된 범위를 만듭니다.
    pub fn resolve(&self, today: NaiveDate) -> FxResult<DateRange> {
        DateRange::new(self.start.resolve(today), self.end.resolve(today))
    }
}

/// 양 끝을 포함하는 날짜 범위 (`start <= end`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// 범위 생성. `end < start`이면 `InvalidRange`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> FxResult<Self> {
        if end < start {
            return Err(FxError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// 하루짜리 범위.
    pub fn single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// 포함된 일수.
    pub fn len(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    /// 범위는 항상 최소 하루를 포함합니다.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// 시작일부터 종료일까지 하루씩 오름차순으로 순회합니다.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.start, self.end)
    }
}
