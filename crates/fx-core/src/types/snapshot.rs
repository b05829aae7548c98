//! 벌크 환율 테이블 (날짜별 스냅샷).
//!
//! 소스에서 한 번 조회한 뒤 실행 내내 읽기 전용으로 공유됩니다.

use super::Currency;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// 특정 날짜의 환율 스냅샷.
///
/// `rates`는 앵커 통화 1단위당 각 통화의 수량입니다 (ECB 표기).
/// 값이 비어 있던 통화는 맵에 존재하지 않습니다.
#[derive(Debug, Clone, PartialEq)]
pub struct RateSnapshot {
    pub date: NaiveDate,
    rates: HashMap<Currency, f64>,
}

impl RateSnapshot {
    pub fn new(date: NaiveDate, rates: HashMap<Currency, f64>) -> Self {
        Self { date, rates }
    }

    /// 앵커 대비 시세 조회. 앵커 자신은 명시 값이 없으면 1.0입니다.
    pub fn quote(&self, currency: &Currency, anchor: &Currency) -> Option<f64> {
        match self.rates.get(currency) {
            Some(rate) => Some(*rate),
            None if currency == anchor => Some(1.0),
            None => None,
        }
    }

    /// 값이 있는 통화 수.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// 날짜순으로 정렬된 스냅샷 모음.
#[derive(Debug, Clone)]
pub struct SnapshotTable {
    anchor: Currency,
    columns: BTreeSet<Currency>,
    snapshots: BTreeMap<NaiveDate, RateSnapshot>,
}

impl SnapshotTable {
    /// 빈 테이블 생성.
    pub fn new(anchor: Currency, columns: BTreeSet<Currency>) -> Self {
        Self {
            anchor,
            columns,
            snapshots: BTreeMap::new(),
        }
    }

    /// 스냅샷 목록으로 테이블 생성 (컬럼은 스냅샷에서 수집).
    pub fn from_snapshots(anchor: Currency, snapshots: impl IntoIterator<Item = RateSnapshot>) -> Self {
        let mut table = Self::new(anchor, BTreeSet::new());
        for snapshot in snapshots {
            table.columns.extend(snapshot.rates.keys().cloned());
            table.insert(snapshot);
        }
        table
    }

    /// 스냅샷 추가. 같은 날짜가 이미 있으면 교체합니다.
    pub fn insert(&mut self, snapshot: RateSnapshot) {
        self.snapshots.insert(snapshot.date, snapshot);
    }

    pub fn anchor(&self) -> &Currency {
        &self.anchor
    }

    /// 소스 헤더에 존재하는 통화 컬럼.
    pub fn columns(&self) -> &BTreeSet<Currency> {
        &self.columns
    }

    pub fn has_column(&self, currency: &Currency) -> bool {
        currency == &self.anchor || self.columns.contains(currency)
    }

    /// 정확히 해당 날짜의 스냅샷.
    pub fn get(&self, date: NaiveDate) -> Option<&RateSnapshot> {
        self.snapshots.get(&date)
    }

    /// 가장 이른/늦은 스냅샷 날짜.
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.snapshots.keys().next()?;
        let last = self.snapshots.keys().next_back()?;
        Some((*first, *last))
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ccy(code: &str) -> Currency {
        Currency::parse(code).unwrap()
    }

    fn snapshot(date: NaiveDate, rates: &[(&str, f64)]) -> RateSnapshot {
        RateSnapshot::new(date, rates.iter().map(|(c, r)| (ccy(c), *r)).collect())
    }

    #[test]
    fn test_anchor_quote_is_implicit() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let snap = snapshot(d, &[("USD", 1.0852)]);
        let eur = Currency::eur();

        assert_eq!(snap.quote(&eur, &eur), Some(1.0));
        assert_eq!(snap.quote(&Currency::usd(), &eur), Some(1.0852));
        assert_eq!(snap.quote(&ccy("GBP"), &eur), None);
    }

    #[test]
    fn test_table_bounds_and_columns() {
        let d1 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let d3 = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let table = SnapshotTable::from_snapshots(
            Currency::eur(),
            vec![snapshot(d3, &[("GBP", 0.86)]), snapshot(d1, &[("USD", 1.1)])],
        );

        assert_eq!(table.len(), 2);
        assert_eq!(table.date_bounds(), Some((d1, d3)));
        assert!(table.has_column(&Currency::usd()));
        assert!(table.has_column(&Currency::eur()));
        assert!(!table.has_column(&ccy("XYZ")));
        assert!(table.get(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()).is_none());
    }
}
