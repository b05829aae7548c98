//! 벌크 이력 페이로드 디코딩.
//!
//! ECB 이력 파일은 CSV 하나가 들어 있는 zip 아카이브입니다.
//!
//! ```csv
//! Date,USD,JPY,BGN,CYP,...,
//! 2024-03-01,1.0852,162.51,1.9558,N/A,...,
//! ```
//!
//! - 첫 컬럼은 `Date` (ISO 8601)
//! - 이후 컬럼은 통화 코드, 값은 숫자/빈 값/`N/A`
//! - 각 줄 끝의 쉼표로 생기는 빈 헤더 컬럼은 무시

use chrono::NaiveDate;
use fx_core::{Currency, FxError, FxResult, RateSnapshot, SnapshotTable};
use std::collections::{BTreeSet, HashMap};
use std::io::{Cursor, Read};
use tracing::{debug, warn};
use zip::ZipArchive;

/// zip 로컬 파일 헤더 시그니처.
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// zip 헤더의 크기 값은 신뢰하지 않고 선할당 상한으로만 사용
const MAX_CAPACITY_HINT: usize = 64 << 20;

/// 페이로드를 스냅샷 테이블로 변환.
///
/// `required`에 있는 통화는 헤더에 반드시 존재해야 합니다 (앵커 제외).
pub fn decode_payload(
    bytes: &[u8],
    anchor: &Currency,
    required: &[Currency],
) -> FxResult<SnapshotTable> {
    let text = extract_csv(bytes)?;
    let table = parse_history_csv(&text, anchor)?;

    for currency in required {
        if !table.has_column(currency) {
            return Err(FxError::MalformedSource(format!(
                "expected currency column {} is missing",
                currency
            )));
        }
    }

    Ok(table)
}

/// zip이면 첫 번째 `.csv` 항목을, 아니면 본문 전체를 CSV 텍스트로 반환.
pub fn extract_csv(bytes: &[u8]) -> FxResult<String> {
    if !bytes.starts_with(ZIP_MAGIC) {
        return String::from_utf8(bytes.to_vec())
            .map_err(|e| FxError::MalformedSource(format!("payload is not UTF-8 text: {}", e)));
    }

    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| FxError::MalformedSource(format!("invalid zip archive: {}", e)))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| FxError::MalformedSource(format!("unreadable zip entry: {}", e)))?;

        if !entry.name().to_ascii_lowercase().ends_with(".csv") {
            continue;
        }

        debug!(entry = entry.name(), size = entry.size(), "zip CSV 항목 추출");
        let hint = usize::try_from(entry.size()).unwrap_or(usize::MAX);
        let mut text = String::with_capacity(hint.min(MAX_CAPACITY_HINT));
        entry
            .read_to_string(&mut text)
            .map_err(|e| FxError::MalformedSource(format!("cannot read {}: {}", entry.name(), e)))?;
        return Ok(text);
    }

    Err(FxError::MalformedSource(
        "zip archive contains no .csv file".to_string(),
    ))
}

/// 이력 CSV 파싱.
pub fn parse_history_csv(text: &str, anchor: &Currency) -> FxResult<SnapshotTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| FxError::MalformedSource(format!("cannot read header: {}", e)))?
        .clone();

    match headers.get(0) {
        Some(first) if first.trim_start_matches('\u{feff}').eq_ignore_ascii_case("date") => {}
        other => {
            return Err(FxError::MalformedSource(format!(
                "first column must be Date, got {:?}",
                other
            )))
        }
    }

    // 컬럼 인덱스 → 통화 (빈 헤더/알 수 없는 헤더는 None)
    let mut columns: Vec<Option<Currency>> = Vec::with_capacity(headers.len());
    columns.push(None);
    for header in headers.iter().skip(1) {
        if header.is_empty() {
            columns.push(None);
            continue;
        }
        match Currency::parse(header) {
            Ok(currency) => columns.push(Some(currency)),
            Err(_) => {
                warn!(header = header, "통화 코드가 아닌 컬럼 무시");
                columns.push(None);
            }
        }
    }

    let column_set: BTreeSet<Currency> = columns.iter().flatten().cloned().collect();
    let mut table = SnapshotTable::new(anchor.clone(), column_set);
    let mut unparsed_cells = 0usize;

    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| {
            FxError::MalformedSource(format!("bad CSV record at row {}: {}", line + 2, e))
        })?;

        let date_cell = record.get(0).unwrap_or("");
        if date_cell.is_empty() && record.iter().all(str::is_empty) {
            continue;
        }

        let date = NaiveDate::parse_from_str(date_cell, "%Y-%m-%d").map_err(|e| {
            FxError::MalformedSource(format!(
                "unparseable date {:?} at row {}: {}",
                date_cell,
                line + 2,
                e
            ))
        })?;

        let mut rates = HashMap::new();
        for (cell, column) in record.iter().zip(columns.iter()).skip(1) {
            let Some(currency) = column else { continue };
            if cell.is_empty() || cell.eq_ignore_ascii_case("N/A") {
                continue;
            }
            match cell.parse::<f64>() {
                Ok(value) => {
                    rates.insert(currency.clone(), value);
                }
                Err(_) => unparsed_cells += 1,
            }
        }

        table.insert(RateSnapshot::new(date, rates));
    }

    if table.is_empty() {
        return Err(FxError::MalformedSource(
            "rate table has no data rows".to_string(),
        ));
    }

    if unparsed_cells > 0 {
        warn!(cells = unparsed_cells, "숫자가 아닌 환율 값은 누락으로 처리");
    }

    debug!(
        snapshots = table.len(),
        columns = table.columns().len(),
        "이력 CSV 파싱 완료"
    );

    Ok(table)
}
