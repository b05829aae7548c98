//! 핵심 도메인 타입.

pub mod currency;
pub mod date_range;
pub mod rate;
pub mod snapshot;

pub use currency::{parse_currency_list, Currency};
pub use date_range::{DateRange, DateSpec, DateToken};
pub use rate::{Resolution, ResolvedRate};
pub use snapshot::{RateSnapshot, SnapshotTable};
