pub mod polling_job;
pub mod price_point;
pub mod raw_response;
pub mod symbol_average;

pub use polling_job::{JobValidationError, NewPollingJob, PollingJob};
pub use price_point::PricePoint;
pub use raw_response::RawResponse;
pub use symbol_average::SymbolAverage;

use chrono::{DateTime, SubsecRound, Utc};

/// `TIMESTAMPTZ` keeps microseconds; anything finer is lost on write
pub fn store_time(time: DateTime<Utc>) -> DateTime<Utc> {
    time.trunc_subsecs(6)
}

/// Current time at store precision
pub fn store_now() -> DateTime<Utc> {
    store_time(Utc::now())
}
