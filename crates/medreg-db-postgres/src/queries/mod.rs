//! SQL query implementations for the PostgreSQL storage backend.

pub mod counter;
pub mod patient;

use chrono::{DateTime, Utc};
use time::OffsetDateTime;

/// Converts chrono DateTime to time OffsetDateTime.
pub(crate) fn chrono_to_time(dt: DateTime<Utc>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(dt.timestamp()).unwrap_or(OffsetDateTime::UNIX_EPOCH)
        + time::Duration::nanoseconds(dt.timestamp_subsec_nanos() as i64)
}

/// Converts time OffsetDateTime to chrono DateTime.
pub(crate) fn time_to_chrono(t: OffsetDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp(t.unix_timestamp(), t.nanosecond()).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_conversion_keeps_microseconds() {
        let t = medreg_core::now_utc();
        assert_eq!(chrono_to_time(time_to_chrono(t)), t);
    }
}
