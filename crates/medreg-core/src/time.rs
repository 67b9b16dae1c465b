use time::OffsetDateTime;

/// Current UTC time truncated to microseconds, the precision PostgreSQL keeps
/// for `TIMESTAMPTZ`.
pub fn now_utc() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    let micros = now.microsecond();
    now.replace_microsecond(micros).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_utc_has_microsecond_precision() {
        let now = now_utc();
        assert_eq!(now.nanosecond() % 1_000, 0);
        assert_eq!(now.offset(), time::UtcOffset::UTC);
    }
}
