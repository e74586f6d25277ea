use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Parse a textual `Date_Created` value → micros since the epoch.
///
/// Accepts RFC 3339 (offset applied, result in UTC), BigQuery's
/// `"YYYY-MM-DD HH:MM:SS UTC"`, naive date-times in a handful of layouts and
/// plain dates (midnight). Returns `None` for anything else.
pub fn parse_timestamp_micros(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_micros());
    }

    let naive = s.strip_suffix(" UTC").unwrap_or(s);
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Some(dt.and_utc().timestamp_micros());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(naive, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp_micros());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn micros(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, h, min, s)
            .unwrap()
            .timestamp_micros()
    }

    #[test]
    fn test_plain_date_is_midnight() {
        assert_eq!(
            parse_timestamp_micros("2024-01-05"),
            Some(micros(2024, 1, 5, 0, 0, 0))
        );
        assert_eq!(
            parse_timestamp_micros("01/05/2024"),
            Some(micros(2024, 1, 5, 0, 0, 0))
        );
    }

    #[test]
    fn test_datetime_layouts() {
        let want = Some(micros(2024, 2, 10, 13, 4, 5));
        assert_eq!(parse_timestamp_micros("2024-02-10T13:04:05"), want);
        assert_eq!(parse_timestamp_micros("2024-02-10 13:04:05"), want);
        assert_eq!(parse_timestamp_micros("2024-02-10 13:04:05 UTC"), want);
        assert_eq!(parse_timestamp_micros("02/10/2024 01:04:05 PM"), want);
        assert_eq!(parse_timestamp_micros(" 2024/02/10 13:04:05 "), want);
    }

    #[test]
    fn test_rfc3339_offset_is_applied() {
        assert_eq!(
            parse_timestamp_micros("2024-02-10T13:04:05-08:00"),
            Some(micros(2024, 2, 10, 21, 4, 5))
        );
    }

    #[test]
    fn test_fractional_seconds() {
        assert_eq!(
            parse_timestamp_micros("2024-02-10 13:04:05.250"),
            Some(micros(2024, 2, 10, 13, 4, 5) + 250_000)
        );
    }

    #[test]
    fn test_garbage_is_none() {
        assert_eq!(parse_timestamp_micros(""), None);
        assert_eq!(parse_timestamp_micros("yesterday"), None);
        assert_eq!(parse_timestamp_micros("2024-13-45"), None);
    }
}
