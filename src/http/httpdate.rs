//! HTTP-date parsing and formatting (RFC 7231 §7.1.1.1).
//!
//! Accepts the preferred IMF-fixdate form and the legacy asctime form.
//! Always formats as IMF-fixdate.

use std::time::SystemTime;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Parse an HTTP-date header value.
pub fn parse(value: &str) -> Option<SystemTime> {
    let value = value.trim();
    let imf_fixdate = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    let asctime = format_description!(
        "[weekday repr:short] [month repr:short] [day padding:space] [hour]:[minute]:[second] [year]"
    );

    PrimitiveDateTime::parse(value, imf_fixdate)
        .or_else(|_| PrimitiveDateTime::parse(value, asctime))
        .ok()
        .map(|dt| SystemTime::from(dt.assume_utc()))
}

/// Format a timestamp as IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn format(at: SystemTime) -> String {
    let imf_fixdate = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    OffsetDateTime::from(at)
        .to_offset(UtcOffset::UTC)
        .format(imf_fixdate)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_parse_imf_fixdate() {
        let parsed = parse("Sun, 06 Nov 1994 08:49:37 GMT").unwrap();
        assert_eq!(parsed, UNIX_EPOCH + Duration::from_secs(784_111_777));
    }

    #[test]
    fn test_parse_asctime() {
        let parsed = parse("Sun Nov  6 08:49:37 1994").unwrap();
        assert_eq!(parsed, UNIX_EPOCH + Duration::from_secs(784_111_777));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse("yesterday").is_none());
        assert!(parse("").is_none());
        assert!(parse("0").is_none());
    }

    #[test]
    fn test_format() {
        let at = UNIX_EPOCH + Duration::from_secs(784_111_777);
        assert_eq!(format(at), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn test_format_then_parse_truncates_to_seconds() {
        let at = UNIX_EPOCH + Duration::from_millis(1_700_000_000_250);
        let parsed = parse(&format(at)).unwrap();
        assert_eq!(parsed, UNIX_EPOCH + Duration::from_secs(1_700_000_000));
    }
}
