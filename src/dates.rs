use chrono::NaiveDate;

/// Parse a catalog upload date such as `10 Aug 2017`.
///
/// Also accepts `Aug 10, 2017` and ISO `2017-08-10`. Returns `None` when no
/// format matches.
pub fn parse_upload_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    ["%d %b %Y", "%b %d, %Y", "%Y-%m-%d"]
        .into_iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

/// Seconds since the Unix epoch at UTC midnight of `date`.
pub fn unix_timestamp(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc().timestamp())
        .unwrap_or_default()
}

/// Monthly bucket key (`YYYY-MM`).
pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_catalog_formats() {
        let expected = NaiveDate::from_ymd_opt(2017, 8, 10);
        assert_eq!(parse_upload_date("10 Aug 2017"), expected);
        assert_eq!(parse_upload_date(" Aug 10, 2017 "), expected);
        assert_eq!(parse_upload_date("2017-08-10"), expected);
        assert_eq!(parse_upload_date("sometime"), None);
        assert_eq!(parse_upload_date(""), None);
    }

    #[test]
    fn timestamps_are_utc_midnight() {
        let date = NaiveDate::from_ymd_opt(1970, 1, 2).unwrap();
        assert_eq!(unix_timestamp(date), 86_400);
        assert_eq!(month_key(date), "1970-01");
    }
}
