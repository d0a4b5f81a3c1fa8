//! Timestamp expressions accepted by `changed_since`
//!
//! Supported forms:
//! - RFC 3339 / ISO 8601, with or without a colon in the offset
//! - `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DD` (UTC)
//! - `@<unix seconds>`
//! - `now`, `today`, `yesterday`
//! - relative offsets such as `-2 days`, `+1 week`, `3 hours ago`

use chrono::{DateTime, Duration, Months, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static RE_RELATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^([+-]?)\s*(\d+)\s*(sec|second|min|minute|hour|day|week|fortnight|month|year)s?(\s+ago)?$",
    )
    .expect("Invalid regex")
});

/// Parse a `changed_since` expression relative to `now`
pub fn parse_timestamp(value: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    match value.to_lowercase().as_str() {
        "now" => return Some(now),
        "today" => return now.date_naive().and_hms_opt(0, 0, 0).map(|d| d.and_utc()),
        "yesterday" => {
            return (now - Duration::days(1))
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|d| d.and_utc());
        }
        _ => {}
    }

    if let Some(seconds) = value.strip_prefix('@') {
        return seconds
            .parse::<i64>()
            .ok()
            .and_then(|s| Utc.timestamp_opt(s, 0).single());
    }

    if let Some(caps) = RE_RELATIVE.captures(value) {
        let amount: i64 = caps[2].parse().ok()?;
        let negative = &caps[1] == "-" || caps.get(4).is_some();
        return shift(now, amount, &caps[3].to_lowercase(), negative);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%d %H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%.f%z"] {
        if let Ok(parsed) = DateTime::parse_from_str(value, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|d| d.and_utc());
    }

    None
}

fn shift(now: DateTime<Utc>, amount: i64, unit: &str, negative: bool) -> Option<DateTime<Utc>> {
    let duration = match unit {
        "sec" | "second" => Duration::try_seconds(amount)?,
        "min" | "minute" => Duration::try_minutes(amount)?,
        "hour" => Duration::try_hours(amount)?,
        "day" => Duration::try_days(amount)?,
        "week" => Duration::try_weeks(amount)?,
        "fortnight" => Duration::try_weeks(amount.checked_mul(2)?)?,
        "month" | "year" => {
            let months = if unit == "year" { amount.checked_mul(12)? } else { amount };
            let months = Months::new(u32::try_from(months).ok()?);
            return if negative {
                now.checked_sub_months(months)
            } else {
                now.checked_add_months(months)
            };
        }
        _ => return None,
    };
    if negative {
        now.checked_sub_signed(duration)
    } else {
        now.checked_add_signed(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_relative_days() {
        let parsed = parse_timestamp("-2 days", now()).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_relative_ago_and_units() {
        assert_eq!(
            parse_timestamp("3 hours ago", now()).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap()
        );
        assert_eq!(
            parse_timestamp("-1 month", now()).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 15, 12, 0, 0).unwrap()
        );
        assert_eq!(
            parse_timestamp("+1 week", now()).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 22, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_absolute_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(parse_timestamp("2024-01-02T03:04:05+00:00", now()), Some(expected));
        assert_eq!(parse_timestamp("2024-01-02T04:04:05+0100", now()), Some(expected));
        assert_eq!(parse_timestamp("2024-01-02 03:04:05", now()), Some(expected));
        assert_eq!(
            parse_timestamp("2024-01-02", now()),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("@1704164645", now()), Some(expected));
    }

    #[test]
    fn test_keywords() {
        assert_eq!(parse_timestamp("now", now()), Some(now()));
        assert_eq!(
            parse_timestamp("yesterday", now()),
            Some(Utc.with_ymd_and_hms(2024, 3, 14, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_unparseable() {
        assert_eq!(parse_timestamp("-1 light year", now()), None);
        assert_eq!(parse_timestamp("adaptive", now()), None);
        assert_eq!(parse_timestamp("", now()), None);
    }
}
