//! UTC date arithmetic on epoch milliseconds.
//!
//! Dates render as ISO-8601 (`2024-02-29T13:05:00.000Z`). Parsing accepts a
//! bare date, or a date and time with optional milliseconds and `Z`.

use std::time::{SystemTime, UNIX_EPOCH};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Years further from zero than this do not fit in epoch milliseconds.
const MAX_YEAR: i64 = 100_000_000;

/// Current time in milliseconds since the epoch.
pub fn now_millis() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
        Err(before) => -i64::try_from(before.duration().as_millis()).unwrap_or(i64::MAX),
    }
}

// Howard Hinnant's civil calendar algorithms.
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = (if year >= 0 { year } else { year - 399 }) / 400;
    let yoe = year - era * 400;
    let mp = i64::from(if month > 2 { month - 3 } else { month + 9 });
    let doy = (153 * mp + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

pub fn format_iso(millis: i64) -> String {
    let days = millis.div_euclid(MILLIS_PER_DAY);
    let in_day = millis.rem_euclid(MILLIS_PER_DAY);
    let (year, month, day) = civil_from_days(days);
    let (hours, rest) = (in_day / 3_600_000, in_day % 3_600_000);
    let (minutes, rest) = (rest / 60_000, rest % 60_000);
    let (seconds, ms) = (rest / 1000, rest % 1000);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        year, month, day, hours, minutes, seconds, ms
    )
}

fn field<T: core::str::FromStr>(text: &str) -> Option<T> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

pub fn parse_iso(text: &str) -> Option<i64> {
    let text = text.trim();
    let (date, time) = match text.split_once(['T', ' ']) {
        Some((date, time)) => (date, Some(time)),
        None => (text, None),
    };

    let mut parts = date.splitn(3, '-');
    let year: i64 = field(parts.next()?)?;
    let month: u32 = field(parts.next()?)?;
    let day: u32 = field(parts.next()?)?;
    if year > MAX_YEAR || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    let mut millis = days_from_civil(year, month, day) * MILLIS_PER_DAY;
    if let Some(time) = time {
        let time = time.strip_suffix('Z').unwrap_or(time);
        let (clock, fraction) = match time.split_once('.') {
            Some((clock, fraction)) => (clock, Some(fraction)),
            None => (time, None),
        };
        let mut parts = clock.splitn(3, ':');
        let hours: i64 = field(parts.next()?)?;
        let minutes: i64 = field(parts.next()?)?;
        let seconds: i64 = match parts.next() {
            Some(seconds) => field(seconds)?,
            None => 0,
        };
        if hours > 23 || minutes > 59 || seconds > 60 {
            return None;
        }
        let ms = match fraction {
            Some(fraction) => {
                let digits: String = fraction.chars().take(3).collect();
                let scale = 10_i64.pow(3 - digits.len() as u32);
                field::<i64>(&digits)? * scale
            }
            None => 0,
        };
        millis += hours * 3_600_000 + minutes * 60_000 + seconds * 1000 + ms;
    }
    Some(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_epoch() {
        assert_eq!(format_iso(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(parse_iso("1970-01-01"), Some(0));
    }

    #[test]
    fn test_leap_day_round_trip() {
        let millis = parse_iso("2024-02-29T13:05:09.250Z").unwrap();
        assert_eq!(format_iso(millis), "2024-02-29T13:05:09.250Z");
    }

    #[test]
    fn test_before_epoch() {
        let millis = parse_iso("1969-12-31T23:59:59").unwrap();
        assert_eq!(millis, -1000);
        assert_eq!(format_iso(millis), "1969-12-31T23:59:59.000Z");
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(parse_iso("yesterday"), None);
        assert_eq!(parse_iso("2024-13-01"), None);
        assert_eq!(parse_iso("2024-01-01T25:00"), None);
    }

    #[test]
    fn test_rejects_years_out_of_range() {
        assert_eq!(parse_iso("9999999999999-01-01"), None);
        assert_eq!(parse_iso("9223372036854775807-01-01"), None);
        assert!(parse_iso("99999999-12-31").is_some());
    }
}
