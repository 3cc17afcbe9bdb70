//! Duration and timestamp normalization.
//!
//! The provider encodes durations as ISO 8601 periods and timestamps as UTC
//! RFC 3339 strings. Local-time breakdowns and storage partitions use a fixed
//! UTC+9 offset.

use chrono::{DateTime, Datelike, FixedOffset, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const JST_OFFSET_SECS: i32 = 9 * 3600;

const SECS_PER_WEEK: f64 = 604_800.0;
const SECS_PER_DAY: u64 = 86_400;

pub fn jst() -> FixedOffset {
    FixedOffset::east_opt(JST_OFFSET_SECS).expect("UTC+9 is a valid fixed offset")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed ISO 8601 duration {input:?}: {reason}")]
pub struct MalformedDurationError {
    pub input: String,
    pub reason: &'static str,
}

fn malformed(input: &str, reason: &'static str) -> MalformedDurationError {
    MalformedDurationError {
        input: input.to_string(),
        reason,
    }
}

/// Parses an ISO 8601 duration (`PT1H2M3S`, `P1DT30M`, `P2W`, `PT12.5S`)
/// into whole seconds. Fractions are truncated. Year and month components
/// have no fixed length in seconds and are rejected.
pub fn parse_duration(period: &str) -> Result<u64, MalformedDurationError> {
    let rest = period
        .strip_prefix('P')
        .ok_or_else(|| malformed(period, "missing leading 'P'"))?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (rest, None),
    };

    let mut components = 0usize;
    let mut total = parse_components(
        period,
        date_part,
        &[('W', SECS_PER_WEEK), ('D', SECS_PER_DAY as f64)],
        true,
        &mut components,
    )?;

    if let Some(time) = time_part {
        if time.is_empty() {
            return Err(malformed(period, "empty time section after 'T'"));
        }
        total += parse_components(
            period,
            time,
            &[('H', 3600.0), ('M', 60.0), ('S', 1.0)],
            false,
            &mut components,
        )?;
    }

    if components == 0 {
        return Err(malformed(period, "no duration components"));
    }

    Ok(total.trunc() as u64)
}

fn parse_components(
    period: &str,
    section: &str,
    units: &[(char, f64)],
    is_date_section: bool,
    components: &mut usize,
) -> Result<f64, MalformedDurationError> {
    let mut total = 0.0;
    let mut number = String::new();
    let mut next_unit = 0usize;

    for ch in section.chars() {
        if ch.is_ascii_digit() || ch == '.' || ch == ',' {
            number.push(if ch == ',' { '.' } else { ch });
            continue;
        }
        if number.is_empty() {
            return Err(malformed(period, "designator without a number"));
        }
        let Some(offset) = units[next_unit..].iter().position(|(unit, _)| *unit == ch) else {
            if is_date_section && (ch == 'Y' || ch == 'M') {
                return Err(malformed(period, "year and month components are not supported"));
            }
            return Err(malformed(period, "unexpected or out-of-order designator"));
        };
        let value: f64 = number
            .parse()
            .map_err(|_| malformed(period, "invalid number"))?;
        let index = next_unit + offset;
        total += value * units[index].1;
        next_unit = index + 1;
        *components += 1;
        number.clear();
    }

    if !number.is_empty() {
        return Err(malformed(period, "number without a designator"));
    }
    Ok(total)
}

/// Canonical ISO 8601 period for a whole number of seconds. Inverse of
/// [`parse_duration`] for every `u64` it produces.
pub fn seconds_to_period(total: u64) -> String {
    if total == 0 {
        return "PT0S".to_string();
    }
    let days = total / SECS_PER_DAY;
    let rem = total % SECS_PER_DAY;
    let (hours, minutes, seconds) = (rem / 3600, (rem % 3600) / 60, rem % 60);

    let mut out = String::from("P");
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if rem > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if seconds > 0 {
            out.push_str(&format!("{seconds}S"));
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            17..=21 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }
}

/// Local (UTC+9) calendar breakdown of a publish instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedInfo {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub weekday: String,
    pub time_of_day: TimeOfDay,
}

pub fn localize(instant: DateTime<Utc>) -> PublishedInfo {
    let local = instant.with_timezone(&jst());
    PublishedInfo {
        year: local.year(),
        month: local.month(),
        day: local.day(),
        hour: local.hour(),
        weekday: local.format("%A").to_string(),
        time_of_day: TimeOfDay::from_hour(local.hour()),
    }
}

/// UTC bounds `[start, end)` of a local calendar year.
pub fn year_window(year: i32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let offset = jst();
    let start = offset.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single()?;
    let end = offset.with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0).single()?;
    Some((start.with_timezone(&Utc), end.with_timezone(&Utc)))
}

pub fn format_rfc3339_utc(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Storage partition prefix for the local date of `now`: `yyyy=2024/mm=03/dd=05`.
pub fn date_partition(now: DateTime<Utc>) -> String {
    let local = now.with_timezone(&jst());
    format!(
        "yyyy={}/mm={:02}/dd={:02}",
        local.year(),
        local.month(),
        local.day()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).single().unwrap()
    }

    #[test]
    fn parses_typical_provider_durations() {
        assert_eq!(parse_duration("PT0S").unwrap(), 0);
        assert_eq!(parse_duration("PT4M13S").unwrap(), 253);
        assert_eq!(parse_duration("PT1H2M3S").unwrap(), 3723);
        assert_eq!(parse_duration("P1DT2H").unwrap(), 93_600);
        assert_eq!(parse_duration("P2W").unwrap(), 1_209_600);
        assert_eq!(parse_duration("P0D").unwrap(), 0);
    }

    #[test]
    fn fractional_seconds_are_truncated() {
        assert_eq!(parse_duration("PT12.9S").unwrap(), 12);
        assert_eq!(parse_duration("PT1,5M").unwrap(), 90);
    }

    #[test]
    fn rejects_malformed_periods() {
        for input in ["", "P", "PT", "1H", "PT5", "PTH", "PT1S2M", "P1Y", "P3M", "PT1X", "P1H"] {
            assert!(parse_duration(input).is_err(), "{input} should be rejected");
        }
        let err = parse_duration("P1Y").unwrap_err();
        assert_eq!(err.reason, "year and month components are not supported");
    }

    #[test]
    fn seconds_round_trip_through_period() {
        let samples = [
            0u64, 1, 59, 60, 61, 3599, 3600, 3661, 86_399, 86_400, 86_401, 90_061, 1_000_000,
            31_536_000,
        ];
        for secs in samples {
            let period = seconds_to_period(secs);
            assert_eq!(parse_duration(&period).unwrap(), secs, "period {period}");
        }
        assert_eq!(seconds_to_period(3661), "PT1H1M1S");
        assert_eq!(seconds_to_period(86_400), "P1D");
    }

    #[test]
    fn localize_shifts_to_utc_plus_nine() {
        // 2024-03-31 20:30 UTC is Monday 2024-04-01 05:30 local.
        let info = localize(utc(2024, 3, 31, 20, 30));
        assert_eq!((info.year, info.month, info.day, info.hour), (2024, 4, 1, 5));
        assert_eq!(info.weekday, "Monday");
        assert_eq!(info.time_of_day, TimeOfDay::Morning);
    }

    #[test]
    fn hour_buckets_follow_boundaries() {
        assert_eq!(TimeOfDay::from_hour(4), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(5), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(11), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(12), TimeOfDay::Afternoon);
        assert_eq!(TimeOfDay::from_hour(16), TimeOfDay::Afternoon);
        assert_eq!(TimeOfDay::from_hour(17), TimeOfDay::Evening);
        assert_eq!(TimeOfDay::from_hour(21), TimeOfDay::Evening);
        assert_eq!(TimeOfDay::from_hour(22), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(0), TimeOfDay::Night);
    }

    #[test]
    fn year_window_is_local_new_year() {
        let (start, end) = year_window(2024).unwrap();
        assert_eq!(start, utc(2023, 12, 31, 15, 0));
        assert_eq!(end, utc(2024, 12, 31, 15, 0));
        assert_eq!(format_rfc3339_utc(start), "2023-12-31T15:00:00Z");
    }

    #[test]
    fn partition_uses_local_date() {
        assert_eq!(date_partition(utc(2024, 3, 4, 16, 0)), "yyyy=2024/mm=03/dd=05");
        assert_eq!(date_partition(utc(2024, 3, 4, 14, 59)), "yyyy=2024/mm=03/dd=04");
    }
}
