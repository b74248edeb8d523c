//! Conversion between model-supplied wall-clock strings and absolute instants.
//!
//! The model emits `YYYY-MM-DDTHH:MM:SS` with no offset; the zone always comes
//! from the user's [`UserTimeZoneContext`]. Offset-qualified input is rejected
//! rather than reinterpreted.

use crate::domain::error::CalendarError;
use crate::domain::models::UserTimeZoneContext;
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::fmt;
use std::str::FromStr;

pub const NAIVE_LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";
const DISPLAY_TIME_FORMAT: &str = "%I:%M %p";
const DISPLAY_DATE_FORMAT: &str = "%B %d, %Y";
const DISPLAY_DAY_TIME_FORMAT: &str = "%b %d at %I:%M %p";
const DAY_START_SEARCH_STEP_MINUTES: i64 = 15;
const DAY_START_SEARCH_LIMIT_MINUTES: i64 = 48 * 60;

/// Wall-clock date and time exactly as the model wrote it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NaiveLocalTime(NaiveDateTime);

impl NaiveLocalTime {
    pub fn parse(raw: &str) -> Result<Self, CalendarError> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(CalendarError::MalformedTimestamp(
                "timestamp must not be empty".to_string(),
            ));
        }
        if let Some(reason) = offset_suffix(value) {
            return Err(CalendarError::MalformedTimestamp(format!(
                "'{value}' {reason}; send local wall-clock time as YYYY-MM-DDTHH:MM:SS without an offset"
            )));
        }
        if !has_naive_shape(value) {
            return Err(CalendarError::MalformedTimestamp(format!(
                "'{value}' is not in YYYY-MM-DDTHH:MM:SS format"
            )));
        }
        NaiveDateTime::parse_from_str(value, NAIVE_LOCAL_FORMAT)
            .map(Self)
            .map_err(|error| {
                CalendarError::MalformedTimestamp(format!("'{value}' is not a valid date-time: {error}"))
            })
    }

    pub fn as_naive(&self) -> NaiveDateTime {
        self.0
    }
}

impl From<NaiveDateTime> for NaiveLocalTime {
    fn from(value: NaiveDateTime) -> Self {
        Self(value)
    }
}

impl FromStr for NaiveLocalTime {
    type Err = CalendarError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl fmt::Display for NaiveLocalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(NAIVE_LOCAL_FORMAT))
    }
}

fn offset_suffix(value: &str) -> Option<&'static str> {
    if value.ends_with('Z') || value.ends_with('z') {
        return Some("carries a UTC designator");
    }
    let tail = value.get(19..)?;
    if tail.starts_with('+') || tail.starts_with('-') {
        return Some("carries a UTC offset");
    }
    if tail.starts_with('.') {
        return Some("carries fractional seconds");
    }
    None
}

fn has_naive_shape(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 19 {
        return false;
    }
    bytes.iter().enumerate().all(|(index, byte)| match index {
        4 | 7 => *byte == b'-',
        10 => *byte == b'T',
        13 | 16 => *byte == b':',
        _ => byte.is_ascii_digit(),
    })
}

/// Anchor a wall-clock time in the user's zone.
///
/// An ambiguous time (clocks falling back) takes the earlier instant. A time
/// inside a spring-forward gap never occurs on the user's clock and is
/// rejected.
pub fn localize(
    naive: NaiveLocalTime,
    tz: &UserTimeZoneContext,
) -> Result<DateTime<Utc>, CalendarError> {
    match tz.tz().from_local_datetime(&naive.as_naive()) {
        LocalResult::Single(value) => Ok(value.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(CalendarError::MalformedTimestamp(format!(
            "{naive} does not exist in {tz} (daylight-saving gap)"
        ))),
    }
}

/// Parse and localize raw strings in one step; the zone is validated first.
pub fn localize_str(raw_time: &str, zone_name: &str) -> Result<DateTime<Utc>, CalendarError> {
    let tz = UserTimeZoneContext::new(zone_name)?;
    let naive = NaiveLocalTime::parse(raw_time)?;
    localize(naive, &tz)
}

/// 12-hour clock time in the user's zone, e.g. `08:00 PM`.
pub fn format_time(instant: DateTime<Utc>, tz: &UserTimeZoneContext) -> String {
    instant
        .with_timezone(&tz.tz())
        .format(DISPLAY_TIME_FORMAT)
        .to_string()
}

/// Day and 12-hour time in the user's zone, e.g. `Aug 04 at 08:00 PM`.
pub fn format_day_time(instant: DateTime<Utc>, tz: &UserTimeZoneContext) -> String {
    instant
        .with_timezone(&tz.tz())
        .format(DISPLAY_DAY_TIME_FORMAT)
        .to_string()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DISPLAY_DATE_FORMAT).to_string()
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, CalendarError> {
    let value = raw.trim();
    let well_formed = value.len() == 10
        && value.bytes().enumerate().all(|(index, byte)| match index {
            4 | 7 => byte == b'-',
            _ => byte.is_ascii_digit(),
        });
    if !well_formed {
        return Err(CalendarError::MalformedTimestamp(format!(
            "'{value}' is not a date in YYYY-MM-DD format"
        )));
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|error| {
        CalendarError::MalformedTimestamp(format!("'{value}' is not a valid date: {error}"))
    })
}

pub fn today_in(now: DateTime<Utc>, tz: &UserTimeZoneContext) -> NaiveDate {
    now.with_timezone(&tz.tz()).date_naive()
}

/// Half-open `[start-of-day, start-of-next-day)` for `date` in the user's zone.
///
/// Days are not always 24 hours long, and in a few zones midnight itself
/// falls in a gap; the day then starts at the first local time that exists.
pub fn day_bounds(
    date: NaiveDate,
    tz: &UserTimeZoneContext,
) -> Result<(DateTime<Utc>, DateTime<Utc>), CalendarError> {
    let next = date.succ_opt().ok_or_else(|| {
        CalendarError::MalformedTimestamp(format!("{date} has no following day"))
    })?;
    let start = start_of_day(date, tz)?;
    let end = start_of_day(next, tz)?;
    if end <= start {
        return Err(CalendarError::InvalidInterval(format!(
            "{date} has no local time in {tz}"
        )));
    }
    Ok((start, end))
}

fn start_of_day(date: NaiveDate, tz: &UserTimeZoneContext) -> Result<DateTime<Utc>, CalendarError> {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    let mut offset = 0;
    while offset <= DAY_START_SEARCH_LIMIT_MINUTES {
        let candidate = midnight + Duration::minutes(offset);
        if let Some(value) = tz.tz().from_local_datetime(&candidate).earliest() {
            return Ok(value.with_timezone(&Utc));
        }
        offset += DAY_START_SEARCH_STEP_MINUTES;
    }
    Err(CalendarError::MalformedTimestamp(format!(
        "cannot find the start of {date} in {tz}"
    )))
}
