use crate::domain::models::{CalendarEvent, UserTimeZoneContext};
use crate::domain::time::{day_bounds, parse_date};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};

const UNTITLED_EVENT: &str = "(No title)";
const STATUS_CANCELLED: &str = "cancelled";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct CalendarEventDateTime {
    #[serde(rename = "dateTime", skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    /// All-day events carry a date instead of a date-time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "timeZone", skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CalendarEventReminders {
    #[serde(rename = "useDefault")]
    pub use_default: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct GoogleCalendarEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub start: CalendarEventDateTime,
    pub end: CalendarEventDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminders: Option<CalendarEventReminders>,
}

/// Insert body for a new event: local RFC 3339 times plus the IANA zone name.
pub fn encode_new_event(
    title: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    description: &str,
    location: Option<&str>,
    time_zone: &UserTimeZoneContext,
) -> GoogleCalendarEvent {
    GoogleCalendarEvent {
        id: None,
        summary: Some(title.to_string()),
        description: Some(description.to_string()),
        location: location
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned),
        status: None,
        start: local_date_time(start, time_zone),
        end: local_date_time(end, time_zone),
        reminders: Some(CalendarEventReminders { use_default: true }),
    }
}

fn local_date_time(instant: DateTime<Utc>, time_zone: &UserTimeZoneContext) -> CalendarEventDateTime {
    CalendarEventDateTime {
        date_time: Some(instant.with_timezone(&time_zone.tz()).to_rfc3339()),
        date: None,
        time_zone: Some(time_zone.name().to_string()),
    }
}

/// Map a backend event into the domain model. Cancelled events map to `None`;
/// all-day events span whole local days in `time_zone`.
pub fn decode_event(
    event: &GoogleCalendarEvent,
    time_zone: &UserTimeZoneContext,
) -> Result<Option<CalendarEvent>, InfraError> {
    let cancelled = event
        .status
        .as_deref()
        .map(|status| status.eq_ignore_ascii_case(STATUS_CANCELLED))
        .unwrap_or(false);
    if cancelled {
        return Ok(None);
    }

    let start = decode_boundary(&event.start, time_zone, "start")?;
    let end = decode_boundary(&event.end, time_zone, "end")?;
    if end < start {
        return Err(InfraError::Decode(format!(
            "event {} ends before it starts",
            event.id.as_deref().unwrap_or("<no id>")
        )));
    }

    let title = event
        .summary
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(UNTITLED_EVENT)
        .to_string();

    Ok(Some(CalendarEvent {
        id: event.id.clone(),
        title,
        start,
        end,
        description: event.description.clone(),
        location: event.location.clone(),
    }))
}

fn decode_boundary(
    value: &CalendarEventDateTime,
    time_zone: &UserTimeZoneContext,
    field_name: &str,
) -> Result<DateTime<Utc>, InfraError> {
    if let Some(raw) = value.date_time.as_deref() {
        return DateTime::parse_from_rfc3339(raw)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|error| {
                InfraError::Decode(format!("invalid event {field_name}.dateTime '{raw}': {error}"))
            });
    }
    if let Some(raw) = value.date.as_deref() {
        let date = parse_date(raw).map_err(|error| {
            InfraError::Decode(format!("invalid event {field_name}.date: {error}"))
        })?;
        let (day_start, _) = day_bounds(date, time_zone).map_err(|error| {
            InfraError::Decode(format!("invalid event {field_name}.date: {error}"))
        })?;
        return Ok(day_start);
    }
    Err(InfraError::Decode(format!(
        "event {field_name} has neither dateTime nor date"
    )))
}
