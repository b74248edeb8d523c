//! Typed intents and the function-calling contract advertised to the model.
//!
//! Tool calls coming back from the model are untrusted: every argument is
//! checked here so an invalid call fails before anything touches the
//! calendar.

use crate::domain::error::CalendarError;
use crate::domain::time::{NaiveLocalTime, parse_date};
use chrono::NaiveDate;
use serde_json::{Map, Value, json};

pub const ADD_EVENT_TOOL: &str = "add_event";
pub const GET_EVENTS_TOOL: &str = "get_events";

const ARG_SUMMARY: &str = "summary";
const ARG_START: &str = "start_time_str";
const ARG_END: &str = "end_time_str";
const ARG_DESCRIPTION: &str = "description";
const ARG_LOCATION: &str = "location";
const ARG_CONFIRM_OVERRIDE: &str = "confirm_override";
const ARG_DATE: &str = "date_str";

const ADD_EVENT_ARGS: [&str; 6] = [
    ARG_SUMMARY,
    ARG_START,
    ARG_END,
    ARG_DESCRIPTION,
    ARG_LOCATION,
    ARG_CONFIRM_OVERRIDE,
];
const GET_EVENTS_ARGS: [&str; 1] = [ARG_DATE];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRequest {
    pub title: String,
    pub start: NaiveLocalTime,
    pub end: NaiveLocalTime,
    pub description: Option<String>,
    pub location: Option<String>,
    /// Set only when the user explicitly chose to schedule over a conflict.
    pub confirm_override: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    ScheduleEvent(ScheduleRequest),
    QueryEvents { date: Option<NaiveDate> },
}

impl Intent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ScheduleEvent(_) => "schedule_event",
            Self::QueryEvents { .. } => "query_events",
        }
    }
}

/// Validate a raw function call (`name` + JSON arguments) into an [`Intent`].
pub fn parse_tool_call(name: &str, args: &Value) -> Result<Intent, CalendarError> {
    let empty = Map::new();
    let args = match args {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            return Err(CalendarError::UnrecognizedIntent(format!(
                "arguments for '{name}' must be an object, got {other}"
            )));
        }
    };

    match name.trim() {
        ADD_EVENT_TOOL => parse_add_event(args),
        GET_EVENTS_TOOL => parse_get_events(args),
        other => Err(CalendarError::UnrecognizedIntent(format!(
            "unknown operation '{other}'; expected {ADD_EVENT_TOOL} or {GET_EVENTS_TOOL}"
        ))),
    }
}

fn parse_add_event(args: &Map<String, Value>) -> Result<Intent, CalendarError> {
    reject_unknown_args(ADD_EVENT_TOOL, args, &ADD_EVENT_ARGS)?;

    let title = required_string(args, ARG_SUMMARY)?;
    let start = NaiveLocalTime::parse(&required_string(args, ARG_START)?)
        .map_err(|error| with_field(ARG_START, error))?;
    let end = NaiveLocalTime::parse(&required_string(args, ARG_END)?)
        .map_err(|error| with_field(ARG_END, error))?;
    let confirm_override = match args.get(ARG_CONFIRM_OVERRIDE) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(value)) => *value,
        Some(other) => {
            return Err(CalendarError::UnrecognizedIntent(format!(
                "'{ARG_CONFIRM_OVERRIDE}' must be a boolean, got {other}"
            )));
        }
    };

    Ok(Intent::ScheduleEvent(ScheduleRequest {
        title,
        start,
        end,
        description: optional_string(args, ARG_DESCRIPTION)?,
        location: optional_string(args, ARG_LOCATION)?,
        confirm_override,
    }))
}

fn parse_get_events(args: &Map<String, Value>) -> Result<Intent, CalendarError> {
    reject_unknown_args(GET_EVENTS_TOOL, args, &GET_EVENTS_ARGS)?;
    let date = optional_string(args, ARG_DATE)?
        .map(|raw| parse_date(&raw).map_err(|error| with_field(ARG_DATE, error)))
        .transpose()?;
    Ok(Intent::QueryEvents { date })
}

fn reject_unknown_args(
    tool: &str,
    args: &Map<String, Value>,
    allowed: &[&str],
) -> Result<(), CalendarError> {
    let mut unknown = args
        .keys()
        .filter(|key| !allowed.contains(&key.as_str()))
        .map(String::as_str)
        .collect::<Vec<_>>();
    if unknown.is_empty() {
        return Ok(());
    }
    unknown.sort_unstable();
    Err(CalendarError::UnrecognizedIntent(format!(
        "unexpected argument(s) for {tool}: {}; allowed: {}",
        unknown.join(", "),
        allowed.join(", ")
    )))
}

fn required_string(args: &Map<String, Value>, key: &str) -> Result<String, CalendarError> {
    optional_string(args, key)?.ok_or_else(|| {
        CalendarError::UnrecognizedIntent(format!("missing required argument '{key}'"))
    })
}

fn optional_string(args: &Map<String, Value>, key: &str) -> Result<Option<String>, CalendarError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.trim())
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)),
        Some(other) => Err(CalendarError::UnrecognizedIntent(format!(
            "'{key}' must be a string, got {other}"
        ))),
    }
}

fn with_field(field: &str, error: CalendarError) -> CalendarError {
    match error {
        CalendarError::MalformedTimestamp(message) => {
            CalendarError::MalformedTimestamp(format!("{field}: {message}"))
        }
        other => other,
    }
}

/// Function declarations in the Gemini `functionDeclarations` schema.
pub fn tool_declarations() -> Value {
    json!([
        {
            "name": ADD_EVENT_TOOL,
            "description": "Schedule a new calendar event after checking for conflicts. \
                Times are the user's local wall-clock time with no offset.",
            "parameters": {
                "type": "OBJECT",
                "properties": {
                    ARG_SUMMARY: {
                        "type": "STRING",
                        "description": "Event title."
                    },
                    ARG_START: {
                        "type": "STRING",
                        "description": "Local start time, YYYY-MM-DDTHH:MM:SS, no 'Z' and no offset."
                    },
                    ARG_END: {
                        "type": "STRING",
                        "description": "Local end time, YYYY-MM-DDTHH:MM:SS, no 'Z' and no offset."
                    },
                    ARG_DESCRIPTION: {
                        "type": "STRING",
                        "description": "Optional event notes."
                    },
                    ARG_LOCATION: {
                        "type": "STRING",
                        "description": "Optional event location."
                    },
                    ARG_CONFIRM_OVERRIDE: {
                        "type": "BOOLEAN",
                        "description": "True only when the user explicitly asked to schedule despite a reported conflict."
                    }
                },
                "required": [ARG_SUMMARY, ARG_START, ARG_END]
            }
        },
        {
            "name": GET_EVENTS_TOOL,
            "description": "List the user's events for one day (default: today).",
            "parameters": {
                "type": "OBJECT",
                "properties": {
                    ARG_DATE: {
                        "type": "STRING",
                        "description": "Day to list, YYYY-MM-DD. Omit for today."
                    }
                }
            }
        }
    ])
}
