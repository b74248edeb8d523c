use crate::domain::error::CalendarError;
use crate::domain::models::{CalendarEvent, EventHandle, UserTimeZoneContext};
use crate::domain::time::{format_date, format_day_time, format_time};
use chrono::NaiveDate;
use serde_json::{Value, json};

/// Terminal state of one resolved intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Scheduled(EventHandle),
    /// The proposed slot collides with this event; nothing was written.
    ConflictReported(CalendarEvent),
    Listed {
        date: NaiveDate,
        is_today: bool,
        events: Vec<CalendarEvent>,
    },
    Rejected(CalendarError),
    Failed(CalendarError),
}

impl Outcome {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Scheduled(_) => "scheduled",
            Self::ConflictReported(_) => "conflict",
            Self::Listed { .. } => "listed",
            Self::Rejected(_) => "rejected",
            Self::Failed(_) => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Scheduled(_) | Self::Listed { .. })
    }
}

/// An outcome plus the one human-readable message it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub outcome: Outcome,
    pub message: String,
}

impl Resolution {
    pub fn new(outcome: Outcome, tz: &UserTimeZoneContext) -> Self {
        let message = render_message(&outcome, tz);
        Self { outcome, message }
    }

    /// Rejection raised before a user timezone is known.
    pub fn rejected(error: CalendarError) -> Self {
        let message = rejection_message(&error);
        Self {
            outcome: Outcome::Rejected(error),
            message,
        }
    }

    pub fn ok(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn scheduled(&self) -> Option<&EventHandle> {
        match &self.outcome {
            Outcome::Scheduled(handle) => Some(handle),
            _ => None,
        }
    }

    /// Payload returned to the model as the function response.
    pub fn function_response(&self) -> Value {
        let mut response = json!({
            "ok": self.ok(),
            "status": self.outcome.status(),
            "result": self.message,
        });
        match &self.outcome {
            Outcome::ConflictReported(event) => {
                response["conflicting_event"] = json!(event.title);
            }
            Outcome::Rejected(error) | Outcome::Failed(error) => {
                response["error_kind"] = json!(error.kind());
                response["retryable"] = json!(error.is_retryable());
            }
            Outcome::Scheduled(handle) => {
                response["event_id"] = json!(handle.event_id);
            }
            Outcome::Listed { events, .. } => {
                response["event_count"] = json!(events.len());
            }
        }
        response
    }
}

fn render_message(outcome: &Outcome, tz: &UserTimeZoneContext) -> String {
    match outcome {
        Outcome::Scheduled(handle) => format!(
            "Event '{}' was successfully added for {} to {} ({}).",
            handle.title,
            format_day_time(handle.start, tz),
            format_time(handle.end, tz),
            handle.time_zone
        ),
        Outcome::ConflictReported(event) => format!(
            "Conflict detected. You already have '{}' scheduled at {}. \
             Ask the user whether to schedule it anyway or pick a different time.",
            event.title,
            format_time(event.start, tz)
        ),
        Outcome::Listed {
            date,
            is_today,
            events,
        } => {
            let descriptor = if *is_today {
                "for today".to_string()
            } else {
                format!("for {}", format_date(*date))
            };
            if events.is_empty() {
                return format!("Your schedule is clear {descriptor}!");
            }
            let lines = events
                .iter()
                .map(|event| format!("- {} at {}", event.title, format_time(event.start, tz)))
                .collect::<Vec<_>>();
            format!("Here is your schedule {descriptor}:\n{}", lines.join("\n"))
        }
        Outcome::Rejected(error) => rejection_message(error),
        Outcome::Failed(error) => {
            format!("The calendar could not be reached ({error}). Please try again shortly.")
        }
    }
}

fn rejection_message(error: &CalendarError) -> String {
    format!("Request rejected: {error}. Correct the request and try again.")
}
