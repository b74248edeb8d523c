use thiserror::Error;

/// Failure kinds of the scheduling core.
///
/// Validation failures (`MalformedTimestamp`, `InvalidTimeZone`,
/// `InvalidInterval`, `UnrecognizedIntent`) are resolved by asking the model
/// or the user to resupply a field. `BackendUnavailable` is the only
/// retryable kind and must never be reported as an empty result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CalendarError {
    #[error("malformed timestamp: {0}")]
    MalformedTimestamp(String),
    #[error("invalid time zone: {0}")]
    InvalidTimeZone(String),
    #[error("invalid interval: {0}")]
    InvalidInterval(String),
    #[error("calendar backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("unrecognized intent: {0}")]
    UnrecognizedIntent(String),
}

impl CalendarError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }

    /// Stable label for logs and the outcome journal.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedTimestamp(_) => "malformed_timestamp",
            Self::InvalidTimeZone(_) => "invalid_time_zone",
            Self::InvalidInterval(_) => "invalid_interval",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::UnrecognizedIntent(_) => "unrecognized_intent",
        }
    }
}
