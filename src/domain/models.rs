use crate::domain::error::CalendarError;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// IANA zone a user scheduled under. Construction fails for names the tz
/// database does not know; there is no fallback to UTC or the host zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserTimeZoneContext {
    name: String,
    tz: Tz,
}

impl UserTimeZoneContext {
    pub fn new(name: &str) -> Result<Self, CalendarError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CalendarError::InvalidTimeZone(
                "time zone must not be empty".to_string(),
            ));
        }
        let tz = name.parse::<Tz>().map_err(|_| {
            CalendarError::InvalidTimeZone(format!("'{name}' is not an IANA time zone"))
        })?;
        Ok(Self {
            name: name.to_string(),
            tz,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }
}

impl TryFrom<String> for UserTimeZoneContext {
    type Error = CalendarError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<UserTimeZoneContext> for String {
    fn from(value: UserTimeZoneContext) -> Self {
        value.name
    }
}

impl fmt::Display for UserTimeZoneContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Bearer token for the calendar backend. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Everything one request runs under. Passed explicitly on every call.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub user_id: String,
    pub display_name: Option<String>,
    pub time_zone: UserTimeZoneContext,
    pub credentials: AccessToken,
}

impl UserContext {
    pub fn new(
        user_id: impl Into<String>,
        time_zone: UserTimeZoneContext,
        credentials: AccessToken,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
            time_zone,
            credentials,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: Option<String>,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub description: Option<String>,
    pub location: Option<String>,
}

impl CalendarEvent {
    /// Half-open overlap with `[start, end)`; touching endpoints do not overlap.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && self.end > start
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictResult {
    NoConflict,
    Conflict(CalendarEvent),
}

impl ConflictResult {
    pub fn is_clear(&self) -> bool {
        matches!(self, Self::NoConflict)
    }
}

/// What the Event Writer hands back after a successful insert.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EventHandle {
    pub event_id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub time_zone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub token_type: String,
    pub scope: Option<String>,
}

impl OAuthToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>, leeway_seconds: i64) -> bool {
        self.expires_at > now + chrono::Duration::seconds(leeway_seconds)
            && !self.access_token.trim().is_empty()
    }

    pub fn access(&self) -> AccessToken {
        AccessToken::new(self.access_token.clone())
    }
}
