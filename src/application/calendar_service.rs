use crate::domain::error::CalendarError;
use crate::domain::models::{CalendarEvent, ConflictResult, EventHandle, UserContext};
use crate::domain::time::day_bounds;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::{GoogleCalendarEvent, decode_event, encode_new_event};
use crate::infrastructure::google_calendar_client::{GoogleCalendarClient, ListEventsRequest};
use chrono::{DateTime, NaiveDate, Utc};
use std::cmp::Ordering;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{Duration as TokioDuration, sleep, timeout};
use tracing::{info, warn};

const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 15;
const DEFAULT_EVENT_DESCRIPTION: &str = "Scheduled by FocusFlow";

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

/// Permission to write `[start, end)`.
///
/// Only [`CalendarService::clear_interval`] (after a conflict check that found
/// nothing) or an explicit user override can produce one, and
/// [`CalendarService::create_event`] takes it by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearedInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    by_override: bool,
}

impl ClearedInterval {
    /// The user confirmed scheduling over whatever is already there.
    pub fn confirmed_override(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, CalendarError> {
        ensure_interval(start, end)?;
        Ok(Self {
            start,
            end,
            by_override: true,
        })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn is_override(&self) -> bool {
        self.by_override
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clearance {
    Cleared(ClearedInterval),
    Blocked(CalendarEvent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
}

fn ensure_interval(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), CalendarError> {
    if end <= start {
        return Err(CalendarError::InvalidInterval(format!(
            "end {} is not after start {}",
            end.to_rfc3339(),
            start.to_rfc3339()
        )));
    }
    Ok(())
}

/// Total order on events so results never depend on backend order:
/// start, then title, then end, then id.
fn chronological(left: &CalendarEvent, right: &CalendarEvent) -> Ordering {
    left.start
        .cmp(&right.start)
        .then_with(|| left.title.cmp(&right.title))
        .then_with(|| left.end.cmp(&right.end))
        .then_with(|| left.id.cmp(&right.id))
}

/// Conflict checking, event insertion and day listing against one calendar.
pub struct CalendarService<C>
where
    C: GoogleCalendarClient,
{
    calendar_client: Arc<C>,
    calendar_id: String,
    retry_policy: RetryPolicy,
    request_timeout: TokioDuration,
    default_description: String,
}

impl<C> CalendarService<C>
where
    C: GoogleCalendarClient,
{
    pub fn new(calendar_client: Arc<C>, calendar_id: impl Into<String>) -> Self {
        Self {
            calendar_client,
            calendar_id: calendar_id.into(),
            retry_policy: RetryPolicy::default(),
            request_timeout: TokioDuration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS),
            default_description: DEFAULT_EVENT_DESCRIPTION.to_string(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: TokioDuration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_default_description(mut self, description: impl Into<String>) -> Self {
        self.default_description = description.into();
        self
    }

    /// Earliest-starting event intersecting `[start, end)`, if any.
    ///
    /// Backend failures are errors, never an empty (clear) result.
    pub async fn find_conflict(
        &self,
        context: &UserContext,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ConflictResult, CalendarError> {
        ensure_interval(start, end)?;
        let started = Instant::now();
        let events = self.fetch_decoded(context, start, end, "find_conflict").await?;

        let conflict = events
            .into_iter()
            .filter(|event| event.overlaps(start, end))
            .min_by(chronological);

        info!(
            user_id = %context.user_id,
            operation = "find_conflict",
            conflict = conflict.is_some(),
            duration_ms = started.elapsed().as_millis() as u64,
            "calendar_call_completed"
        );
        Ok(match conflict {
            Some(event) => ConflictResult::Conflict(event),
            None => ConflictResult::NoConflict,
        })
    }

    /// Run the conflict check and turn a clear answer into a write permit.
    pub async fn clear_interval(
        &self,
        context: &UserContext,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Clearance, CalendarError> {
        Ok(match self.find_conflict(context, start, end).await? {
            ConflictResult::NoConflict => Clearance::Cleared(ClearedInterval {
                start,
                end,
                by_override: false,
            }),
            ConflictResult::Conflict(event) => Clearance::Blocked(event),
        })
    }

    /// Insert one event over a cleared interval. Not retried: a timed-out
    /// insert may still have landed.
    pub async fn create_event(
        &self,
        context: &UserContext,
        event: &NewEvent,
        interval: ClearedInterval,
    ) -> Result<EventHandle, CalendarError> {
        ensure_interval(interval.start, interval.end)?;
        let title = event.title.trim();
        if title.is_empty() {
            return Err(CalendarError::UnrecognizedIntent(
                "event title must not be empty".to_string(),
            ));
        }

        let description = event
            .description
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(&self.default_description);
        let body = encode_new_event(
            title,
            interval.start,
            interval.end,
            description,
            event.location.as_deref(),
            &context.time_zone,
        );

        let started = Instant::now();
        let created = self
            .bounded(self.calendar_client.create_event(
                context.credentials.secret(),
                &self.calendar_id,
                &body,
            ))
            .await
            .map_err(|error| {
                warn!(
                    user_id = %context.user_id,
                    operation = "create_event",
                    error = %error,
                    "calendar_call_failed"
                );
                CalendarError::from(error)
            })?;

        let event_id = created
            .id
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                CalendarError::BackendUnavailable("created event has no id".to_string())
            })?;

        info!(
            user_id = %context.user_id,
            operation = "create_event",
            event_id = %event_id,
            by_override = interval.by_override,
            duration_ms = started.elapsed().as_millis() as u64,
            "calendar_call_completed"
        );
        Ok(EventHandle {
            event_id,
            title: title.to_string(),
            start: interval.start,
            end: interval.end,
            time_zone: context.time_zone.name().to_string(),
        })
    }

    /// Events of one local day in the user's zone, ascending by start.
    pub async fn list_events(
        &self,
        context: &UserContext,
        date: NaiveDate,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let (day_start, day_end) = day_bounds(date, &context.time_zone)?;
        let started = Instant::now();
        let mut events: Vec<CalendarEvent> = self
            .fetch_decoded(context, day_start, day_end, "list_events")
            .await?
            .into_iter()
            .filter(|event| event.overlaps(day_start, day_end))
            .collect();
        events.sort_by(chronological);

        info!(
            user_id = %context.user_id,
            operation = "list_events",
            date = %date,
            event_count = events.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "calendar_call_completed"
        );
        Ok(events)
    }

    async fn fetch_decoded(
        &self,
        context: &UserContext,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        operation: &'static str,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let request = ListEventsRequest {
            time_min,
            time_max,
            time_zone: Some(context.time_zone.name().to_string()),
        };
        let raw = self
            .list_events_with_retry(context, request, operation)
            .await
            .map_err(|error| {
                warn!(
                    user_id = %context.user_id,
                    operation,
                    error = %error,
                    "calendar_call_failed"
                );
                CalendarError::from(error)
            })?;

        let mut decoded = Vec::with_capacity(raw.len());
        for event in &raw {
            if let Some(event) = decode_event(event, &context.time_zone)? {
                decoded.push(event);
            }
        }
        Ok(decoded)
    }

    async fn list_events_with_retry(
        &self,
        context: &UserContext,
        request: ListEventsRequest,
        operation: &'static str,
    ) -> Result<Vec<GoogleCalendarEvent>, InfraError> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt: u8 = 0;

        loop {
            let result = self
                .bounded(self.calendar_client.list_events(
                    context.credentials.secret(),
                    &self.calendar_id,
                    request.clone(),
                ))
                .await;
            match result {
                Ok(events) => return Ok(events),
                Err(error) if error.is_transient() && attempt + 1 < max_attempts => {
                    let delay = self
                        .retry_policy
                        .base_delay_ms
                        .saturating_mul(2u64.saturating_pow(attempt as u32));
                    warn!(
                        user_id = %context.user_id,
                        operation,
                        attempt = attempt + 1,
                        delay_ms = delay,
                        error = %error,
                        "calendar_call_retrying"
                    );
                    sleep(TokioDuration::from_millis(delay)).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, InfraError>>,
    ) -> Result<T, InfraError> {
        match timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(InfraError::Timeout(self.request_timeout.as_secs())),
        }
    }
}
