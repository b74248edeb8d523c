use crate::application::calendar_service::{CalendarService, Clearance, ClearedInterval, NewEvent};
use crate::domain::error::CalendarError;
use crate::domain::intent::{Intent, ScheduleRequest, parse_tool_call};
use crate::domain::models::UserContext;
use crate::domain::outcome::{Outcome, Resolution};
use crate::domain::time::{localize, today_in};
use crate::infrastructure::google_calendar_client::GoogleCalendarClient;
use crate::infrastructure::outcome_journal::{JournalEntry, OutcomeJournal};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Drives one structured intent to a terminal [`Outcome`].
///
/// A schedule request only reaches the writer with a [`ClearedInterval`],
/// which comes from a conflict check in the same call or from an explicit
/// override flag on the intent. Two concurrent requests for the same user can
/// still both pass their checks before either write lands; the calendar
/// backend offers no conditional insert, so that race is accepted.
pub struct IntentResolver<C>
where
    C: GoogleCalendarClient,
{
    calendar: Arc<CalendarService<C>>,
    journal: Option<Arc<dyn OutcomeJournal>>,
    now_provider: NowProvider,
}

impl<C> IntentResolver<C>
where
    C: GoogleCalendarClient,
{
    pub fn new(calendar: Arc<CalendarService<C>>) -> Self {
        Self {
            calendar,
            journal: None,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_journal(mut self, journal: Arc<dyn OutcomeJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub async fn resolve(&self, intent: &Intent, context: &UserContext) -> Resolution {
        let outcome = match intent {
            Intent::ScheduleEvent(request) => self.schedule(request, context).await,
            Intent::QueryEvents { date } => self.query(*date, context).await,
        };
        self.finish(intent.kind(), outcome, context)
    }

    /// Validate a raw model function call, then resolve it. Validation
    /// failures end in `Rejected` without touching the calendar.
    pub async fn resolve_tool_call(
        &self,
        name: &str,
        args: &Value,
        context: &UserContext,
    ) -> Resolution {
        match parse_tool_call(name, args) {
            Ok(intent) => self.resolve(&intent, context).await,
            Err(error) => {
                warn!(
                    user_id = %context.user_id,
                    tool = name,
                    error = %error,
                    "tool_call_rejected"
                );
                self.finish(name, Outcome::Rejected(error), context)
            }
        }
    }

    async fn schedule(&self, request: &ScheduleRequest, context: &UserContext) -> Outcome {
        let interval = localize(request.start, &context.time_zone).and_then(|start| {
            let end = localize(request.end, &context.time_zone)?;
            if end <= start {
                return Err(CalendarError::InvalidInterval(format!(
                    "end {} is not after start {}",
                    request.end, request.start
                )));
            }
            Ok((start, end))
        });
        let (start, end) = match interval {
            Ok(interval) => interval,
            Err(error) => return Outcome::Rejected(error),
        };

        let cleared = if request.confirm_override {
            match ClearedInterval::confirmed_override(start, end) {
                Ok(cleared) => cleared,
                Err(error) => return Outcome::Rejected(error),
            }
        } else {
            match self.calendar.clear_interval(context, start, end).await {
                Ok(Clearance::Cleared(cleared)) => cleared,
                Ok(Clearance::Blocked(event)) => return Outcome::ConflictReported(event),
                Err(error) => return failure(error),
            }
        };

        let event = NewEvent {
            title: request.title.clone(),
            description: request.description.clone(),
            location: request.location.clone(),
        };
        match self.calendar.create_event(context, &event, cleared).await {
            Ok(handle) => Outcome::Scheduled(handle),
            Err(error) => failure(error),
        }
    }

    async fn query(&self, date: Option<NaiveDate>, context: &UserContext) -> Outcome {
        let today = today_in((self.now_provider)(), &context.time_zone);
        let date = date.unwrap_or(today);
        match self.calendar.list_events(context, date).await {
            Ok(events) => Outcome::Listed {
                date,
                is_today: date == today,
                events,
            },
            Err(error) => failure(error),
        }
    }

    fn finish(&self, intent_kind: &str, outcome: Outcome, context: &UserContext) -> Resolution {
        let resolution = Resolution::new(outcome, &context.time_zone);
        info!(
            user_id = %context.user_id,
            intent = intent_kind,
            outcome = resolution.outcome.status(),
            ok = resolution.ok(),
            "intent_resolved"
        );

        if let Some(journal) = &self.journal {
            let entry = JournalEntry {
                user_id: context.user_id.clone(),
                intent_kind: intent_kind.to_string(),
                status: resolution.outcome.status().to_string(),
                ok: resolution.ok(),
                message: resolution.message.clone(),
                recorded_at: (self.now_provider)(),
            };
            if let Err(error) = journal.record(&entry) {
                warn!(
                    user_id = %context.user_id,
                    error = %error,
                    "failed to record resolution"
                );
            }
        }
        resolution
    }
}

fn failure(error: CalendarError) -> Outcome {
    if error.is_retryable() {
        Outcome::Failed(error)
    } else {
        Outcome::Rejected(error)
    }
}
