//! In-memory calendar backend shared by the application test modules.

use crate::domain::models::{AccessToken, UserContext, UserTimeZoneContext};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::{CalendarEventDateTime, GoogleCalendarEvent};
use crate::infrastructure::gemini_client::{
    Content, FunctionCall, GenerateRequest, LanguageModelClient, Part,
};
use crate::infrastructure::google_calendar_client::{GoogleCalendarClient, ListEventsRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub enum FakeFailure {
    Network,
    Http(u16),
    /// Sleeps this long before answering, to trip the caller's timeout.
    Stall(Duration),
}

#[derive(Debug, Default)]
pub struct FakeCalendarBackend {
    events: Mutex<Vec<GoogleCalendarEvent>>,
    list_failures: Mutex<VecDeque<FakeFailure>>,
    create_failures: Mutex<VecDeque<FakeFailure>>,
    pub list_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
}

impl FakeCalendarBackend {
    pub fn with_events(events: Vec<GoogleCalendarEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            ..Self::default()
        }
    }

    pub fn fail_next_list(&self, failure: FakeFailure) {
        self.list_failures
            .lock()
            .expect("list failures mutex poisoned")
            .push_back(failure);
    }

    pub fn fail_next_create(&self, failure: FakeFailure) {
        self.create_failures
            .lock()
            .expect("create failures mutex poisoned")
            .push_back(failure);
    }

    pub fn stored_events(&self) -> Vec<GoogleCalendarEvent> {
        self.events.lock().expect("events mutex poisoned").clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    async fn apply_failure(failure: Option<FakeFailure>) -> Result<(), InfraError> {
        match failure {
            None => Ok(()),
            Some(FakeFailure::Network) => Err(InfraError::Network("connection reset".to_string())),
            Some(FakeFailure::Http(status)) => Err(InfraError::Http {
                status,
                body: "fake failure".to_string(),
            }),
            Some(FakeFailure::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

fn instant(value: &CalendarEventDateTime) -> Option<DateTime<Utc>> {
    value
        .date_time
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
}

#[async_trait]
impl GoogleCalendarClient for FakeCalendarBackend {
    async fn list_events(
        &self,
        _access_token: &str,
        _calendar_id: &str,
        request: ListEventsRequest,
    ) -> Result<Vec<GoogleCalendarEvent>, InfraError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let failure = self
            .list_failures
            .lock()
            .expect("list failures mutex poisoned")
            .pop_front();
        Self::apply_failure(failure).await?;

        let events = self.events.lock().expect("events mutex poisoned").clone();
        Ok(events
            .into_iter()
            .filter(|event| match (instant(&event.start), instant(&event.end)) {
                (Some(start), Some(end)) => start < request.time_max && end > request.time_min,
                // All-day and malformed entries are passed through for the caller to decode.
                _ => true,
            })
            .collect())
    }

    async fn create_event(
        &self,
        _access_token: &str,
        _calendar_id: &str,
        event: &GoogleCalendarEvent,
    ) -> Result<GoogleCalendarEvent, InfraError> {
        let sequence = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let failure = self
            .create_failures
            .lock()
            .expect("create failures mutex poisoned")
            .pop_front();
        Self::apply_failure(failure).await?;

        let mut created = event.clone();
        created.id = Some(format!("evt-{sequence}"));
        created.status = Some("confirmed".to_string());
        self.events
            .lock()
            .expect("events mutex poisoned")
            .push(created.clone());
        Ok(created)
    }
}

pub fn timed_event(id: &str, title: &str, start: &str, end: &str) -> GoogleCalendarEvent {
    GoogleCalendarEvent {
        id: Some(id.to_string()),
        summary: Some(title.to_string()),
        description: None,
        location: None,
        status: Some("confirmed".to_string()),
        start: CalendarEventDateTime {
            date_time: Some(start.to_string()),
            ..CalendarEventDateTime::default()
        },
        end: CalendarEventDateTime {
            date_time: Some(end.to_string()),
            ..CalendarEventDateTime::default()
        },
        reminders: None,
    }
}

pub fn user(zone: &str) -> UserContext {
    UserContext::new(
        "user-1",
        UserTimeZoneContext::new(zone).expect("valid zone"),
        AccessToken::new("test-access-token"),
    )
}

pub fn fixed_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .expect("valid datetime")
        .with_timezone(&Utc)
}

/// Language model that replays scripted replies and records every request.
#[derive(Debug, Default)]
pub struct ScriptedLanguageModel {
    replies: Mutex<VecDeque<Result<Content, String>>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedLanguageModel {
    pub fn scripted(replies: Vec<Result<Content, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().expect("requests mutex poisoned").clone()
    }
}

#[async_trait]
impl LanguageModelClient for ScriptedLanguageModel {
    async fn generate(&self, request: &GenerateRequest) -> Result<Content, InfraError> {
        self.requests
            .lock()
            .expect("requests mutex poisoned")
            .push(request.clone());
        match self.replies.lock().expect("replies mutex poisoned").pop_front() {
            Some(Ok(content)) => Ok(content),
            Some(Err(message)) => Err(InfraError::Network(message)),
            None => Ok(Content::model_text("")),
        }
    }
}

pub fn function_call(name: &str, args: Value) -> Content {
    Content {
        role: "model".to_string(),
        parts: vec![Part {
            function_call: Some(FunctionCall {
                name: name.to_string(),
                args,
            }),
            ..Part::default()
        }],
    }
}
