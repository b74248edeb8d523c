use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::GoogleCalendarEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3/";
const MAX_RESULTS_PER_PAGE: &str = "2500";
const MAX_PAGES: usize = 20;

#[derive(Debug, Clone)]
pub struct ListEventsRequest {
    pub time_min: DateTime<Utc>,
    pub time_max: DateTime<Utc>,
    pub time_zone: Option<String>,
}

#[async_trait]
pub trait GoogleCalendarClient: Send + Sync {
    /// Expanded (single) events intersecting `[time_min, time_max)`, all pages.
    async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        request: ListEventsRequest,
    ) -> Result<Vec<GoogleCalendarEvent>, InfraError>;

    /// Insert one event and return the stored resource.
    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &GoogleCalendarEvent,
    ) -> Result<GoogleCalendarEvent, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestGoogleCalendarClient {
    client: Client,
    base_url: String,
    timeout_seconds: u64,
}

impl ReqwestGoogleCalendarClient {
    pub fn new(timeout_seconds: u64) -> Result<Self, InfraError> {
        Self::with_base_url(CALENDAR_API_BASE, timeout_seconds)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout_seconds: u64) -> Result<Self, InfraError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|error| InfraError::InvalidConfig(format!("cannot build http client: {error}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout_seconds,
        })
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::InvalidConfig(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn transport_error(&self, action: &str, error: reqwest::Error) -> InfraError {
        if error.is_timeout() {
            InfraError::Timeout(self.timeout_seconds)
        } else {
            InfraError::Network(format!("{action}: {error}"))
        }
    }

    fn events_endpoint(&self, calendar_id: &str) -> Result<Url, InfraError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid calendar api base url: {error}")))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("calendar api base URL cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.push("calendars");
            segments.push(calendar_id);
            segments.push("events");
        }
        Ok(url)
    }

    async fn read_body(&self, response: reqwest::Response, action: &str) -> Result<String, InfraError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| self.transport_error(action, error))?;
        if !status.is_success() {
            return Err(InfraError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[derive(Debug, serde::Deserialize)]
struct EventsPageResponse {
    items: Option<Vec<GoogleCalendarEvent>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[async_trait]
impl GoogleCalendarClient for ReqwestGoogleCalendarClient {
    async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        request: ListEventsRequest,
    ) -> Result<Vec<GoogleCalendarEvent>, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(calendar_id, "calendar id")?;

        let endpoint = self.events_endpoint(calendar_id)?;
        let mut page_token: Option<String> = None;
        let mut seen_tokens = HashSet::new();
        let mut events = Vec::new();

        for _ in 0..MAX_PAGES {
            let mut req = self
                .client
                .get(endpoint.clone())
                .bearer_auth(access_token)
                .query(&[
                    ("singleEvents", "true"),
                    ("orderBy", "startTime"),
                    ("maxResults", MAX_RESULTS_PER_PAGE),
                ])
                .query(&[
                    ("timeMin", request.time_min.to_rfc3339()),
                    ("timeMax", request.time_max.to_rfc3339()),
                ]);
            if let Some(time_zone) = request.time_zone.as_deref() {
                req = req.query(&[("timeZone", time_zone)]);
            }
            if let Some(page_token) = page_token.as_deref() {
                req = req.query(&[("pageToken", page_token)]);
            }

            let response = req
                .send()
                .await
                .map_err(|error| self.transport_error("listing calendar events", error))?;
            let body = self.read_body(response, "reading events list response").await?;

            let mut parsed: EventsPageResponse = serde_json::from_str(&body).map_err(|error| {
                InfraError::Decode(format!("events list: {error}; body={body}"))
            })?;
            events.extend(parsed.items.take().unwrap_or_default());

            let Some(next_page_token) = parsed.next_page_token.take() else {
                return Ok(events);
            };
            // A truncated listing could hide a conflict, so a looping cursor is an error.
            if !seen_tokens.insert(next_page_token.clone()) {
                return Err(InfraError::Decode(format!(
                    "events list repeated page token '{next_page_token}'"
                )));
            }
            page_token = Some(next_page_token);
        }

        Err(InfraError::Decode(format!("events list exceeded {MAX_PAGES} pages")))
    }

    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &GoogleCalendarEvent,
    ) -> Result<GoogleCalendarEvent, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(calendar_id, "calendar id")?;

        let endpoint = self.events_endpoint(calendar_id)?;
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await
            .map_err(|error| self.transport_error("creating event", error))?;
        let body = self.read_body(response, "reading event create response").await?;

        let created: GoogleCalendarEvent = serde_json::from_str(&body)
            .map_err(|error| InfraError::Decode(format!("event create: {error}; body={body}")))?;
        let has_id = created
            .id
            .as_deref()
            .map(str::trim)
            .is_some_and(|value| !value.is_empty());
        if !has_id {
            return Err(InfraError::Decode(
                "event create response did not include id".to_string(),
            ));
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::event_mapper::CalendarEventDateTime;
    use serde_json::json;
    use wiremock::matchers::{
        body_partial_json, header, method, path, query_param, query_param_is_missing,
    };
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn remote_item(id: &str, summary: &str) -> serde_json::Value {
        json!({
            "id": id,
            "summary": summary,
            "status": "confirmed",
            "start": { "dateTime": "2024-08-04T20:00:00+05:30" },
            "end": { "dateTime": "2024-08-04T20:30:00+05:30" }
        })
    }

    fn day_request() -> ListEventsRequest {
        ListEventsRequest {
            time_min: fixed_time("2024-08-03T18:30:00Z"),
            time_max: fixed_time("2024-08-04T18:30:00Z"),
            time_zone: Some("Asia/Kolkata".to_string()),
        }
    }

    #[tokio::test]
    async fn list_events_follows_pagination() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(header("authorization", "Bearer token-1"))
            .and(query_param("singleEvents", "true"))
            .and(query_param("orderBy", "startTime"))
            .and(query_param("timeMin", "2024-08-03T18:30:00+00:00"))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [remote_item("evt-2", "Gym")]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [remote_item("evt-1", "Physics Lecture")],
                "nextPageToken": "page-2"
            })))
            .mount(&server)
            .await;

        let client = ReqwestGoogleCalendarClient::with_base_url(server.uri(), 5).expect("client");
        let events = client
            .list_events("token-1", "primary", day_request())
            .await
            .expect("list events");

        let ids = events.iter().filter_map(|event| event.id.as_deref()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["evt-1", "evt-2"]);
    }

    #[tokio::test]
    async fn repeated_page_token_stops_listing_with_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [remote_item("evt-1", "Physics Lecture")],
                "nextPageToken": "same-page"
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = ReqwestGoogleCalendarClient::with_base_url(server.uri(), 5).expect("client");
        let result = client.list_events("token-1", "primary", day_request()).await;
        match result {
            Err(InfraError::Decode(message)) => assert!(message.contains("same-page")),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn endless_distinct_page_tokens_are_capped() {
        let server = MockServer::start().await;
        for page in 0..=MAX_PAGES {
            let next = format!("page-{}", page + 1);
            let mock = Mock::given(method("GET")).and(path("/calendars/primary/events"));
            let mock = if page == 0 {
                mock.and(query_param_is_missing("pageToken"))
            } else {
                mock.and(query_param("pageToken", format!("page-{page}")))
            };
            mock.respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [],
                "nextPageToken": next
            })))
            .mount(&server)
            .await;
        }

        let client = ReqwestGoogleCalendarClient::with_base_url(server.uri(), 5).expect("client");
        let result = client.list_events("token-1", "primary", day_request()).await;
        match result {
            Err(InfraError::Decode(message)) => assert!(message.contains("exceeded")),
            other => panic!("expected decode error, got {other:?}"),
        }
        let requests = server.received_requests().await.expect("recorded requests");
        assert_eq!(requests.len(), MAX_PAGES);
    }

    #[tokio::test]
    async fn list_events_surfaces_auth_failure_as_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid credentials"))
            .mount(&server)
            .await;

        let client = ReqwestGoogleCalendarClient::with_base_url(server.uri(), 5).expect("client");
        let result = client.list_events("expired", "primary", day_request()).await;
        match result {
            Err(InfraError::Http { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid credentials");
            }
            other => panic!("expected http error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_events_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "items": [] }))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let client = ReqwestGoogleCalendarClient::with_base_url(server.uri(), 1).expect("client");
        let result = client.list_events("token", "primary", day_request()).await;
        assert!(matches!(result, Err(InfraError::Timeout(1))));
    }

    #[tokio::test]
    async fn create_event_posts_body_and_returns_created_resource() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendars/primary/events"))
            .and(body_partial_json(json!({
                "summary": "Study",
                "start": { "timeZone": "Asia/Kolkata" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(remote_item("created-1", "Study")))
            .expect(1)
            .mount(&server)
            .await;

        let client = ReqwestGoogleCalendarClient::with_base_url(server.uri(), 5).expect("client");
        let event = GoogleCalendarEvent {
            id: None,
            summary: Some("Study".to_string()),
            description: None,
            location: None,
            status: None,
            start: CalendarEventDateTime {
                date_time: Some("2024-08-04T20:00:00+05:30".to_string()),
                date: None,
                time_zone: Some("Asia/Kolkata".to_string()),
            },
            end: CalendarEventDateTime {
                date_time: Some("2024-08-04T21:00:00+05:30".to_string()),
                date: None,
                time_zone: Some("Asia/Kolkata".to_string()),
            },
            reminders: None,
        };
        let created = client
            .create_event("token", "primary", &event)
            .await
            .expect("create event");
        assert_eq!(created.id.as_deref(), Some("created-1"));
    }

    #[tokio::test]
    async fn create_event_without_id_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "start": { "dateTime": "2024-08-04T20:00:00+05:30" },
                "end": { "dateTime": "2024-08-04T21:00:00+05:30" }
            })))
            .mount(&server)
            .await;

        let client = ReqwestGoogleCalendarClient::with_base_url(server.uri(), 5).expect("client");
        let event: GoogleCalendarEvent =
            serde_json::from_value(remote_item("ignored", "Study")).expect("event");
        let result = client.create_event("token", "primary", &event).await;
        assert!(matches!(result, Err(InfraError::Decode(_))));
    }

    #[test]
    fn empty_calendar_id_is_rejected_before_any_request() {
        let client = ReqwestGoogleCalendarClient::with_base_url("http://127.0.0.1:9", 1).expect("client");
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let result = runtime.block_on(client.list_events("token", "  ", day_request()));
        assert!(matches!(result, Err(InfraError::InvalidConfig(_))));
    }
}
