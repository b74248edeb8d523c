use crate::application::assistant::Assistant;
use crate::application::bootstrap::bootstrap_workspace;
use crate::application::calendar_service::{CalendarService, RetryPolicy};
use crate::application::oauth::{
    CALENDAR_EVENTS_SCOPE, DEFAULT_REDIRECT_URI, EnsureTokenResult, OAuthConfig, OAuthManager,
};
use crate::application::orchestrator::IntentResolver;
use crate::domain::intent::GET_EVENTS_TOOL;
use crate::domain::models::{AccessToken, UserContext, UserTimeZoneContext};
use crate::domain::outcome::{Outcome, Resolution};
use crate::infrastructure::config::AppSettings;
use crate::infrastructure::credential_store::{CredentialStore, KeyringCredentialStore};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::gemini_client::{Content, LanguageModelClient, ReqwestGeminiClient};
use crate::infrastructure::google_calendar_client::{
    GoogleCalendarClient, ReqwestGoogleCalendarClient,
};
use crate::infrastructure::oauth_client::{OAuthHttpClient, ReqwestOAuthClient};
use crate::infrastructure::outcome_journal::{OutcomeJournal, SqliteOutcomeJournal};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

const DEFAULT_RECENT_LIMIT: usize = 20;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

/// Process-wide state shared by every command call.
pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    settings: AppSettings,
    journal: Arc<dyn OutcomeJournal>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let journal = Arc::new(
            SqliteOutcomeJournal::new(&bootstrap.database_path)
                .with_retention(bootstrap.settings.journal_retention_per_user),
        );
        Ok(Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            logs_dir: bootstrap.logs_dir,
            settings: bootstrap.settings,
            journal,
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn command_error(&self, command: &str, error: &dyn Display) -> String {
        error!(command, error = %error, "command_failed");
        error.to_string()
    }

    fn calendar_service<C>(&self, calendar_client: Arc<C>) -> CalendarService<C>
    where
        C: GoogleCalendarClient,
    {
        CalendarService::new(calendar_client, self.settings.calendar_id.clone())
            .with_retry_policy(RetryPolicy {
                max_attempts: self.settings.retry_max_attempts,
                base_delay_ms: self.settings.retry_base_delay_ms,
            })
            .with_request_timeout(Duration::from_secs(self.settings.request_timeout_seconds))
            .with_default_description(self.settings.event_description.clone())
    }

    fn resolver<C>(&self, calendar_client: Arc<C>) -> IntentResolver<C>
    where
        C: GoogleCalendarClient,
    {
        IntentResolver::new(Arc::new(self.calendar_service(calendar_client)))
            .with_journal(Arc::clone(&self.journal))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthenticateGoogleResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// Structured result of one resolved intent; presentation layers pick glyphs
/// from `ok` and `status`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResolutionResponse {
    pub ok: bool,
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicting_event: Option<String>,
}

impl From<&Resolution> for ResolutionResponse {
    fn from(resolution: &Resolution) -> Self {
        let (error_kind, retryable) = match &resolution.outcome {
            Outcome::Rejected(error) | Outcome::Failed(error) => {
                (Some(error.kind().to_string()), error.is_retryable())
            }
            _ => (None, false),
        };
        let conflicting_event = match &resolution.outcome {
            Outcome::ConflictReported(event) => Some(event.title.clone()),
            _ => None,
        };
        Self {
            ok: resolution.ok(),
            status: resolution.outcome.status().to_string(),
            message: resolution.message.clone(),
            error_kind,
            retryable,
            event_id: resolution.scheduled().map(|handle| handle.event_id.clone()),
            conflicting_event,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistantResponse {
    pub reply: String,
    pub resolutions: Vec<ResolutionResponse>,
    pub history: Vec<Content>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct JournalEntryResponse {
    pub intent_kind: String,
    pub status: String,
    pub ok: bool,
    pub message: String,
    pub recorded_at: String,
}

pub async fn authenticate_google_impl(
    state: &AppState,
    user_id: String,
    authorization_code: Option<String>,
) -> Result<AuthenticateGoogleResponse, InfraError> {
    let manager = oauth_manager(state, load_oauth_config_from_env()?)?;
    authenticate_with(&manager, &user_id, authorization_code).await
}

pub fn sign_out_google_impl(state: &AppState, user_id: String) -> Result<(), InfraError> {
    let manager = oauth_manager(state, load_oauth_config_from_env()?)?;
    sign_out_with(&manager, &user_id)
}

/// Resolve one model function call for a signed-in user.
pub async fn resolve_intent_impl(
    state: &AppState,
    user_id: String,
    time_zone: String,
    tool_name: String,
    arguments: Value,
) -> Result<ResolutionResponse, InfraError> {
    let time_zone = match user_time_zone(&user_id, &time_zone) {
        Ok(time_zone) => time_zone,
        Err(rejected) => return Ok(ResolutionResponse::from(&rejected)),
    };
    let context = live_user_context(state, &user_id, time_zone, None).await?;
    let calendar_client = Arc::new(ReqwestGoogleCalendarClient::new(
        state.settings.request_timeout_seconds,
    )?);
    Ok(resolve_tool_call_with(state, calendar_client, &context, &tool_name, &arguments).await)
}

/// Schedule for `date` (`YYYY-MM-DD`), or for today in the user's zone.
pub async fn list_events_impl(
    state: &AppState,
    user_id: String,
    time_zone: String,
    date: Option<String>,
) -> Result<ResolutionResponse, InfraError> {
    let time_zone = match user_time_zone(&user_id, &time_zone) {
        Ok(time_zone) => time_zone,
        Err(rejected) => return Ok(ResolutionResponse::from(&rejected)),
    };
    let context = live_user_context(state, &user_id, time_zone, None).await?;
    let calendar_client = Arc::new(ReqwestGoogleCalendarClient::new(
        state.settings.request_timeout_seconds,
    )?);
    let arguments = json!({ "date_str": date });
    Ok(resolve_tool_call_with(state, calendar_client, &context, GET_EVENTS_TOOL, &arguments).await)
}

pub async fn ask_assistant_impl(
    state: &AppState,
    user_id: String,
    display_name: Option<String>,
    time_zone: String,
    message: String,
    history: Vec<Content>,
) -> Result<AssistantResponse, InfraError> {
    let time_zone = match user_time_zone(&user_id, &time_zone) {
        Ok(time_zone) => time_zone,
        Err(rejected) => {
            return Ok(AssistantResponse {
                reply: rejected.message.clone(),
                resolutions: vec![ResolutionResponse::from(&rejected)],
                history,
            });
        }
    };
    let api_key = load_gemini_api_key_from_env()?;
    let context = live_user_context(state, &user_id, time_zone, display_name).await?;
    let model = Arc::new(ReqwestGeminiClient::new(
        api_key,
        state.settings.model_name.clone(),
        state.settings.request_timeout_seconds,
    )?);
    let calendar_client = Arc::new(ReqwestGoogleCalendarClient::new(
        state.settings.request_timeout_seconds,
    )?);
    ask_assistant_with(state, model, calendar_client, &context, &history, &message).await
}

pub fn recent_resolutions_impl(
    state: &AppState,
    user_id: String,
    limit: Option<usize>,
) -> Result<Vec<JournalEntryResponse>, InfraError> {
    let user_id = normalized_user_id(&user_id)?;
    let entries = state
        .journal
        .recent(user_id, limit.unwrap_or(DEFAULT_RECENT_LIMIT))?;
    Ok(entries
        .into_iter()
        .map(|entry| JournalEntryResponse {
            intent_kind: entry.intent_kind,
            status: entry.status,
            ok: entry.ok,
            message: entry.message,
            recorded_at: entry.recorded_at.to_rfc3339(),
        })
        .collect())
}

async fn resolve_tool_call_with<C>(
    state: &AppState,
    calendar_client: Arc<C>,
    context: &UserContext,
    tool_name: &str,
    arguments: &Value,
) -> ResolutionResponse
where
    C: GoogleCalendarClient,
{
    let resolution = state
        .resolver(calendar_client)
        .resolve_tool_call(tool_name, arguments, context)
        .await;
    ResolutionResponse::from(&resolution)
}

async fn ask_assistant_with<L, C>(
    state: &AppState,
    model: Arc<L>,
    calendar_client: Arc<C>,
    context: &UserContext,
    history: &[Content],
    message: &str,
) -> Result<AssistantResponse, InfraError>
where
    L: LanguageModelClient,
    C: GoogleCalendarClient,
{
    if message.trim().is_empty() {
        return Err(InfraError::InvalidConfig("message must not be empty".to_string()));
    }
    let assistant = Assistant::new(model, Arc::new(state.resolver(calendar_client)))
        .with_max_tool_rounds(state.settings.max_tool_rounds);
    let reply = assistant
        .respond(context, history, message)
        .await
        .map_err(|error| InfraError::Network(format!("assistant turn failed: {error}")))?;

    Ok(AssistantResponse {
        reply: reply.text,
        resolutions: reply.resolutions.iter().map(ResolutionResponse::from).collect(),
        history: reply.history,
    })
}

async fn authenticate_with<S, C>(
    manager: &OAuthManager<S, C>,
    user_id: &str,
    authorization_code: Option<String>,
) -> Result<AuthenticateGoogleResponse, InfraError>
where
    S: CredentialStore,
    C: OAuthHttpClient,
{
    let user_id = normalized_user_id(user_id)?;

    if let Some(raw_code) = authorization_code {
        let code = raw_code.trim();
        if code.is_empty() {
            return Err(InfraError::InvalidConfig(
                "authorization_code must not be empty".to_string(),
            ));
        }
        let token = manager.authenticate_with_code(user_id, code).await?;
        return Ok(AuthenticateGoogleResponse {
            status: "authenticated".to_string(),
            authorization_url: None,
            expires_at: Some(token.expires_at.to_rfc3339()),
        });
    }

    match manager.ensure_access_token(user_id).await? {
        EnsureTokenResult::Existing(token) => Ok(AuthenticateGoogleResponse {
            status: "existing".to_string(),
            authorization_url: None,
            expires_at: Some(token.expires_at.to_rfc3339()),
        }),
        EnsureTokenResult::Refreshed(token) => Ok(AuthenticateGoogleResponse {
            status: "refreshed".to_string(),
            authorization_url: None,
            expires_at: Some(token.expires_at.to_rfc3339()),
        }),
        EnsureTokenResult::ReauthenticationRequired => {
            let auth_state = format!("{user_id}:{}", next_id("oauth-state"));
            let authorization_url = manager.build_authorization_url(&auth_state)?;
            info!(user_id, "oauth_reauthentication_required");
            Ok(AuthenticateGoogleResponse {
                status: "reauthentication_required".to_string(),
                authorization_url: Some(authorization_url),
                expires_at: None,
            })
        }
    }
}

fn sign_out_with<S, C>(manager: &OAuthManager<S, C>, user_id: &str) -> Result<(), InfraError>
where
    S: CredentialStore,
    C: OAuthHttpClient,
{
    let user_id = normalized_user_id(user_id)?;
    manager.clear_stored_token(user_id)?;
    info!(user_id, "oauth_token_cleared");
    Ok(())
}

fn oauth_manager(
    state: &AppState,
    config: OAuthConfig,
) -> Result<OAuthManager<KeyringCredentialStore, ReqwestOAuthClient>, InfraError> {
    let credential_store = Arc::new(KeyringCredentialStore::default());
    let oauth_client = Arc::new(ReqwestOAuthClient::new(state.settings.request_timeout_seconds)?);
    Ok(OAuthManager::new(config, credential_store, oauth_client))
}

async fn required_access_token<S, C>(
    manager: &OAuthManager<S, C>,
    user_id: &str,
) -> Result<AccessToken, InfraError>
where
    S: CredentialStore,
    C: OAuthHttpClient,
{
    manager.ensure_access_token(user_id).await?.access().ok_or_else(|| {
        InfraError::OAuth(format!(
            "google authentication required for '{user_id}'; call authenticate_google with authorization_code"
        ))
    })
}

/// An unknown zone is a rejected request with its own error kind, not a
/// configuration failure.
fn user_time_zone(user_id: &str, raw_zone: &str) -> Result<UserTimeZoneContext, Resolution> {
    UserTimeZoneContext::new(raw_zone).map_err(|error| {
        warn!(
            user_id,
            time_zone = raw_zone,
            error_kind = error.kind(),
            "user_time_zone_rejected"
        );
        Resolution::rejected(error)
    })
}

async fn live_user_context(
    state: &AppState,
    user_id: &str,
    time_zone: UserTimeZoneContext,
    display_name: Option<String>,
) -> Result<UserContext, InfraError> {
    let user_id = normalized_user_id(user_id)?;
    let manager = oauth_manager(state, load_oauth_config_from_env()?)?;
    let credentials = required_access_token(&manager, user_id).await?;

    let context = UserContext::new(user_id, time_zone, credentials);
    Ok(match display_name.map(|name| name.trim().to_string()) {
        Some(name) if !name.is_empty() => context.with_display_name(name),
        _ => context,
    })
}

fn normalized_user_id(user_id: &str) -> Result<&str, InfraError> {
    let normalized = user_id.trim();
    if normalized.is_empty() {
        return Err(InfraError::InvalidConfig("user_id must not be empty".to_string()));
    }
    Ok(normalized)
}

fn load_oauth_config_from_env() -> Result<OAuthConfig, InfraError> {
    load_oauth_config_from_lookup(|key| std::env::var(key).ok())
}

fn load_oauth_config_from_lookup<F>(lookup: F) -> Result<OAuthConfig, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let client_id = required_lookup_value(
        &lookup,
        &["FOCUSFLOW_GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_ID"],
        "google client id",
    )?;
    let client_secret = required_lookup_value(
        &lookup,
        &["FOCUSFLOW_GOOGLE_CLIENT_SECRET", "GOOGLE_CLIENT_SECRET"],
        "google client secret",
    )?;
    let redirect_uri = optional_lookup_value(
        &lookup,
        &["FOCUSFLOW_GOOGLE_REDIRECT_URI", "GOOGLE_REDIRECT_URI"],
    )
    .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());
    let scopes = optional_lookup_value(&lookup, &["FOCUSFLOW_GOOGLE_SCOPES", "GOOGLE_SCOPES"])
        .map(|raw| parse_scope_list(&raw))
        .filter(|scopes| !scopes.is_empty())
        .unwrap_or_else(|| vec![CALENDAR_EVENTS_SCOPE.to_string()]);

    Ok(OAuthConfig::new(client_id, client_secret, redirect_uri, scopes))
}

fn load_gemini_api_key_from_env() -> Result<String, InfraError> {
    load_gemini_api_key_from_lookup(|key| std::env::var(key).ok())
}

fn load_gemini_api_key_from_lookup<F>(lookup: F) -> Result<String, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    required_lookup_value(
        &lookup,
        &["FOCUSFLOW_GEMINI_API_KEY", "GOOGLE_API_KEY"],
        "gemini api key",
    )
}

fn required_lookup_value<F>(
    lookup: &F,
    keys: &[&str],
    field_name: &str,
) -> Result<String, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    optional_lookup_value(lookup, keys).ok_or_else(|| {
        InfraError::InvalidConfig(format!(
            "missing {} (set one of: {})",
            field_name,
            keys.join(", ")
        ))
    })
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn parse_scope_list(raw: &str) -> Vec<String> {
    raw.split([',', ' ', '\n', '\t'])
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
