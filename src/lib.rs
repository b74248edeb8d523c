//! FocusFlow assistant core: turns model function calls into calendar writes
//! and reads in the user's own timezone.
//!
//! The functions at the crate root are the host-facing command surface. They
//! take the shared [`AppState`] and report failures as display strings, after
//! logging them.

pub mod application;
pub mod domain;
pub mod infrastructure;

use application::bootstrap::bootstrap_workspace;
use application::commands::{
    ask_assistant_impl, authenticate_google_impl, list_events_impl, recent_resolutions_impl,
    resolve_intent_impl, sign_out_google_impl,
};
use infrastructure::gemini_client::Content;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

pub use application::commands::{
    AppState, AssistantResponse, AuthenticateGoogleResponse, JournalEntryResponse,
    ResolutionResponse,
};

#[derive(Debug, Serialize)]
pub struct BootstrapResponse {
    pub workspace_root: String,
    pub database_path: String,
    pub logs_dir: String,
}

pub fn bootstrap(root: Option<String>) -> Result<BootstrapResponse, String> {
    let workspace_root = match root {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir().map_err(|error| error.to_string())?,
    };

    let result = bootstrap_workspace(&workspace_root).map_err(|error| error.to_string())?;
    Ok(BootstrapResponse {
        workspace_root: result.workspace_root.display().to_string(),
        database_path: result.database_path.display().to_string(),
        logs_dir: result.logs_dir.display().to_string(),
    })
}

pub async fn authenticate_google(
    state: &AppState,
    user_id: String,
    authorization_code: Option<String>,
) -> Result<AuthenticateGoogleResponse, String> {
    authenticate_google_impl(state, user_id, authorization_code)
        .await
        .map_err(|error| state.command_error("authenticate_google", &error))
}

pub fn sign_out_google(state: &AppState, user_id: String) -> Result<(), String> {
    sign_out_google_impl(state, user_id)
        .map_err(|error| state.command_error("sign_out_google", &error))
}

pub async fn resolve_intent(
    state: &AppState,
    user_id: String,
    time_zone: String,
    tool_name: String,
    arguments: Value,
) -> Result<ResolutionResponse, String> {
    resolve_intent_impl(state, user_id, time_zone, tool_name, arguments)
        .await
        .map_err(|error| state.command_error("resolve_intent", &error))
}

pub async fn list_events(
    state: &AppState,
    user_id: String,
    time_zone: String,
    date: Option<String>,
) -> Result<ResolutionResponse, String> {
    list_events_impl(state, user_id, time_zone, date)
        .await
        .map_err(|error| state.command_error("list_events", &error))
}

pub async fn ask_assistant(
    state: &AppState,
    user_id: String,
    display_name: Option<String>,
    time_zone: String,
    message: String,
    history: Vec<Content>,
) -> Result<AssistantResponse, String> {
    ask_assistant_impl(state, user_id, display_name, time_zone, message, history)
        .await
        .map_err(|error| state.command_error("ask_assistant", &error))
}

pub fn recent_resolutions(
    state: &AppState,
    user_id: String,
    limit: Option<usize>,
) -> Result<Vec<JournalEntryResponse>, String> {
    recent_resolutions_impl(state, user_id, limit)
        .map_err(|error| state.command_error("recent_resolutions", &error))
}
