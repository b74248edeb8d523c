use crate::infrastructure::error::InfraError;
use serde_json::Value;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const DEFAULT_APP_NAME: &str = "FocusFlow";
const DEFAULT_CALENDAR_ID: &str = "primary";
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 15;
const DEFAULT_RETRY_MAX_ATTEMPTS: u8 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 200;
const DEFAULT_MODEL_NAME: &str = "gemini-1.5-flash-latest";
const DEFAULT_MAX_TOOL_ROUNDS: u8 = 3;
const DEFAULT_EVENT_DESCRIPTION: &str = "Scheduled by FocusFlow";
const DEFAULT_JOURNAL_RETENTION_PER_USER: u32 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSettings {
    pub app_name: String,
    pub calendar_id: String,
    pub request_timeout_seconds: u64,
    pub retry_max_attempts: u8,
    pub retry_base_delay_ms: u64,
    pub model_name: String,
    pub max_tool_rounds: u8,
    pub event_description: String,
    pub journal_retention_per_user: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            calendar_id: DEFAULT_CALENDAR_ID.to_string(),
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            retry_max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            model_name: DEFAULT_MODEL_NAME.to_string(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            event_description: DEFAULT_EVENT_DESCRIPTION.to_string(),
            journal_retention_per_user: DEFAULT_JOURNAL_RETENTION_PER_USER,
        }
    }
}

fn default_app_config() -> Value {
    serde_json::json!({
        "schema": 1,
        "appName": DEFAULT_APP_NAME,
        "calendarId": DEFAULT_CALENDAR_ID,
        "requestTimeoutSeconds": DEFAULT_REQUEST_TIMEOUT_SECONDS,
        "retry": {
            "maxAttempts": DEFAULT_RETRY_MAX_ATTEMPTS,
            "baseDelayMs": DEFAULT_RETRY_BASE_DELAY_MS
        },
        "model": {
            "name": DEFAULT_MODEL_NAME,
            "maxToolRounds": DEFAULT_MAX_TOOL_ROUNDS
        },
        "eventDescription": DEFAULT_EVENT_DESCRIPTION,
        "journal": {
            "retentionPerUser": DEFAULT_JOURNAL_RETENTION_PER_USER
        }
    })
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_app_config())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

/// Read `app.json`; absent keys fall back to defaults, present keys must be valid.
pub fn load_app_settings(config_dir: &Path) -> Result<AppSettings, InfraError> {
    let path = config_dir.join(APP_JSON);
    let app = read_config(&path)?;
    let defaults = AppSettings::default();

    let request_timeout_seconds =
        positive_u64(&app, "/requestTimeoutSeconds")?.unwrap_or(defaults.request_timeout_seconds);
    let retry_max_attempts = match positive_u64(&app, "/retry/maxAttempts")? {
        Some(value) => u8::try_from(value).map_err(|_| {
            InfraError::InvalidConfig(format!("retry.maxAttempts {value} is too large"))
        })?,
        None => defaults.retry_max_attempts,
    };
    let retry_base_delay_ms = match app.pointer("/retry/baseDelayMs") {
        None | Some(Value::Null) => defaults.retry_base_delay_ms,
        Some(value) => value.as_u64().ok_or_else(|| {
            InfraError::InvalidConfig("retry.baseDelayMs must be a non-negative integer".to_string())
        })?,
    };
    let max_tool_rounds = match positive_u64(&app, "/model/maxToolRounds")? {
        Some(value) => u8::try_from(value).map_err(|_| {
            InfraError::InvalidConfig(format!("model.maxToolRounds {value} is too large"))
        })?,
        None => defaults.max_tool_rounds,
    };
    let journal_retention_per_user = match positive_u64(&app, "/journal/retentionPerUser")? {
        Some(value) => u32::try_from(value).map_err(|_| {
            InfraError::InvalidConfig(format!("journal.retentionPerUser {value} is too large"))
        })?,
        None => defaults.journal_retention_per_user,
    };

    Ok(AppSettings {
        app_name: string_or(&app, "/appName", defaults.app_name),
        calendar_id: string_or(&app, "/calendarId", defaults.calendar_id),
        request_timeout_seconds,
        retry_max_attempts,
        retry_base_delay_ms,
        model_name: string_or(&app, "/model/name", defaults.model_name),
        max_tool_rounds,
        event_description: string_or(&app, "/eventDescription", defaults.event_description),
        journal_retention_per_user,
    })
}

fn string_or(config: &Value, pointer: &str, fallback: String) -> String {
    config
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or(fallback)
}

fn positive_u64(config: &Value, pointer: &str) -> Result<Option<u64>, InfraError> {
    match config.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match value.as_u64() {
            Some(parsed) if parsed > 0 => Ok(Some(parsed)),
            _ => Err(InfraError::InvalidConfig(format!(
                "{} must be a positive integer",
                pointer.trim_start_matches('/').replace('/', ".")
            ))),
        },
    }
}
