use crate::domain::error::CalendarError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Credential store error: {0}")]
    Credential(String),
    #[error("OAuth error: {0}")]
    OAuth(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("invalid response payload: {0}")]
    Decode(String),
}

impl InfraError {
    /// Transient failures worth another attempt for idempotent reads.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<InfraError> for CalendarError {
    fn from(error: InfraError) -> Self {
        CalendarError::BackendUnavailable(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(InfraError::Network("connection reset".to_string()).is_transient());
        assert!(InfraError::Timeout(15).is_transient());
        assert!(InfraError::Http { status: 503, body: String::new() }.is_transient());
        assert!(!InfraError::Http { status: 401, body: "expired".to_string() }.is_transient());
        assert!(!InfraError::Decode("bad json".to_string()).is_transient());
    }

    #[test]
    fn every_infra_failure_becomes_backend_unavailable() {
        let error: CalendarError = InfraError::Http {
            status: 401,
            body: "invalid_grant".to_string(),
        }
        .into();
        assert_eq!(
            error,
            CalendarError::BackendUnavailable("http 401: invalid_grant".to_string())
        );
    }
}
