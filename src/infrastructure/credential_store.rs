use crate::domain::models::OAuthToken;
use crate::infrastructure::error::InfraError;
use std::collections::HashMap;
use std::sync::Mutex;

/// Per-user OAuth token storage, keyed by user id.
pub trait CredentialStore: Send + Sync {
    fn save_token(&self, user_id: &str, token: &OAuthToken) -> Result<(), InfraError>;
    fn load_token(&self, user_id: &str) -> Result<Option<OAuthToken>, InfraError>;
    fn delete_token(&self, user_id: &str) -> Result<(), InfraError>;
}

fn normalized_user_id(user_id: &str) -> Result<&str, InfraError> {
    let normalized = user_id.trim();
    if normalized.is_empty() {
        return Err(InfraError::Credential("user id must not be empty".to_string()));
    }
    Ok(normalized)
}

/// OS keyring backed store; one entry per user under a shared service name.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service_name: String,
}

impl KeyringCredentialStore {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    fn entry(&self, user_id: &str) -> Result<keyring::Entry, InfraError> {
        keyring::Entry::new(&self.service_name, normalized_user_id(user_id)?)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new("focusflow.oauth.google")
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn save_token(&self, user_id: &str, token: &OAuthToken) -> Result<(), InfraError> {
        let payload =
            serde_json::to_string(token).map_err(|error| InfraError::Credential(error.to_string()))?;
        self.entry(user_id)?
            .set_password(&payload)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }

    fn load_token(&self, user_id: &str) -> Result<Option<OAuthToken>, InfraError> {
        let payload = match self.entry(user_id)?.get_password() {
            Ok(value) => value,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(error) => return Err(InfraError::Credential(error.to_string())),
        };

        let token = serde_json::from_str::<OAuthToken>(&payload)
            .map_err(|error| InfraError::Credential(error.to_string()))?;
        Ok(Some(token))
    }

    fn delete_token(&self, user_id: &str) -> Result<(), InfraError> {
        match self.entry(user_id)?.delete_credential() {
            Ok(_) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    tokens: Mutex<HashMap<String, OAuthToken>>,
}

impl InMemoryCredentialStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, OAuthToken>>, InfraError> {
        self.tokens
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn save_token(&self, user_id: &str, token: &OAuthToken) -> Result<(), InfraError> {
        let user_id = normalized_user_id(user_id)?;
        self.lock()?.insert(user_id.to_string(), token.clone());
        Ok(())
    }

    fn load_token(&self, user_id: &str) -> Result<Option<OAuthToken>, InfraError> {
        let user_id = normalized_user_id(user_id)?;
        Ok(self.lock()?.get(user_id).cloned())
    }

    fn delete_token(&self, user_id: &str) -> Result<(), InfraError> {
        let user_id = normalized_user_id(user_id)?;
        self.lock()?.remove(user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn token(access: &str) -> OAuthToken {
        OAuthToken {
            access_token: access.to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: Utc::now() + Duration::seconds(3600),
            token_type: "Bearer".to_string(),
            scope: None,
        }
    }

    #[test]
    fn in_memory_store_keeps_users_apart() {
        let store = InMemoryCredentialStore::default();
        store.save_token("alice", &token("a-token")).expect("save alice");
        store.save_token("bob", &token("b-token")).expect("save bob");

        let alice = store.load_token(" alice ").expect("load").expect("alice token");
        assert_eq!(alice.access_token, "a-token");

        store.delete_token("alice").expect("delete");
        assert!(store.load_token("alice").expect("load").is_none());
        assert!(store.load_token("bob").expect("load").is_some());
    }

    #[test]
    fn empty_user_id_is_rejected() {
        let store = InMemoryCredentialStore::default();
        assert!(matches!(
            store.save_token("  ", &token("x")),
            Err(InfraError::Credential(_))
        ));
    }
}
