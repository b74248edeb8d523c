use crate::domain::models::{AccessToken, OAuthToken};
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::oauth_client::{OAuthClientCredentials, OAuthHttpClient, OAuthTokenResponse};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

const DEFAULT_AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080/oauth2/callback";
pub const CALENDAR_EVENTS_SCOPE: &str = "https://www.googleapis.com/auth/calendar.events";
const TOKEN_LEEWAY_SECONDS: i64 = 60;

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub credentials: OAuthClientCredentials,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub authorization_endpoint: String,
}

impl OAuthConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            credentials: OAuthClientCredentials {
                client_id: client_id.into(),
                client_secret: client_secret.into(),
            },
            redirect_uri: redirect_uri.into(),
            scopes,
            authorization_endpoint: DEFAULT_AUTHORIZATION_ENDPOINT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureTokenResult {
    Existing(OAuthToken),
    Refreshed(OAuthToken),
    ReauthenticationRequired,
}

impl EnsureTokenResult {
    /// Access token usable right now, if any.
    pub fn access(&self) -> Option<AccessToken> {
        match self {
            Self::Existing(token) | Self::Refreshed(token) => Some(token.access()),
            Self::ReauthenticationRequired => None,
        }
    }
}

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Google OAuth tokens for many users, one credential-store entry each.
pub struct OAuthManager<S, C>
where
    S: CredentialStore,
    C: OAuthHttpClient,
{
    config: OAuthConfig,
    credential_store: Arc<S>,
    oauth_client: Arc<C>,
    now_provider: NowProvider,
}

impl<S, C> OAuthManager<S, C>
where
    S: CredentialStore,
    C: OAuthHttpClient,
{
    pub fn new(config: OAuthConfig, credential_store: Arc<S>, oauth_client: Arc<C>) -> Self {
        Self {
            config,
            credential_store,
            oauth_client,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn is_token_valid(&self, token: &OAuthToken) -> bool {
        token.is_valid_at((self.now_provider)(), TOKEN_LEEWAY_SECONDS)
    }

    /// Consent URL; `state` is echoed back to the redirect and should identify
    /// the user and the login attempt.
    pub fn build_authorization_url(&self, state: &str) -> Result<String, InfraError> {
        if state.trim().is_empty() {
            return Err(InfraError::OAuth("state must not be empty".to_string()));
        }
        if self.config.scopes.is_empty() {
            return Err(InfraError::OAuth("at least one scope is required".to_string()));
        }

        let mut url = Url::parse(&self.config.authorization_endpoint)
            .map_err(|error| InfraError::OAuth(format!("invalid authorization endpoint: {error}")))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.credentials.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);
        Ok(url.to_string())
    }

    pub async fn authenticate_with_code(
        &self,
        user_id: &str,
        authorization_code: &str,
    ) -> Result<OAuthToken, InfraError> {
        if authorization_code.trim().is_empty() {
            return Err(InfraError::OAuth("authorization code must not be empty".to_string()));
        }

        let response = self
            .oauth_client
            .exchange_authorization_code(
                &self.config.credentials,
                &self.config.redirect_uri,
                authorization_code.trim(),
            )
            .await?;

        let token = self.token_from_response(response, None);
        self.credential_store.save_token(user_id, &token)?;
        info!(user_id, "oauth_authenticated");
        Ok(token)
    }

    pub async fn ensure_access_token(&self, user_id: &str) -> Result<EnsureTokenResult, InfraError> {
        let Some(stored_token) = self.credential_store.load_token(user_id)? else {
            return Ok(EnsureTokenResult::ReauthenticationRequired);
        };

        if self.is_token_valid(&stored_token) {
            return Ok(EnsureTokenResult::Existing(stored_token));
        }

        let Some(refresh_token) = stored_token.refresh_token.clone() else {
            return Ok(EnsureTokenResult::ReauthenticationRequired);
        };

        match self
            .oauth_client
            .refresh_access_token(&self.config.credentials, &refresh_token)
            .await
        {
            Ok(response) => {
                let token = self.token_from_response(response, Some(refresh_token));
                self.credential_store.save_token(user_id, &token)?;
                info!(user_id, "oauth_token_refreshed");
                Ok(EnsureTokenResult::Refreshed(token))
            }
            Err(InfraError::OAuth(reason)) => {
                warn!(user_id, reason = %reason, "oauth_refresh_refused");
                Ok(EnsureTokenResult::ReauthenticationRequired)
            }
            Err(error) => Err(error),
        }
    }

    pub fn clear_stored_token(&self, user_id: &str) -> Result<(), InfraError> {
        self.credential_store.delete_token(user_id)
    }

    fn token_from_response(
        &self,
        response: OAuthTokenResponse,
        fallback_refresh_token: Option<String>,
    ) -> OAuthToken {
        let expires_at = (self.now_provider)() + Duration::seconds(response.expires_in.max(0));
        OAuthToken {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(fallback_refresh_token),
            expires_at,
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scope: response.scope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::credential_store::InMemoryCredentialStore;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn grant(access_token: &str, refresh_token: Option<&str>, expires_in: i64) -> OAuthTokenResponse {
        OAuthTokenResponse {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expires_in,
            token_type: None,
            scope: None,
        }
    }

    /// Token endpoint that answers from a queue and counts each grant type.
    #[derive(Debug, Default)]
    struct QueuedTokenEndpoint {
        answers: Mutex<VecDeque<Result<OAuthTokenResponse, InfraError>>>,
        exchanges: AtomicUsize,
        refreshes: AtomicUsize,
    }

    impl QueuedTokenEndpoint {
        fn answering(answer: Result<OAuthTokenResponse, InfraError>) -> Self {
            let endpoint = Self::default();
            endpoint.answers.lock().expect("answers mutex poisoned").push_back(answer);
            endpoint
        }

        fn next_answer(&self) -> Result<OAuthTokenResponse, InfraError> {
            self.answers
                .lock()
                .expect("answers mutex poisoned")
                .pop_front()
                .unwrap_or_else(|| Err(InfraError::OAuth("unexpected token request".to_string())))
        }
    }

    #[async_trait]
    impl OAuthHttpClient for QueuedTokenEndpoint {
        async fn exchange_authorization_code(
            &self,
            _credentials: &OAuthClientCredentials,
            _redirect_uri: &str,
            _authorization_code: &str,
        ) -> Result<OAuthTokenResponse, InfraError> {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            self.next_answer()
        }

        async fn refresh_access_token(
            &self,
            _credentials: &OAuthClientCredentials,
            _refresh_token: &str,
        ) -> Result<OAuthTokenResponse, InfraError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            self.next_answer()
        }
    }

    fn stored(access_token: &str, refresh_token: Option<&str>, expires_in: i64) -> OAuthToken {
        OAuthToken {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expires_at: Utc::now() + Duration::seconds(expires_in),
            token_type: "Bearer".to_string(),
            scope: None,
        }
    }

    fn test_config() -> OAuthConfig {
        OAuthConfig::new(
            "client-id",
            "client-secret",
            DEFAULT_REDIRECT_URI,
            vec![CALENDAR_EVENTS_SCOPE.to_string()],
        )
    }

    fn user_token() -> impl Strategy<Value = OAuthToken> {
        let part = "[A-Za-z0-9._\\-]{1,48}";
        (part, prop::option::of(part), 120i64..604_800i64).prop_map(
            |(access_token, refresh_token, expires_in)| OAuthToken {
                access_token,
                refresh_token,
                expires_at: Utc::now() + Duration::seconds(expires_in),
                token_type: "Bearer".to_string(),
                scope: Some(CALENDAR_EVENTS_SCOPE.to_string()),
            },
        )
    }

    proptest! {
        #[test]
        fn unexpired_token_never_reaches_the_endpoint(token in user_token()) {
            let runtime = tokio::runtime::Runtime::new().expect("runtime");
            runtime.block_on(async move {
                let store = Arc::new(InMemoryCredentialStore::default());
                store.save_token("alice", &token).expect("save token");
                let endpoint = Arc::new(QueuedTokenEndpoint::default());
                let manager = OAuthManager::new(test_config(), store, Arc::clone(&endpoint));

                let result = manager.ensure_access_token("alice").await.expect("ensure token");
                let access = result.access().expect("usable token");
                assert_eq!(access.secret(), token.access_token.as_str());
                assert_eq!(result, EnsureTokenResult::Existing(token));
                assert_eq!(endpoint.exchanges.load(Ordering::SeqCst), 0);
                assert_eq!(endpoint.refreshes.load(Ordering::SeqCst), 0);
            });
        }

        #[test]
        fn expired_token_without_working_refresh_needs_consent(
            has_refresh_token in any::<bool>(),
            expired_for in 1i64..86_400i64
        ) {
            let runtime = tokio::runtime::Runtime::new().expect("runtime");
            runtime.block_on(async move {
                let refresh_token = has_refresh_token.then_some("stale-refresh");
                let store = Arc::new(InMemoryCredentialStore::default());
                store
                    .save_token("alice", &stored("old", refresh_token, -expired_for))
                    .expect("save token");
                let endpoint = Arc::new(QueuedTokenEndpoint::answering(Err(InfraError::OAuth(
                    "invalid_grant".to_string(),
                ))));
                let manager = OAuthManager::new(test_config(), store, Arc::clone(&endpoint));

                let result = manager.ensure_access_token("alice").await.expect("ensure token");
                assert_eq!(result, EnsureTokenResult::ReauthenticationRequired);
                assert_eq!(
                    endpoint.refreshes.load(Ordering::SeqCst),
                    usize::from(has_refresh_token)
                );
            });
        }
    }

    #[tokio::test]
    async fn refresh_keeps_previous_refresh_token_when_none_is_returned() {
        let store = Arc::new(InMemoryCredentialStore::default());
        store
            .save_token("alice", &stored("expired", Some("refresh-token"), -120))
            .expect("save token");
        let endpoint = Arc::new(QueuedTokenEndpoint::answering(Ok(grant(
            "new-access-token",
            None,
            3600,
        ))));
        let manager = OAuthManager::new(test_config(), Arc::clone(&store), endpoint);

        let EnsureTokenResult::Refreshed(token) =
            manager.ensure_access_token("alice").await.expect("ensure")
        else {
            panic!("expected a refreshed token");
        };
        assert_eq!(token.refresh_token.as_deref(), Some("refresh-token"));
        assert_eq!(token.token_type, "Bearer");
        let persisted = store.load_token("alice").expect("load").expect("stored");
        assert_eq!(persisted.access_token, "new-access-token");
    }

    #[tokio::test]
    async fn token_within_leeway_is_refreshed_early() {
        let store = Arc::new(InMemoryCredentialStore::default());
        store
            .save_token("alice", &stored("nearly-expired", Some("refresh"), 30))
            .expect("save token");
        let endpoint = Arc::new(QueuedTokenEndpoint::answering(Ok(grant("fresh", None, 3600))));
        let manager = OAuthManager::new(test_config(), store, Arc::clone(&endpoint));

        let result = manager.ensure_access_token("alice").await.expect("ensure");
        assert!(matches!(result, EnsureTokenResult::Refreshed(_)));
        assert_eq!(endpoint.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_token_endpoint_is_an_error_not_reauthentication() {
        let store = Arc::new(InMemoryCredentialStore::default());
        store
            .save_token("alice", &stored("expired", Some("refresh"), -10))
            .expect("save token");
        let endpoint = Arc::new(QueuedTokenEndpoint::answering(Err(InfraError::Network(
            "dns failure".to_string(),
        ))));

        let manager = OAuthManager::new(test_config(), store, endpoint);
        let result = manager.ensure_access_token("alice").await;
        assert!(matches!(result, Err(InfraError::Network(_))));
    }

    #[tokio::test]
    async fn code_exchange_signs_in_only_that_user() {
        let store = Arc::new(InMemoryCredentialStore::default());
        let endpoint = Arc::new(QueuedTokenEndpoint::answering(Ok(grant(
            "code-access-token",
            Some("code-refresh-token"),
            1800,
        ))));
        let manager = OAuthManager::new(test_config(), Arc::clone(&store), Arc::clone(&endpoint));

        assert!(manager.authenticate_with_code("alice", "  ").await.is_err());
        let token = manager
            .authenticate_with_code("alice", " sample-code ")
            .await
            .expect("authenticate with code");
        assert_eq!(token.access_token, "code-access-token");
        assert_eq!(endpoint.exchanges.load(Ordering::SeqCst), 1);

        assert!(store.load_token("alice").expect("load").is_some());
        assert_eq!(
            manager.ensure_access_token("bob").await.expect("ensure"),
            EnsureTokenResult::ReauthenticationRequired
        );

        manager.clear_stored_token("alice").expect("clear");
        assert!(store.load_token("alice").expect("load").is_none());
    }

    #[test]
    fn authorization_url_carries_offline_consent_and_state() {
        let manager = OAuthManager::new(
            test_config(),
            Arc::new(InMemoryCredentialStore::default()),
            Arc::new(QueuedTokenEndpoint::default()),
        );

        let url = Url::parse(&manager.build_authorization_url("alice:42").expect("url")).expect("parse");
        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("access_type").map(String::as_str), Some("offline"));
        assert_eq!(pairs.get("state").map(String::as_str), Some("alice:42"));
        assert_eq!(pairs.get("scope").map(String::as_str), Some(CALENDAR_EVENTS_SCOPE));
        assert!(manager.build_authorization_url(" ").is_err());
    }
}
