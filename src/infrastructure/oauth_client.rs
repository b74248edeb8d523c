use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Clone)]
pub struct OAuthClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

/// Token endpoint calls. `InfraError::OAuth` means the grant itself was refused;
/// transport failures surface as `Network`/`Timeout`.
#[async_trait]
pub trait OAuthHttpClient: Send + Sync {
    async fn exchange_authorization_code(
        &self,
        credentials: &OAuthClientCredentials,
        redirect_uri: &str,
        authorization_code: &str,
    ) -> Result<OAuthTokenResponse, InfraError>;

    async fn refresh_access_token(
        &self,
        credentials: &OAuthClientCredentials,
        refresh_token: &str,
    ) -> Result<OAuthTokenResponse, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestOAuthClient {
    client: Client,
    token_endpoint: String,
    timeout_seconds: u64,
}

#[derive(Debug, serde::Deserialize)]
struct TokenPayload {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    token_type: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl ReqwestOAuthClient {
    pub fn new(timeout_seconds: u64) -> Result<Self, InfraError> {
        Self::with_token_endpoint(GOOGLE_TOKEN_ENDPOINT, timeout_seconds)
    }

    pub fn with_token_endpoint(
        token_endpoint: impl Into<String>,
        timeout_seconds: u64,
    ) -> Result<Self, InfraError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|error| InfraError::InvalidConfig(format!("cannot build http client: {error}")))?;
        Ok(Self {
            client,
            token_endpoint: token_endpoint.into(),
            timeout_seconds,
        })
    }

    async fn post_form(&self, params: &[(&str, &str)]) -> Result<OAuthTokenResponse, InfraError> {
        let response = self
            .client
            .post(&self.token_endpoint)
            .form(params)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    InfraError::Timeout(self.timeout_seconds)
                } else {
                    InfraError::Network(format!("calling token endpoint: {error}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Network(format!("reading token response: {error}")))?;

        let parsed = serde_json::from_str::<TokenPayload>(&body).ok();
        if let Some(code) = parsed.as_ref().and_then(|payload| payload.error.clone()) {
            let detail = parsed
                .as_ref()
                .and_then(|payload| payload.error_description.clone())
                .unwrap_or_default();
            return Err(InfraError::OAuth(format!("token endpoint refused grant: {code}; {detail}")));
        }
        if !status.is_success() {
            return Err(InfraError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let payload =
            parsed.ok_or_else(|| InfraError::Decode(format!("invalid token payload: {body}")))?;
        let access_token = payload
            .access_token
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| InfraError::Decode("token payload has no access_token".to_string()))?;

        Ok(OAuthTokenResponse {
            access_token,
            refresh_token: payload.refresh_token,
            expires_in: payload.expires_in.unwrap_or(0).max(0),
            token_type: payload.token_type,
            scope: payload.scope,
        })
    }
}

#[async_trait]
impl OAuthHttpClient for ReqwestOAuthClient {
    async fn exchange_authorization_code(
        &self,
        credentials: &OAuthClientCredentials,
        redirect_uri: &str,
        authorization_code: &str,
    ) -> Result<OAuthTokenResponse, InfraError> {
        self.post_form(&[
            ("grant_type", "authorization_code"),
            ("client_id", &credentials.client_id),
            ("client_secret", &credentials.client_secret),
            ("redirect_uri", redirect_uri),
            ("code", authorization_code),
        ])
        .await
    }

    async fn refresh_access_token(
        &self,
        credentials: &OAuthClientCredentials,
        refresh_token: &str,
    ) -> Result<OAuthTokenResponse, InfraError> {
        self.post_form(&[
            ("grant_type", "refresh_token"),
            ("client_id", &credentials.client_id),
            ("client_secret", &credentials.client_secret),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}
