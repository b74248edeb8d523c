use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::time::Duration;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
const ROLE_USER: &str = "user";
const ROLE_MODEL: &str = "model";
const ROLE_FUNCTION: &str = "function";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

/// One conversation turn in the Gemini wire shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: ROLE_USER.to_string(),
            parts: vec![Part {
                text: Some(text.into()),
                ..Part::default()
            }],
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: ROLE_MODEL.to_string(),
            parts: vec![Part {
                text: Some(text.into()),
                ..Part::default()
            }],
        }
    }

    /// One `function` turn answering every call of the preceding model turn,
    /// in call order.
    pub fn function_results(responses: Vec<FunctionResponse>) -> Self {
        Self {
            role: ROLE_FUNCTION.to_string(),
            parts: responses
                .into_iter()
                .map(|response| Part {
                    function_response: Some(response),
                    ..Part::default()
                })
                .collect(),
        }
    }

    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.parts
            .iter()
            .filter_map(|part| part.function_call.as_ref())
            .collect()
    }

    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub system_instruction: String,
    pub contents: Vec<Content>,
    /// `functionDeclarations` array; empty array for none.
    pub tools: Value,
}

#[async_trait]
pub trait LanguageModelClient: Send + Sync {
    /// One model round trip; returns the first candidate's content.
    async fn generate(&self, request: &GenerateRequest) -> Result<Content, InfraError>;
}

#[derive(Clone)]
pub struct ReqwestGeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_seconds: u64,
}

impl fmt::Debug for ReqwestGeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestGeminiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish_non_exhaustive()
    }
}

impl ReqwestGeminiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout_seconds: u64,
    ) -> Result<Self, InfraError> {
        Self::with_base_url(GEMINI_API_BASE, api_key, model, timeout_seconds)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout_seconds: u64,
    ) -> Result<Self, InfraError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(InfraError::InvalidConfig("gemini api key must not be empty".to_string()));
        }
        let model = model.into();
        if model.trim().is_empty() {
            return Err(InfraError::InvalidConfig("model name must not be empty".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|error| InfraError::InvalidConfig(format!("cannot build http client: {error}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
            model,
            timeout_seconds,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model.trim()
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[async_trait]
impl LanguageModelClient for ReqwestGeminiClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<Content, InfraError> {
        let has_tools = request.tools.as_array().is_some_and(|tools| !tools.is_empty());
        let mut body = json!({
            "systemInstruction": { "parts": [{ "text": request.system_instruction }] },
            "contents": request.contents,
        });
        if has_tools {
            body["tools"] = json!([{ "functionDeclarations": request.tools }]);
        }

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    InfraError::Timeout(self.timeout_seconds)
                } else {
                    InfraError::Network(format!("calling language model: {error}"))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|error| InfraError::Network(format!("reading language model response: {error}")))?;
        if !status.is_success() {
            return Err(InfraError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text)
            .map_err(|error| InfraError::Decode(format!("generateContent: {error}; body={text}")))?;
        parsed
            .candidates
            .into_iter()
            .find_map(|candidate| candidate.content)
            .ok_or_else(|| {
                let feedback = parsed
                    .prompt_feedback
                    .map(|value| value.to_string())
                    .unwrap_or_else(|| "none".to_string());
                InfraError::Decode(format!("model returned no candidates; feedback={feedback}"))
            })
    }
}
