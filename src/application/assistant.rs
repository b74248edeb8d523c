use crate::application::orchestrator::IntentResolver;
use crate::domain::error::CalendarError;
use crate::domain::intent::tool_declarations;
use crate::domain::models::UserContext;
use crate::domain::outcome::Resolution;
use crate::infrastructure::gemini_client::{
    Content, FunctionCall, FunctionResponse, GenerateRequest, LanguageModelClient,
};
use crate::infrastructure::google_calendar_client::GoogleCalendarClient;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

const DEFAULT_MAX_TOOL_ROUNDS: u8 = 3;
const FALLBACK_REPLY: &str = "Sorry, I couldn't work that out. Could you rephrase the request?";

#[derive(Debug, Clone)]
pub struct AssistantReply {
    /// Narration to show the user.
    pub text: String,
    /// Every intent resolved during the turn, in order.
    pub resolutions: Vec<Resolution>,
    /// The conversation including this turn; pass it back on the next call.
    pub history: Vec<Content>,
}

impl AssistantReply {
    pub fn scheduled_count(&self) -> usize {
        self.resolutions
            .iter()
            .filter(|resolution| resolution.scheduled().is_some())
            .count()
    }
}

/// One chat turn: utterance in, model function calls resolved, narration out.
pub struct Assistant<L, C>
where
    L: LanguageModelClient,
    C: GoogleCalendarClient,
{
    model: Arc<L>,
    resolver: Arc<IntentResolver<C>>,
    max_tool_rounds: u8,
    now_provider: NowProvider,
}

impl<L, C> Assistant<L, C>
where
    L: LanguageModelClient,
    C: GoogleCalendarClient,
{
    pub fn new(model: Arc<L>, resolver: Arc<IntentResolver<C>>) -> Self {
        Self {
            model,
            resolver,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_max_tool_rounds(mut self, max_tool_rounds: u8) -> Self {
        self.max_tool_rounds = max_tool_rounds;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn system_prompt(&self, context: &UserContext) -> String {
        let now = (self.now_provider)().with_timezone(&context.time_zone.tz());
        let name = context.display_name.as_deref().unwrap_or("the user");
        format!(
            "You are FocusFlow, an AI productivity coach for {name}.\n\
             The user's timezone is {zone}. The current local date and time is {now}.\n\
             \n\
             Scheduling rules:\n\
             - Call `add_event` with `start_time_str` and `end_time_str` as timezone-naive local \
             times in exactly the format YYYY-MM-DDTHH:MM:SS. Never append Z or a UTC offset; \
             the user's timezone is applied for you.\n\
             - Work out relative times such as \"3pm tomorrow\" yourself from the current date. \
             Do not ask the user for a timestamp format.\n\
             - `add_event` checks the calendar for conflicts. When it reports one, tell the user \
             which event is in the way and ask whether to schedule anyway or pick another time. \
             Set `confirm_override` to true only after the user explicitly says to schedule anyway.\n\
             - To show the schedule call `get_events`; pass `date_str` (YYYY-MM-DD) when the \
             user asks about a day other than today.\n\
             \n\
             Keep replies short, friendly and encouraging.",
            zone = context.time_zone.name(),
            now = now.format("%Y-%m-%d %H:%M (%A)"),
        )
    }

    pub async fn respond(
        &self,
        context: &UserContext,
        history: &[Content],
        utterance: &str,
    ) -> Result<AssistantReply, CalendarError> {
        let system_instruction = self.system_prompt(context);
        let mut contents = history.to_vec();
        contents.push(Content::user_text(utterance.trim()));
        let mut resolutions = Vec::new();
        let mut rounds: u8 = 0;
        let mut capped = false;

        let narration = loop {
            let tools_open = rounds < self.max_tool_rounds;
            let request = GenerateRequest {
                system_instruction: system_instruction.clone(),
                contents: contents.clone(),
                tools: if tools_open { tool_declarations() } else { json!([]) },
            };
            let mut reply = self.model.generate(&request).await.map_err(|error| {
                warn!(user_id = %context.user_id, error = %error, "language_model_failed");
                CalendarError::from(error)
            })?;
            if reply.role.is_empty() {
                reply.role = "model".to_string();
            }

            let calls: Vec<FunctionCall> = reply.function_calls().into_iter().cloned().collect();
            if calls.is_empty() {
                contents.push(reply.clone());
                break reply.text();
            }
            if !tools_open {
                // Calls past the cap are never answered, so they stay out of the history.
                warn!(
                    user_id = %context.user_id,
                    dropped_calls = calls.len(),
                    "tool_round_limit_reached"
                );
                capped = true;
                break reply.text();
            }

            rounds += 1;
            contents.push(reply);
            let mut responses = Vec::with_capacity(calls.len());
            for call in calls {
                let resolution = self
                    .resolver
                    .resolve_tool_call(&call.name, &call.args, context)
                    .await;
                responses.push(FunctionResponse {
                    name: call.name,
                    response: resolution.function_response(),
                });
                resolutions.push(resolution);
            }
            contents.push(Content::function_results(responses));
        };

        let text = match narration.trim() {
            "" => resolutions
                .last()
                .map(|resolution| resolution.message.clone())
                .unwrap_or_else(|| FALLBACK_REPLY.to_string()),
            trimmed => trimmed.to_string(),
        };
        if capped {
            contents.push(Content::model_text(text.clone()));
        }

        info!(
            user_id = %context.user_id,
            tool_rounds = rounds,
            resolutions = resolutions.len(),
            "assistant_turn_completed"
        );
        Ok(AssistantReply {
            text,
            resolutions,
            history: contents,
        })
    }
}
