//! Conversation helpers: summaries and query intent.
//!
//! Both degrade to fixed fallbacks instead of failing; they are advisory.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use kgagent_core::{ChatMessage, ChatRole};

use crate::client::{ChatOptions, LlmClient, LlmMessage};
use crate::extraction::recover_json;

pub const SUMMARY_FALLBACK: &str = "Unable to generate conversation summary.";

const SUMMARY_PROMPT: &str =
    "Summarize the following conversation concisely, highlighting key topics and outcomes.";

const INTENT_PROMPT: &str = "Analyze the user's query and extract the intent. Return JSON with:\n\
{\n  \"intent_type\": \"search|question|command|exploration\",\n  \
\"entities\": [\"list of entities mentioned\"],\n  \
\"temporal_context\": \"any time-related context\",\n  \
\"complexity\": \"simple|medium|complex\"\n}";

/// What a user query is after.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Intent {
    pub intent_type: String,
    pub entities: Vec<String>,
    pub temporal_context: String,
    pub complexity: String,
}

impl Default for Intent {
    fn default() -> Self {
        Self {
            intent_type: "question".to_string(),
            entities: Vec::new(),
            temporal_context: String::new(),
            complexity: "medium".to_string(),
        }
    }
}

impl Intent {
    fn from_value(value: &Value) -> Self {
        let fallback = Self::default();
        let text = |key: &str, default: String| {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(default)
        };
        Self {
            intent_type: text("intent_type", fallback.intent_type),
            entities: value
                .get("entities")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            temporal_context: text("temporal_context", fallback.temporal_context),
            complexity: text("complexity", fallback.complexity),
        }
    }
}

/// Summarize a conversation in a few sentences.
pub async fn summarize_conversation(client: &LlmClient, messages: &[ChatMessage]) -> String {
    let transcript = messages
        .iter()
        .map(|m| format!("{}: {}", role_title(m.role), m.content))
        .collect::<Vec<_>>()
        .join("\n");

    let request = [
        LlmMessage::system(SUMMARY_PROMPT),
        LlmMessage::user(transcript),
    ];
    match client
        .chat(&request, ChatOptions::with_temperature(0.3).max_tokens(200))
        .await
    {
        Ok(summary) => summary,
        Err(e) => {
            warn!(error = %e, "Failed to summarize conversation");
            SUMMARY_FALLBACK.to_string()
        }
    }
}

/// Classify a query. Unparsable replies and failed calls yield [`Intent::default`].
pub async fn extract_intent(client: &LlmClient, query: &str) -> Intent {
    let request = [LlmMessage::system(INTENT_PROMPT), LlmMessage::user(query)];
    match client
        .chat(&request, ChatOptions::with_temperature(0.1))
        .await
    {
        Ok(reply) => recover_json(&reply)
            .map(|v| Intent::from_value(&v))
            .unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "Failed to extract intent");
            Intent::default()
        }
    }
}

fn role_title(role: ChatRole) -> &'static str {
    match role {
        ChatRole::User => "User",
        ChatRole::Assistant => "Assistant",
        ChatRole::System => "System",
    }
}
