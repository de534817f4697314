//! Adapter over the external text-generation capability.
//!
//! A single attempt per call with a bounded timeout. Retrying is the orchestrator's job.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::domain::CustomerFacts;
use crate::config::GenerationConfig;

/// Subject and HTML body returned by the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentError {
    #[error("generation contract violation: {0}")]
    ContractViolation(String),
    #[error("generation unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, facts: &CustomerFacts) -> Result<GeneratedContent, ContentError>;

    /// False when no call can succeed until the process is reconfigured.
    fn is_configured(&self) -> bool {
        true
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StructuredEmail {
    subject: String,
    #[serde(alias = "content")]
    body: String,
}

/// Validate the raw structured output: exactly a subject and a body, both non-empty.
pub fn parse_generated_content(raw: &str) -> Result<GeneratedContent, ContentError> {
    let parsed: StructuredEmail = serde_json::from_str(raw.trim())
        .map_err(|err| ContentError::ContractViolation(format!("malformed output: {err}")))?;

    if parsed.subject.trim().is_empty() {
        return Err(ContentError::ContractViolation(
            "empty subject".to_string(),
        ));
    }
    if parsed.body.trim().is_empty() {
        return Err(ContentError::ContractViolation("empty body".to_string()));
    }

    Ok(GeneratedContent {
        subject: parsed.subject,
        body: parsed.body,
    })
}

pub fn build_prompt(facts: &CustomerFacts) -> String {
    let categories = if facts.preferred_categories.is_empty() {
        "none recorded".to_string()
    } else {
        facts.preferred_categories.join(", ")
    };

    format!(
        "Generate a personalized re-engagement email for a customer with the following information:\n\
         - Name: {}\n\
         - Last order date: {}\n\
         - Number of orders: {}\n\
         - Average order value: ${:.2}\n\
         - Preferred categories: {}\n\
         \n\
         The email should be friendly and personal, mention their order history, suggest new \
         items from their preferred categories and end with a clear call to action.\n\
         \n\
         Respond with a JSON object containing \"subject\" and \"content\", where content is \
         HTML using <p> tags.",
        facts.name,
        facts.last_order_date,
        facts.order_count,
        facts.average_order_value,
        categories
    )
}

/// JSON schema sent as the strict structured-output constraint.
pub fn response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "subject": {
                "type": "string",
                "description": "Email subject line that is engaging and relevant to the customer"
            },
            "content": {
                "type": "string",
                "description": "HTML email content that is personalized and includes product recommendations"
            }
        },
        "required": ["subject", "content"],
        "additionalProperties": false
    })
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat,
}

#[derive(Serialize)]
struct JsonSchemaFormat {
    name: &'static str,
    strict: bool,
    schema: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client for OpenRouter or any compatible endpoint.
pub struct OpenRouterGenerator {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OpenRouterGenerator {
    pub fn new(config: &GenerationConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout: config.timeout,
        }
    }
}

impl std::fmt::Debug for OpenRouterGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterGenerator")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ContentGenerator for OpenRouterGenerator {
    async fn generate(&self, facts: &CustomerFacts) -> Result<GeneratedContent, ContentError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ContentError::Unavailable("API credential not configured".to_string()))?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: build_prompt(facts),
            }],
            response_format: ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: "email",
                    strict: true,
                    schema: response_schema(),
                },
            },
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, model = %self.model, "requesting email content");
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ContentError::Unavailable(format!("timed out after {:?}", self.timeout))
                } else {
                    ContentError::Unavailable(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "unreadable body".to_string());
            return Err(ContentError::Unavailable(format!(
                "provider returned {status}: {detail}"
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|err| {
            ContentError::ContractViolation(format!("unparsable provider response: {err}"))
        })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                ContentError::ContractViolation("response contained no message".to_string())
            })?;

        parse_generated_content(&content)
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}
