use crate::traits::{AnswerModel, ModelPrompt};
use crate::ModelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, Clone)]
pub struct ChatModelConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for ChatModelConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(15),
        }
    }
}

/// Stand-in used when no API key is configured; every call fails fast so the
/// local matcher answers.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledModel;

#[async_trait]
impl AnswerModel for DisabledModel {
    async fn complete(&self, _prompt: &ModelPrompt) -> Result<String, ModelError> {
        Err(ModelError::NotConfigured)
    }
}

/// OpenAI-compatible `chat/completions` client.
pub struct OpenAiChatModel {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
}

impl OpenAiChatModel {
    pub fn new(config: &ChatModelConfig) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout.min(Duration::from_secs(10)))
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: completions_endpoint(&config.base_url)?,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

pub(crate) fn completions_endpoint(base_url: &str) -> Result<Url, url::ParseError> {
    let trimmed = base_url.trim().trim_end_matches('/');
    Url::parse(&format!("{trimmed}/"))?.join("chat/completions")
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn build_request<'a>(model: &'a str, prompt: &'a ModelPrompt) -> ChatRequest<'a> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &prompt.system {
        messages.push(ChatMessage {
            role: "system",
            content: system,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: &prompt.user,
    });

    ChatRequest {
        model,
        messages,
        temperature: 0.2,
    }
}

fn first_choice_text(response: ChatResponse) -> Result<String, ModelError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or(ModelError::EmptyResponse)
}

#[async_trait]
impl AnswerModel for OpenAiChatModel {
    async fn complete(&self, prompt: &ModelPrompt) -> Result<String, ModelError> {
        let Some(api_key) = &self.api_key else {
            return Err(ModelError::NotConfigured);
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(api_key)
            .json(&build_request(&self.model, prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                details: details.chars().take(300).collect(),
            });
        }

        let body: ChatResponse = response.json().await?;
        let text = first_choice_text(body)?;
        debug!(model = %self.model, chars = text.len(), "model answered");
        Ok(text)
    }
}

/// Cuts `text` to at most `max_chars` characters without splitting one.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
