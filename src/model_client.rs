//! Chat-completion collaborators: the seam the pipeline calls for model text

use crate::config::ModelConfig;
use crate::types::{Role, Turn};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Anything that turns a message list into one reply string
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, messages: &[Turn]) -> Result<String>;
}

#[async_trait]
impl<T: ChatModel + ?Sized> ChatModel for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn complete(&self, messages: &[Turn]) -> Result<String> {
        (**self).complete(messages).await
    }
}

/// Scripted model for testing: replies are handed out in order
pub struct MockChatModel {
    replies: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<Vec<Turn>>>,
}

impl MockChatModel {
    pub fn new(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    /// Message lists received so far
    pub fn calls(&self) -> Vec<Vec<Turn>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    fn name(&self) -> &'static str {
        "mock_chat"
    }

    async fn complete(&self, messages: &[Turn]) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        let next = self
            .replies
            .lock()
            .map_err(|_| anyhow::anyhow!("mock reply queue poisoned"))?
            .pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(e)) => anyhow::bail!("{}", e),
            None => anyhow::bail!("mock model has no replies left"),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client
pub struct HttpChatModel {
    config: ModelConfig,
    client: reqwest::Client,
}

impl HttpChatModel {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    fn name(&self) -> &'static str {
        "http_chat"
    }

    async fn complete(&self, messages: &[Turn]) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: messages
                .iter()
                .map(|t| ChatMessage {
                    role: t.role,
                    content: &t.content,
                })
                .collect(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let url = self.endpoint();
        let mut builder = self.client.post(&url).json(&request);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .context(format!("Failed to send request to chat model at {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Chat model error {}: {}", status, body);
        }

        let response_text = response.text().await.context("Failed to get response text")?;
        let parsed: ChatResponse = serde_json::from_str(&response_text)
            .context(format!("Failed to parse chat model response: {}", response_text))?;

        tracing::debug!("Chat model returned {} choices", parsed.choices.len());

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("Chat model returned no content"))
    }
}
