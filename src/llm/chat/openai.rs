use async_trait::async_trait;
use futures::StreamExt;
use log::debug;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client as HttpClient,
};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ChatClient, TokenStream};
use crate::llm::LlmConfig;
use crate::models::chat::{ChatMessage, Conversation};

/// Client for OpenAI-compatible chat completion endpoints (vLLM, OpenAI,
/// OpenRouter and friends).
pub struct OpenAIChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    top_p: f32,
    stream: bool,
    stream_options: StreamOptions,
}

#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl OpenAIChatClient {
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| format!("Invalid API key format: {}", e))?,
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        Ok(Self {
            http,
            model,
            base_url,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        Self::new(
            config.base_url.clone(),
            config.api_key.clone(),
            config.model.clone(),
        )
    }

    /// Parse one SSE line into a chunk. Blank lines, comments, `[DONE]` and
    /// unparsable payloads yield nothing.
    fn parse_sse_line(line: &str) -> Option<StreamChunk> {
        let line = line.trim();
        if line.is_empty() || line.starts_with(':') {
            return None;
        }

        let data = line.strip_prefix("data: ")?;
        if data.trim() == "[DONE]" {
            return None;
        }

        match serde_json::from_str::<StreamChunk>(data) {
            Ok(chunk) => Some(chunk),
            Err(e) => {
                debug!("JSON parse error: {} for data: {}", e, data);
                None
            }
        }
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn send(
        &self,
        conversation: &Conversation,
    ) -> Result<TokenStream, Box<dyn StdError + Send + Sync>> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let req = ChatCompletionRequest {
            model: self.model.clone(),
            messages: conversation.messages.clone(),
            top_p: conversation.top_p,
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
        };

        let (tx, rx) = mpsc::channel(32);
        let client = self.http.clone();

        tokio::spawn(async move {
            let resp = match client.post(&url).json(&req).send().await {
                Ok(r) => r,
                Err(e) => {
                    let _ = tx.send(Err(Box::new(e) as _)).await;
                    return;
                }
            };

            if let Err(e) = resp.error_for_status_ref() {
                let _ = tx.send(Err(Box::new(e) as _)).await;
                return;
            }

            let mut bytes = resp.bytes_stream();
            // SSE lines can be split across network chunks; keep the trailing
            // partial line around until the rest arrives.
            let mut pending = String::new();

            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(buf) => {
                        pending.push_str(&String::from_utf8_lossy(&buf));

                        while let Some(pos) = pending.find('\n') {
                            let line = pending[..pos].to_string();
                            pending.drain(..=pos);

                            let Some(parsed) = Self::parse_sse_line(&line) else {
                                continue;
                            };

                            if let Some(usage) = parsed.usage {
                                debug!(
                                    "token usage: prompt={} completion={} total={}",
                                    usage.prompt_tokens,
                                    usage.completion_tokens,
                                    usage.total_tokens
                                );
                            }

                            // Usage-only trailer chunks carry no choices and
                            // contribute no text.
                            if let Some(choice) = parsed.choices.into_iter().next() {
                                if let Some(content) = choice.delta.content {
                                    if !content.is_empty() && tx.send(Ok(content)).await.is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(Box::new(e) as _)).await;
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn model(&self) -> String {
        self.model.clone()
    }
}
