//! Adapter for OpenAI-compatible chat-completion endpoints.
//!
//! Gemini, OpenRouter, Ollama and most self-hosted inference servers speak
//! this surface, so one adapter covers the hosted backends this gateway
//! fronts.

use std::time::Duration;

use futures::stream;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::backend::AssistantBackend;
use crate::error::BackendError;
use crate::sse::SseEventStream;
use crate::types::{Chunk, ChunkStream, Role, UserRequest};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const COMPLETION_INSTRUCTIONS: &str = "You complete code at a cursor position. \
Reply with exactly the code that belongs at the cursor: no prose, no \
explanations, no markdown fences.";

/// Backend speaking the OpenAI chat-completions protocol.
pub struct OpenAiCompatBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatBackend {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, BackendError> {
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }

    fn request(&self, body: &WireRequest) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }
        req
    }

    /// Session history plus the current turn, in wire order.
    fn chat_messages(request: &UserRequest) -> Vec<WireMessage> {
        let mut messages: Vec<WireMessage> = request
            .history
            .iter()
            .map(|m| WireMessage {
                role: match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: m.content.clone(),
            })
            .collect();
        messages.push(WireMessage {
            role: "user",
            content: request.message.clone(),
        });
        messages
    }

    /// Fill-in-the-middle prompt for autocomplete requests.
    fn completion_messages(request: &UserRequest) -> Vec<WireMessage> {
        let body = match &request.code_context {
            Some(ctx) => format!(
                "File: {}\nWorkspace: {}\n\nCode before the cursor:\n{}\n\nCode after the cursor:\n{}",
                ctx.filename, ctx.workspace, ctx.before_cursor, ctx.after_cursor
            ),
            None => request.message.clone(),
        };
        vec![
            WireMessage {
                role: "system",
                content: COMPLETION_INSTRUCTIONS.to_string(),
            },
            WireMessage {
                role: "user",
                content: body,
            },
        ]
    }

    fn to_chunk(payload: WireStreamChunk) -> Option<Chunk> {
        let choice = payload.choices.into_iter().next()?;
        let content = choice.delta.content.unwrap_or_default();
        if choice.finish_reason.is_some() {
            return Some(Chunk {
                id: payload.id,
                content,
                is_last: true,
            });
        }
        if content.is_empty() {
            // Role preludes and keepalives carry no text.
            return None;
        }
        Some(Chunk {
            id: payload.id,
            content,
            is_last: false,
        })
    }
}

#[async_trait::async_trait]
impl AssistantBackend for OpenAiCompatBackend {
    async fn chat(&self, request: UserRequest) -> Result<ChunkStream, BackendError> {
        let body = WireRequest {
            model: self.model.clone(),
            messages: Self::chat_messages(&request),
            stream: true,
        };

        let response = self.request(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::api(status, message));
        }

        // Dropping the stream drops the response body, which closes the
        // connection: the producer side of early consumer termination.
        let events = SseEventStream::new(Box::pin(response.bytes_stream()));
        let chunks = stream::unfold(Some(events), |state| async move {
            let mut events = state?;
            loop {
                match events.next().await {
                    None => return None,
                    Some(Err(e)) => return Some((Err(e), None)),
                    Some(Ok(event)) => {
                        if event.is_done() {
                            return None;
                        }
                        match serde_json::from_str::<WireStreamChunk>(&event.data) {
                            Ok(payload) => {
                                if let Some(chunk) = Self::to_chunk(payload) {
                                    return Some((Ok(chunk), Some(events)));
                                }
                            }
                            Err(e) => {
                                return Some((
                                    Err(BackendError::stream(format!(
                                        "malformed stream payload: {e}"
                                    ))),
                                    None,
                                ));
                            }
                        }
                    }
                }
            }
        });

        Ok(Box::pin(chunks))
    }

    async fn auto_complete(&self, request: UserRequest) -> Result<String, BackendError> {
        let body = WireRequest {
            model: self.model.clone(),
            messages: Self::completion_messages(&request),
            stream: false,
        };

        let response = self.request(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::api(status, message));
        }

        let completion: WireResponse = response.json().await?;
        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct WireStreamChunk {
    #[serde(default)]
    id: String,
    #[serde(default)]
    choices: Vec<WireStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    #[serde(default)]
    delta: WireDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
}
