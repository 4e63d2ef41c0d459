//! OpenRouter-backed [`CompletionBackend`].
//!
//! Streaming goes straight to the OpenAI-compatible `chat/completions`
//! endpoint so every delta can be relayed as soon as it arrives. One-shot
//! completions and chat go through rig's OpenRouter agent.

use async_trait::async_trait;
use futures::{StreamExt, stream};
use report_flow::{
    ChatMessage, ChatRole, CompletionBackend, CompletionRequest, LineBuffer, PipelineError,
    Result, TokenStream,
};
use rig::{
    client::CompletionClient,
    completion::{Chat, Message, Prompt},
    providers::openrouter,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct OpenRouterBackend {
    http: reqwest::Client,
    agents: openrouter::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenRouterBackend {
    pub fn new(api_key: &str, base_url: &str, model: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::Configuration(format!("HTTP client: {}", e)))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let agents = openrouter::Client::builder(api_key)
            .base_url(&base_url)
            .build()
            .map_err(|e| PipelineError::Configuration(format!("OpenRouter client: {}", e)))?;

        Ok(Self {
            http,
            agents,
            api_key: api_key.to_string(),
            base_url,
            model: model.to_string(),
        })
    }

    fn chat_completions_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "stream": true,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }
}

#[async_trait]
impl CompletionBackend for OpenRouterBackend {
    fn model(&self) -> &str {
        &self.model
    }

    async fn stream_completion(&self, request: CompletionRequest) -> Result<TokenStream> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, model = %self.model, "Opening completion stream");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&self.chat_completions_body(&request))
            .send()
            .await
            .map_err(|e| PipelineError::Backend(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PipelineError::Backend(format!(
                "upstream returned {}: {}",
                status, detail
            )));
        }

        let chunks = Box::pin(response.bytes_stream());
        let tokens = stream::unfold(
            Some((chunks, SseDeltaDecoder::new())),
            |state| async move {
                let (mut chunks, mut decoder) = state?;
                match chunks.next().await {
                    Some(Ok(bytes)) => {
                        let items = decoder.push(&bytes);
                        Some((items, Some((chunks, decoder))))
                    }
                    Some(Err(e)) => {
                        let error = PipelineError::Backend(format!("stream read failed: {}", e));
                        Some((vec![Err(error)], None))
                    }
                    None => Some((decoder.finish(), None)),
                }
            },
        )
        .flat_map(stream::iter);

        Ok(Box::pin(tokens))
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let mut builder = self.agents.agent(&self.model).preamble(&request.system);
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }
        let agent = builder.build();

        let response = agent
            .prompt(request.prompt)
            .await
            .map_err(|e| PipelineError::Backend(e.to_string()))?;
        info!(chars = response.chars().count(), "Completion received");
        Ok(response)
    }

    async fn chat(&self, system: &str, messages: &[ChatMessage]) -> Result<String> {
        let (last, history) = messages
            .split_last()
            .ok_or_else(|| PipelineError::Backend("empty conversation".to_string()))?;

        let agent = self.agents.agent(&self.model).preamble(system).build();
        let history: Vec<Message> = history.iter().map(to_rig_message).collect();

        agent
            .chat(to_rig_message(last), history)
            .await
            .map_err(|e| PipelineError::Backend(e.to_string()))
    }
}

/// rig has no system message in chat history, so those are sent as user turns
/// with a marker prefix.
pub fn to_rig_message(message: &ChatMessage) -> Message {
    match message.role {
        ChatRole::User => Message::user(message.content.clone()),
        ChatRole::Assistant => Message::assistant(message.content.clone()),
        ChatRole::System => Message::user(format!("[SYSTEM] {}", message.content)),
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<UpstreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpstreamError {
    message: String,
}

/// Turns Server-Sent Events from `chat/completions` into text deltas.
///
/// Only `data:` fields are read. `:` comment lines (keep-alives) are ignored
/// and nothing after `[DONE]` is decoded. A stream that ends without `[DONE]`
/// was cut off and is reported as an error by [`SseDeltaDecoder::finish`].
#[derive(Debug, Default)]
pub struct SseDeltaDecoder {
    lines: LineBuffer,
    done: bool,
}

impl SseDeltaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<String>> {
        self.lines
            .push(chunk)
            .into_iter()
            .filter_map(|line| self.decode_line(&line))
            .collect()
    }

    /// The upstream body ended: decode any unterminated tail, then fail unless
    /// `[DONE]` was seen.
    pub fn finish(&mut self) -> Vec<Result<String>> {
        let mut items: Vec<Result<String>> = self
            .lines
            .finish()
            .and_then(|line| self.decode_line(&line))
            .into_iter()
            .collect();
        if !self.done {
            items.push(Err(PipelineError::Backend(
                "stream ended before [DONE]".to_string(),
            )));
        }
        items
    }

    fn decode_line(&mut self, line: &str) -> Option<Result<String>> {
        if self.done {
            return None;
        }
        let data = line.strip_prefix("data:")?.trim();
        if data.is_empty() {
            return None;
        }
        if data == "[DONE]" {
            self.done = true;
            return None;
        }

        let chunk: StreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => return Some(Err(PipelineError::MalformedChunk(e.to_string()))),
        };
        if let Some(error) = chunk.error {
            return Some(Err(PipelineError::Backend(error.message)));
        }

        let text: String = chunk
            .choices
            .into_iter()
            .filter_map(|choice| choice.delta.and_then(|delta| delta.content))
            .collect();
        (!text.is_empty()).then_some(Ok(text))
    }
}
