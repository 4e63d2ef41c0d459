//! Test doubles shared by the module tests.

use async_trait::async_trait;
use futures::{StreamExt, stream};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use crate::{
    backend::{ChatMessage, CompletionBackend, CompletionRequest, TokenStream},
    error::{PipelineError, Result},
    event::{ProgressStep, ReportEvent},
    sink::EventSink,
};

/// Sink that records every event and never closes.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ReportEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReportEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress_steps(&self) -> Vec<ProgressStep> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ReportEvent::Progress(step) => Some(step),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn emit(&self, event: ReportEvent) -> Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    async fn closed(&self) {
        futures::future::pending::<()>().await
    }
}

pub fn token_stream(tokens: &[&str]) -> TokenStream {
    let items: Vec<Result<String>> = tokens.iter().map(|t| Ok(t.to_string())).collect();
    Box::pin(stream::iter(items))
}

/// Yields `tokens`, then a backend error.
pub fn failing_stream(tokens: &[&str], error: &str) -> TokenStream {
    let mut items: Vec<Result<String>> = tokens.iter().map(|t| Ok(t.to_string())).collect();
    items.push(Err(PipelineError::Backend(error.to_string())));
    Box::pin(stream::iter(items))
}

/// Sets the flag when dropped.
pub struct DropFlag(pub Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Yields `tokens`, then never produces another item. `dropped` flips once the
/// stream is dropped.
pub fn stalled_stream(tokens: &[&str], dropped: Arc<AtomicBool>) -> TokenStream {
    let guard = DropFlag(dropped);
    let items: Vec<Result<String>> = tokens.iter().map(|t| Ok(t.to_string())).collect();
    Box::pin(stream::iter(items).chain(stream::unfold(guard, |guard| async move {
        futures::future::pending::<()>().await;
        Some((Ok::<String, PipelineError>(String::new()), guard))
    })))
}

pub enum Script {
    Tokens(Vec<String>),
    FailAfter(Vec<String>, String),
    SetupError(String),
    Stall(Vec<String>, Arc<AtomicBool>),
}

/// Backend replaying a fixed script and recording the requests it received.
pub struct ScriptedBackend {
    script: Script,
    completion: std::result::Result<String, String>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            completion: Ok("<h3>Conclusión</h3>".to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn tokens(tokens: &[&str]) -> Self {
        Self::new(Script::Tokens(tokens.iter().map(|t| t.to_string()).collect()))
    }

    pub fn with_completion(mut self, completion: std::result::Result<String, String>) -> Self {
        self.completion = completion;
        self
    }
}

fn borrowed(tokens: &[String]) -> Vec<&str> {
    tokens.iter().map(String::as_str).collect()
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn stream_completion(&self, request: CompletionRequest) -> Result<TokenStream> {
        self.requests.lock().unwrap().push(request);
        match &self.script {
            Script::Tokens(tokens) => Ok(token_stream(&borrowed(tokens))),
            Script::FailAfter(tokens, error) => Ok(failing_stream(&borrowed(tokens), error)),
            Script::SetupError(error) => Err(PipelineError::Backend(error.clone())),
            Script::Stall(tokens, dropped) => {
                Ok(stalled_stream(&borrowed(tokens), dropped.clone()))
            }
        }
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request);
        self.completion.clone().map_err(PipelineError::Backend)
    }

    async fn chat(&self, _system: &str, messages: &[ChatMessage]) -> Result<String> {
        Ok(format!("{} mensajes recibidos", messages.len()))
    }
}
