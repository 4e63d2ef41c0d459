//! ReportPipeline – turns one intake payload into a stream of report events.
//!
//! A run goes through three phases:
//! 1. the [`ProgressReporter`] emits pre-generation checkpoints;
//! 2. the backend stream is opened and handed to the [`StreamingRelay`];
//! 3. exactly one terminal event (`complete` or `error`) is written.
//!
//! Phases 1 and 2 share a single deadline. Technical failures are logged and
//! replaced by [`REPORT_ERROR_MESSAGE`] on the wire. If the client goes away
//! the run is abandoned without a terminal event and the upstream stream is
//! dropped.
//!
//! ```rust,ignore
//! let pipeline = ReportPipeline::new(backend, Arc::new(TimedProgress::default()), PipelineConfig::default())?;
//! let (sink, body) = event_channel(16);
//! tokio::spawn(async move { pipeline.run(&payload, &sink).await });
//! ```

use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::{
    backend::{CompletionBackend, CompletionRequest},
    error::{PipelineError, Result},
    event::{CompletedReport, ReportEvent},
    intake::IntakePayload,
    progress::ProgressReporter,
    prompt::{REPORT_SYSTEM_PROMPT, build_report_prompt},
    relay::StreamingRelay,
    sink::EventSink,
};

/// User-facing message for every generation failure.
pub const REPORT_ERROR_MESSAGE: &str =
    "Error al generar el reporte médico. Por favor, intente nuevamente.";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const REPORT_TEMPERATURE: f64 = 0.3;
const REPORT_MAX_TOKENS: u64 = 2000;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound for progress reporting plus generation.
    pub timeout: Duration,
    pub relay: StreamingRelay,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            relay: StreamingRelay::default(),
        }
    }
}

/// How a streaming run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed,
    /// The client disconnected; no terminal event was delivered.
    Abandoned,
}

#[derive(Clone)]
pub struct ReportPipeline {
    backend: Arc<dyn CompletionBackend>,
    progress: Arc<dyn ProgressReporter>,
    config: PipelineConfig,
}

impl ReportPipeline {
    /// Fails if the progress reporter could emit a percentage at or above the
    /// relay's first checkpoint.
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        progress: Arc<dyn ProgressReporter>,
        config: PipelineConfig,
    ) -> Result<Self> {
        let ceiling = progress.ceiling();
        let first = config.relay.first_percentage();
        if ceiling >= first {
            return Err(PipelineError::Configuration(format!(
                "progress reporter reaches {}% but the relay starts at {}%",
                ceiling, first
            )));
        }

        Ok(Self {
            backend,
            progress,
            config,
        })
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    /// Run the streaming pipeline, writing every event to `sink`.
    pub async fn run(&self, payload: &IntakePayload, sink: &dyn EventSink) -> RunOutcome {
        let started = Instant::now();
        info!(
            request_type = %payload.tipo_solicitud,
            model = self.backend.model(),
            "Starting streamed report generation"
        );

        let generation = tokio::time::timeout(self.config.timeout, self.stream_report(payload, sink))
            .await
            .unwrap_or(Err(PipelineError::Timeout(self.config.timeout)));

        let terminal = match generation {
            Ok(reporte) => ReportEvent::Complete(CompletedReport {
                reporte,
                paciente: payload.patient_summary(),
                tipo_solicitud: payload.tipo_solicitud,
            }),
            Err(PipelineError::ClientDisconnected) => {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Client disconnected, abandoning report generation"
                );
                return RunOutcome::Abandoned;
            }
            Err(e) => {
                error!(
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Report generation failed"
                );
                ReportEvent::error(REPORT_ERROR_MESSAGE)
            }
        };

        let outcome = match terminal {
            ReportEvent::Complete(_) => RunOutcome::Completed,
            _ => RunOutcome::Failed,
        };

        if let Err(e) = sink.emit(terminal).await {
            warn!(error = %e, "Could not deliver terminal report event");
            return RunOutcome::Abandoned;
        }

        info!(
            outcome = ?outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Report stream finished"
        );
        outcome
    }

    async fn stream_report(&self, payload: &IntakePayload, sink: &dyn EventSink) -> Result<String> {
        self.progress.report(sink).await?;

        let request = CompletionRequest::new(REPORT_SYSTEM_PROMPT, build_report_prompt(payload));
        let tokens = tokio::select! {
            biased;
            _ = sink.closed() => return Err(PipelineError::ClientDisconnected),
            opened = self.backend.stream_completion(request) => opened?,
        };

        self.config.relay.relay(tokens, sink).await
    }

    /// Non-streaming generation: the whole report in one call, no events.
    pub async fn generate_report(&self, payload: &IntakePayload) -> Result<CompletedReport> {
        info!(
            request_type = %payload.tipo_solicitud,
            model = self.backend.model(),
            "Generating report"
        );

        let request = CompletionRequest::new(REPORT_SYSTEM_PROMPT, build_report_prompt(payload))
            .with_temperature(REPORT_TEMPERATURE)
            .with_max_tokens(REPORT_MAX_TOKENS);

        let reporte = tokio::time::timeout(self.config.timeout, self.backend.complete(request))
            .await
            .map_err(|_| PipelineError::Timeout(self.config.timeout))??;

        Ok(CompletedReport {
            reporte,
            paciente: payload.patient_summary(),
            tipo_solicitud: payload.tipo_solicitud,
        })
    }
}
