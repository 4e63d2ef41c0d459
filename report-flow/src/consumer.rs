//! Client-side reader of the report stream.
//!
//! State machine: `Idle -> Loading -> Done | Failed`. Terminal states are
//! final for a given consumer; retrying means a new request and a new
//! consumer.

use tracing::warn;

use crate::{
    codec::LineBuffer,
    event::{CompletedReport, ProgressStep, ReportEvent},
};

/// Shown when the transport closes before a terminal event arrives.
pub const CONNECTION_CLOSED_MESSAGE: &str =
    "La conexión se cerró antes de recibir el reporte. Intente nuevamente.";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsumerState {
    Idle,
    Loading {
        /// Progress bar value.
        percentage: u8,
        /// Checklist of steps seen so far, in arrival order.
        steps: Vec<ProgressStep>,
    },
    Done(CompletedReport),
    Failed(String),
}

impl ConsumerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConsumerState::Done(_) | ConsumerState::Failed(_))
    }
}

#[derive(Debug)]
pub struct ReportConsumer {
    state: ConsumerState,
    lines: LineBuffer,
    skipped: usize,
}

impl Default for ReportConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportConsumer {
    pub fn new() -> Self {
        Self {
            state: ConsumerState::Idle,
            lines: LineBuffer::new(),
            skipped: 0,
        }
    }

    pub fn state(&self) -> &ConsumerState {
        &self.state
    }

    /// Number of lines dropped because they were not valid events.
    pub fn skipped_lines(&self) -> usize {
        self.skipped
    }

    /// Enter the loading state. No-op unless idle.
    pub fn start(&mut self) {
        if self.state == ConsumerState::Idle {
            self.state = ConsumerState::Loading {
                percentage: 0,
                steps: Vec::new(),
            };
        }
    }

    /// Decode a chunk of the response body and apply every complete event.
    ///
    /// Returns the events that changed the state. Malformed lines are logged and
    /// skipped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ReportEvent> {
        self.start();
        let lines = self.lines.push(chunk);
        lines
            .into_iter()
            .filter_map(|line| self.handle_line(&line))
            .collect()
    }

    /// The transport closed: decode any unterminated tail, then fail if no
    /// terminal event was seen.
    pub fn finish(&mut self) -> &ConsumerState {
        if let Some(rest) = self.lines.finish() {
            self.handle_line(&rest);
        }
        if matches!(self.state, ConsumerState::Idle | ConsumerState::Loading { .. }) {
            self.state = ConsumerState::Failed(CONNECTION_CLOSED_MESSAGE.to_string());
        }
        &self.state
    }

    fn handle_line(&mut self, line: &str) -> Option<ReportEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match serde_json::from_str::<ReportEvent>(line) {
            Ok(event) => self.apply(&event).then_some(event),
            Err(e) => {
                self.skipped += 1;
                warn!(error = %e, line_len = line.len(), "Skipping malformed report stream line");
                None
            }
        }
    }

    /// Apply one event. Returns `false` when it was ignored because the
    /// consumer already reached a terminal state.
    pub fn apply(&mut self, event: &ReportEvent) -> bool {
        self.start();
        let ConsumerState::Loading { percentage, steps } = &mut self.state else {
            return false;
        };

        match event {
            ReportEvent::Progress(step) => {
                *percentage = (*percentage).max(step.percentage);
                if !steps.iter().any(|seen| seen.step == step.step) {
                    steps.push(step.clone());
                }
            }
            ReportEvent::Complete(report) => {
                self.state = ConsumerState::Done(report.clone());
            }
            ReportEvent::Error { error } => {
                self.state = ConsumerState::Failed(error.clone());
            }
        }
        true
    }
}
