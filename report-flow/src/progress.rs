use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::{error::Result, event::ReportEvent, sink::EventSink};

/// Pre-generation checkpoints: `(label, percentage)`.
pub const DEFAULT_STEPS: [(&str, u8); 6] = [
    ("Analizando datos del paciente", 10),
    ("Procesando síntomas y antecedentes", 18),
    ("Revisando estudios complementarios", 26),
    ("Consultando guías clínicas (ESC, AHA, SAC)", 34),
    ("Evaluando criterios de indicación", 42),
    ("Generando reporte con IA", 50),
];

pub const DEFAULT_STEP_DELAY: Duration = Duration::from_millis(500);

/// Reports liveness to the client before the generation call starts.
///
/// Implementations must finish before the relay begins and must never exceed
/// [`ProgressReporter::ceiling`].
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, sink: &dyn EventSink) -> Result<()>;

    /// Highest percentage this reporter emits.
    fn ceiling(&self) -> u8;
}

/// Fixed sequence of checkpoints paced by a constant delay.
#[derive(Debug, Clone)]
pub struct TimedProgress {
    steps: Vec<(String, u8)>,
    delay: Duration,
}

impl TimedProgress {
    pub fn new(delay: Duration) -> Self {
        Self {
            steps: DEFAULT_STEPS
                .iter()
                .map(|(label, percentage)| (label.to_string(), *percentage))
                .collect(),
            delay,
        }
    }

    pub fn with_steps(steps: Vec<(String, u8)>, delay: Duration) -> Self {
        Self { steps, delay }
    }

}

impl Default for TimedProgress {
    fn default() -> Self {
        Self::new(DEFAULT_STEP_DELAY)
    }
}

#[async_trait]
impl ProgressReporter for TimedProgress {
    async fn report(&self, sink: &dyn EventSink) -> Result<()> {
        for (index, (label, percentage)) in self.steps.iter().enumerate() {
            if index > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            debug!(step = %label, percentage, "Pre-generation checkpoint");
            sink.emit(ReportEvent::progress(label.clone(), *percentage))
                .await?;
        }
        Ok(())
    }

    fn ceiling(&self) -> u8 {
        self.steps
            .iter()
            .map(|(_, percentage)| *percentage)
            .max()
            .unwrap_or(0)
    }
}

/// Emits nothing; the relay's own checkpoints are the only progress signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

#[async_trait]
impl ProgressReporter for SilentProgress {
    async fn report(&self, _sink: &dyn EventSink) -> Result<()> {
        Ok(())
    }

    fn ceiling(&self) -> u8 {
        0
    }
}
