//! Relays a streaming completion into coarse progress checkpoints.
//!
//! Output is accumulated in memory and only returned once the upstream stream
//! is exhausted. Checkpoints are keyed to the running character count and are
//! evaluated when a delta arrives, so a large delta can jump over a window.

use futures::StreamExt;
use std::ops::Range;
use tracing::{debug, warn};

use crate::{
    backend::TokenStream,
    error::{PipelineError, Result},
    event::ReportEvent,
    sink::EventSink,
};

/// Progress update fired once when the running character count first lands in
/// `window`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub label: String,
    pub percentage: u8,
    pub window: Range<usize>,
}

impl Checkpoint {
    pub fn new(label: impl Into<String>, percentage: u8, window: Range<usize>) -> Self {
        Self {
            label: label.into(),
            percentage,
            window,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamingRelay {
    checkpoints: Vec<Checkpoint>,
    final_label: String,
    final_percentage: u8,
}

impl Default for StreamingRelay {
    fn default() -> Self {
        Self {
            checkpoints: vec![
                Checkpoint::new("Elaborando justificación médica", 70, 400..700),
                Checkpoint::new("Determinando clasificación de indicación", 85, 1200..1500),
            ],
            final_label: "Finalizando reporte".to_string(),
            final_percentage: 95,
        }
    }
}

impl StreamingRelay {
    pub fn new(
        checkpoints: Vec<Checkpoint>,
        final_label: impl Into<String>,
        final_percentage: u8,
    ) -> Self {
        Self {
            checkpoints,
            final_label: final_label.into(),
            final_percentage,
        }
    }

    /// Lowest percentage the relay can emit; earlier progress must stay below it.
    pub fn first_percentage(&self) -> u8 {
        self.checkpoints
            .iter()
            .map(|checkpoint| checkpoint.percentage)
            .chain(std::iter::once(self.final_percentage))
            .min()
            .unwrap_or(self.final_percentage)
    }

    /// Consume `tokens` to exhaustion and return the accumulated text.
    ///
    /// Any stream error aborts and the partial text is dropped. A closed sink
    /// stops the read immediately, which drops the upstream stream.
    pub async fn relay(&self, mut tokens: TokenStream, sink: &dyn EventSink) -> Result<String> {
        let mut output = String::new();
        let mut chars = 0usize;
        let mut fired = vec![false; self.checkpoints.len()];

        loop {
            let next = tokio::select! {
                biased;
                _ = sink.closed() => return Err(PipelineError::ClientDisconnected),
                next = tokens.next() => next,
            };

            let delta = match next {
                Some(Ok(delta)) => delta,
                Some(Err(e)) => {
                    warn!(accumulated_chars = chars, error = %e, "Generation stream failed");
                    return Err(e);
                }
                None => break,
            };

            chars += delta.chars().count();
            output.push_str(&delta);

            for (checkpoint, done) in self.checkpoints.iter().zip(fired.iter_mut()) {
                if !*done && checkpoint.window.contains(&chars) {
                    *done = true;
                    debug!(step = %checkpoint.label, chars, "Generation checkpoint");
                    sink.emit(ReportEvent::progress(
                        checkpoint.label.clone(),
                        checkpoint.percentage,
                    ))
                    .await?;
                }
            }
        }

        sink.emit(ReportEvent::progress(
            self.final_label.clone(),
            self.final_percentage,
        ))
        .await?;

        debug!(chars, "Generation stream exhausted");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingSink, failing_stream, token_stream};

    fn relay() -> StreamingRelay {
        StreamingRelay::new(
            vec![
                Checkpoint::new("justificación", 70, 10..20),
                Checkpoint::new("clasificación", 85, 30..40),
            ],
            "final",
            95,
        )
    }

    #[tokio::test]
    async fn test_checkpoints_fire_once_inside_windows() {
        let sink = RecordingSink::new();
        // Running totals: 5, 12, 15, 18, 33, 36, 50
        let (e, g) = ("e".repeat(15), "g".repeat(14));
        let tokens = token_stream(&["aaaaa", "bbbbbbb", "ccc", "ddd", e.as_str(), "fff", g.as_str()]);

        let output = relay().relay(tokens, &sink).await.unwrap();

        assert_eq!(output.chars().count(), 50);
        let steps: Vec<(String, u8)> = sink
            .progress_steps()
            .into_iter()
            .map(|step| (step.step, step.percentage))
            .collect();
        assert_eq!(
            steps,
            vec![
                ("justificación".to_string(), 70),
                ("clasificación".to_string(), 85),
                ("final".to_string(), 95),
            ]
        );
    }

    #[tokio::test]
    async fn test_window_skipped_when_delta_jumps_over_it() {
        let sink = RecordingSink::new();
        // Running totals: 5, 25 (skips 10..20), 35
        let (b, c) = ("b".repeat(20), "c".repeat(10));
        let tokens = token_stream(&["aaaaa", b.as_str(), c.as_str()]);

        relay().relay(tokens, &sink).await.unwrap();

        let labels: Vec<String> = sink.progress_steps().into_iter().map(|s| s.step).collect();
        assert_eq!(labels, vec!["clasificación", "final"]);
    }

    #[tokio::test]
    async fn test_counts_characters_not_bytes() {
        let sink = RecordingSink::new();
        // Twelve two-byte characters: 12 chars (inside 10..20), 24 bytes (outside it).
        let accented = "é".repeat(12);
        let tokens = token_stream(&[accented.as_str()]);

        relay().relay(tokens, &sink).await.unwrap();

        let labels: Vec<String> = sink.progress_steps().into_iter().map(|s| s.step).collect();
        assert_eq!(labels, vec!["justificación", "final"]);
    }

    #[tokio::test]
    async fn test_stream_error_discards_partial_output() {
        let sink = RecordingSink::new();
        let tokens = failing_stream(&["<h3>Historia", " clínica</h3>"], "connection reset");

        let result = relay().relay(tokens, &sink).await;

        assert!(matches!(result, Err(PipelineError::Backend(_))));
        assert!(sink.progress_steps().iter().all(|step| step.step != "final"));
    }

    #[tokio::test]
    async fn test_empty_stream_still_emits_final_checkpoint() {
        let sink = RecordingSink::new();
        let output = relay().relay(token_stream(&[]), &sink).await.unwrap();

        assert!(output.is_empty());
        assert_eq!(sink.progress_steps().len(), 1);
    }

    #[test]
    fn test_first_percentage() {
        assert_eq!(StreamingRelay::default().first_percentage(), 70);
        assert_eq!(StreamingRelay::new(vec![], "final", 95).first_percentage(), 95);
    }
}
