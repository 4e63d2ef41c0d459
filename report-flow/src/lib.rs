pub mod backend;
pub mod codec;
pub mod consumer;
pub mod error;
pub mod event;
pub mod intake;
pub mod pipeline;
pub mod progress;
pub mod prompt;
pub mod relay;
pub mod sink;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use backend::{ChatMessage, ChatRole, CompletionBackend, CompletionRequest, TokenStream};
pub use codec::{LineBuffer, encode_event};
pub use consumer::{CONNECTION_CLOSED_MESSAGE, ConsumerState, ReportConsumer};
pub use error::{PipelineError, Result};
pub use event::{CompletedReport, ProgressStep, ReportEvent};
pub use intake::{Ecg, Echocardiogram, Holter, IntakePayload, PatientSummary, RequestType, Symptoms};
pub use pipeline::{PipelineConfig, REPORT_ERROR_MESSAGE, ReportPipeline, RunOutcome};
pub use progress::{ProgressReporter, SilentProgress, TimedProgress};
pub use prompt::{CHAT_SYSTEM_PROMPT, REPORT_SYSTEM_PROMPT, build_report_prompt};
pub use relay::{Checkpoint, StreamingRelay};
pub use sink::{ChannelSink, EventSink, event_channel};
