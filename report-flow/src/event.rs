use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::intake::{PatientSummary, RequestType};

/// One `{step, percentage}` update sent before the final result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressStep {
    pub step: String,
    pub percentage: u8,
}

impl ProgressStep {
    /// Percentages above 100 are clamped.
    pub fn new(step: impl Into<String>, percentage: u8) -> Self {
        Self {
            step: step.into(),
            percentage: percentage.min(100),
        }
    }
}

/// Final artifacts of a successful generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedReport {
    /// HTML fragment produced by the model.
    pub reporte: String,
    pub paciente: PatientSummary,
    #[serde(rename = "tipoSolicitud")]
    pub tipo_solicitud: RequestType,
}

/// Events written to the report stream, one JSON object per line.
///
/// `Complete` and `Error` are terminal; exactly one of them ends a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportEvent {
    Progress(ProgressStep),
    Complete(CompletedReport),
    Error { error: String },
}

impl ReportEvent {
    pub fn progress(step: impl Into<String>, percentage: u8) -> Self {
        ReportEvent::Progress(ProgressStep::new(step, percentage))
    }

    pub fn error(message: impl Into<String>) -> Self {
        ReportEvent::Error {
            error: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReportEvent::Progress(_))
    }

    /// Value of the `type` tag on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            ReportEvent::Progress(_) => "progress",
            ReportEvent::Complete(_) => "complete",
            ReportEvent::Error { .. } => "error",
        }
    }
}

/// Wire shape of [`ReportEvent`]. Terminal events carry a `success` flag that
/// must agree with their tag.
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireEvent {
    Progress {
        step: String,
        percentage: u8,
    },
    Complete {
        success: bool,
        #[serde(flatten)]
        report: CompletedReport,
    },
    Error {
        success: bool,
        error: String,
    },
}

impl From<ReportEvent> for WireEvent {
    fn from(event: ReportEvent) -> Self {
        match event {
            ReportEvent::Progress(ProgressStep { step, percentage }) => {
                WireEvent::Progress { step, percentage }
            }
            ReportEvent::Complete(report) => WireEvent::Complete {
                success: true,
                report,
            },
            ReportEvent::Error { error } => WireEvent::Error {
                success: false,
                error,
            },
        }
    }
}

impl WireEvent {
    fn into_event(self) -> Result<ReportEvent, String> {
        match self {
            WireEvent::Progress { step, percentage } if percentage <= 100 => {
                Ok(ReportEvent::Progress(ProgressStep { step, percentage }))
            }
            WireEvent::Progress { percentage, .. } => {
                Err(format!("percentage {} is out of range", percentage))
            }
            WireEvent::Complete {
                success: true,
                report,
            } => Ok(ReportEvent::Complete(report)),
            WireEvent::Error {
                success: false,
                error,
            } => Ok(ReportEvent::Error { error }),
            WireEvent::Complete { .. } | WireEvent::Error { .. } => {
                Err("success flag does not match event type".to_string())
            }
        }
    }
}

impl Serialize for ReportEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireEvent::from(self.clone()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ReportEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        WireEvent::deserialize(deserializer)?
            .into_event()
            .map_err(de::Error::custom)
    }
}
