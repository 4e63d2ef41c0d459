use report_flow::{ChatMessage, CompletedReport, PatientSummary, RequestType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
}

/// Body of the non-streaming report route.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub success: bool,
    pub reporte: String,
    pub paciente: PatientSummary,
    pub tipo_solicitud: RequestType,
}

impl From<CompletedReport> for ReportResponse {
    fn from(report: CompletedReport) -> Self {
        Self {
            success: true,
            reporte: report.reporte,
            paciente: report.paciente,
            tipo_solicitud: report.tipo_solicitud,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}
