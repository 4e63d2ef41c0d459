use axum::{
    Router,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{HeaderValue, Request, StatusCode, header},
    middleware::{Next, from_fn},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use report_flow::{
    CHAT_SYSTEM_PROMPT, CompletionBackend, IntakePayload, PipelineConfig, PipelineError,
    ReportPipeline, TimedProgress, event_channel,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, Span, error, info, warn};
use uuid::Uuid;

use crate::{
    config::ServiceConfig,
    models::{ChatRequest, ChatResponse, ReportResponse},
    openrouter::OpenRouterBackend,
};

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

const NOT_CONFIGURED_MESSAGE: &str =
    "El servicio de generación no está configurado. Contacte al administrador.";
const SYNC_REPORT_ERROR_MESSAGE: &str =
    "Error al generar el reporte médico. Verifique que todos los campos estén completos.";
const CHAT_ERROR_MESSAGE: &str = "Error interno del servidor";

/// Events buffered between the pipeline and a slow client.
const EVENT_BUFFER: usize = 32;

type ApiError = (StatusCode, Json<Value>);

fn error_body(status: StatusCode, message: &str) -> ApiError {
    (status, Json(json!({ "success": false, "error": message })))
}

fn bad_request_error(message: &str) -> ApiError {
    error_body(StatusCode::BAD_REQUEST, message)
}

fn internal_error(message: &str) -> ApiError {
    error_body(StatusCode::INTERNAL_SERVER_ERROR, message)
}

fn service_unavailable() -> ApiError {
    error_body(StatusCode::SERVICE_UNAVAILABLE, NOT_CONFIGURED_MESSAGE)
}

fn rejection_error(rejection: JsonRejection) -> ApiError {
    warn!(error = %rejection.body_text(), "Rejected request body");
    bad_request_error(&rejection.body_text())
}

#[derive(Clone)]
pub struct AppState {
    backend: Option<Arc<dyn CompletionBackend>>,
    pipeline: Option<ReportPipeline>,
}

impl AppState {
    pub fn new(backend: Arc<dyn CompletionBackend>, config: &ServiceConfig) -> Result<Self, PipelineError> {
        let pipeline = ReportPipeline::new(
            backend.clone(),
            Arc::new(TimedProgress::new(config.step_delay)),
            PipelineConfig {
                timeout: config.timeout,
                ..PipelineConfig::default()
            },
        )?;

        Ok(Self {
            backend: Some(backend),
            pipeline: Some(pipeline),
        })
    }

    /// State without a generation backend; every LLM route answers 503.
    pub fn unconfigured() -> Self {
        Self {
            backend: None,
            pipeline: None,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    fn pipeline(&self) -> Result<&ReportPipeline, ApiError> {
        self.pipeline.as_ref().ok_or_else(|| {
            error!("Report requested but no generation backend is configured");
            service_unavailable()
        })
    }

    fn backend(&self) -> Result<&Arc<dyn CompletionBackend>, ApiError> {
        self.backend.as_ref().ok_or_else(|| {
            error!("Chat requested but no generation backend is configured");
            service_unavailable()
        })
    }
}

pub fn create_app(config: &ServiceConfig) -> Result<Router, PipelineError> {
    let state = match &config.api_key {
        Some(api_key) => {
            let backend = OpenRouterBackend::new(api_key, &config.base_url, &config.model)?;
            AppState::new(Arc::new(backend), config)?
        }
        None => AppState::unconfigured(),
    };
    Ok(build_router(state))
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/generar-reporte", post(generate_report))
        .route("/api/generar-reporte/stream", post(stream_report))
        .route("/api/chat", post(chat))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Tag every request with a correlation id header and a matching span.
async fn correlation_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert(CORRELATION_ID_HEADER, value.clone());
        let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
        let mut response = next.run(request).instrument(span).await;
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
        return response;
    }

    next.run(request).await
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Cardio Report Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Streaming generation of cardiology justification reports for health insurers",
        "endpoints": {
            "POST /api/generar-reporte/stream": "Generate a report, streaming NDJSON progress events",
            "POST /api/generar-reporte": "Generate a report in a single response",
            "POST /api/chat": "Clinical assistant chat",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "configured": state.is_configured(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn stream_report(
    State(state): State<AppState>,
    payload: Result<Json<IntakePayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let pipeline = state.pipeline()?.clone();
    let Json(payload) = payload.map_err(rejection_error)?;

    let (sink, body) = event_channel(EVENT_BUFFER);
    tokio::spawn(
        async move {
            pipeline.run(&payload, &sink).await;
        }
        .instrument(Span::current()),
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(body),
    )
        .into_response())
}

async fn generate_report(
    State(state): State<AppState>,
    payload: Result<Json<IntakePayload>, JsonRejection>,
) -> Result<Json<ReportResponse>, ApiError> {
    let pipeline = state.pipeline()?;
    let Json(payload) = payload.map_err(rejection_error)?;

    match pipeline.generate_report(&payload).await {
        Ok(report) => {
            info!(chars = report.reporte.chars().count(), "Report generated");
            Ok(Json(report.into()))
        }
        Err(e) => {
            error!(error = %e, "Report generation failed");
            Err(internal_error(SYNC_REPORT_ERROR_MESSAGE))
        }
    }
}

async fn chat(
    State(state): State<AppState>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let backend = state.backend()?;
    let Json(request) = request.map_err(rejection_error)?;

    if request.messages.is_empty() {
        return Err(bad_request_error("messages must not be empty"));
    }

    info!(messages = request.messages.len(), model = backend.model(), "Chat request");
    let message = backend
        .chat(CHAT_SYSTEM_PROMPT, &request.messages)
        .await
        .map_err(|e| {
            error!(error = %e, "Chat completion failed");
            internal_error(CHAT_ERROR_MESSAGE)
        })?;

    Ok(Json(ChatResponse { message }))
}
