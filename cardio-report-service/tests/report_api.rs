use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use cardio_report_service::{
    AppState, CORRELATION_ID_HEADER, ChatResponse, ErrorResponse, ReportResponse, ServiceConfig,
    build_router,
};
use futures::stream;
use report_flow::{
    ChatMessage, CompletionBackend, CompletionRequest, PipelineError, REPORT_ERROR_MESSAGE,
    ReportEvent, RequestType, Result, TokenStream,
};
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;

/// Backend that replays canned deltas, optionally failing after them.
struct StubBackend {
    tokens: Vec<String>,
    fail_with: Option<String>,
}

impl StubBackend {
    fn tokens(tokens: Vec<String>) -> Self {
        Self {
            tokens,
            fail_with: None,
        }
    }

    fn failing(tokens: Vec<String>, error: &str) -> Self {
        Self {
            tokens,
            fail_with: Some(error.to_string()),
        }
    }
}

#[async_trait]
impl CompletionBackend for StubBackend {
    fn model(&self) -> &str {
        "stub/model"
    }

    async fn stream_completion(&self, _request: CompletionRequest) -> Result<TokenStream> {
        let mut items: Vec<Result<String>> = self.tokens.iter().cloned().map(Ok).collect();
        if let Some(error) = &self.fail_with {
            items.push(Err(PipelineError::Backend(error.clone())));
        }
        Ok(Box::pin(stream::iter(items)))
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<String> {
        match &self.fail_with {
            Some(error) => Err(PipelineError::Backend(error.clone())),
            None => Ok(self.tokens.concat()),
        }
    }

    async fn chat(&self, _system: &str, messages: &[ChatMessage]) -> Result<String> {
        match &self.fail_with {
            Some(error) => Err(PipelineError::Backend(error.clone())),
            None => Ok(format!("Respuesta a {} mensajes", messages.len())),
        }
    }
}

fn report_tokens() -> Vec<String> {
    (0..18)
        .map(|i| format!("<p>{:02}{}</p>", i, "a".repeat(91)))
        .collect()
}

fn app(backend: StubBackend) -> Router {
    let config = ServiceConfig {
        step_delay: Duration::ZERO,
        timeout: Duration::from_secs(5),
        ..ServiceConfig::default()
    };
    build_router(AppState::new(Arc::new(backend), &config).unwrap())
}

fn juan_perez() -> Value {
    json!({
        "nombre": "Juan",
        "apellido": "Pérez",
        "edad": "54",
        "historiaClinica": "HC-20931",
        "sintomas": { "palpitaciones": true, "mareos": false, "disnea": false },
        "ecocardiograma": { "fevi": "55%" },
        "holter": { "pausas": "no", "bloqueosAV": "no", "episodiosFA": "sí" },
        "ecg": { "ritmo": "sinusal" },
        "tipoSolicitud": "holter-24hs"
    })
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn parse_lines(body: &str) -> Vec<ReportEvent> {
    body.lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_stream_emits_progress_then_complete() {
    let tokens = report_tokens();
    let expected_report = tokens.concat();
    let response = app(StubBackend::tokens(tokens))
        .oneshot(post_json("/api/generar-reporte/stream", &juan_perez()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
    assert_eq!(headers[header::CONNECTION], "keep-alive");

    let body = body_text(response).await;
    assert!(body.ends_with('\n'));
    let events = parse_lines(&body);

    let percentages: Vec<u8> = events
        .iter()
        .filter_map(|event| match event {
            ReportEvent::Progress(step) => Some(step.percentage),
            _ => None,
        })
        .collect();
    assert_eq!(percentages, vec![10, 18, 26, 34, 42, 50, 70, 85, 95]);

    assert_eq!(events.iter().filter(|event| event.is_terminal()).count(), 1);
    match events.last().unwrap() {
        ReportEvent::Complete(report) => {
            assert_eq!(report.reporte, expected_report);
            assert_eq!(report.paciente.nombre, "Juan");
            assert_eq!(report.paciente.historia_clinica, "HC-20931");
            assert_eq!(report.tipo_solicitud, RequestType::Holter24hs);
        }
        other => panic!("expected complete, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stream_failure_hides_partial_output() {
    let response = app(StubBackend::failing(
        vec!["<h3>Historia clínica</h3>".to_string()],
        "connection reset by peer",
    ))
    .oneshot(post_json("/api/generar-reporte/stream", &juan_perez()))
    .await
    .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(!body.contains("Historia clínica"));
    assert!(!body.contains("connection reset"));

    let events = parse_lines(&body);
    assert_eq!(events.last(), Some(&ReportEvent::error(REPORT_ERROR_MESSAGE)));
    assert!(events.iter().all(|event| !matches!(event, ReportEvent::Complete(_))));
}

#[tokio::test]
async fn test_missing_credential_answers_before_streaming() {
    let app = build_router(AppState::unconfigured());

    for uri in ["/api/generar-reporte/stream", "/api/generar-reporte"] {
        let response = app
            .clone()
            .oneshot(post_json(uri, &juan_perez()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_ne!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        let body = body_text(response).await;
        assert!(!body.contains("progress"));
        let error: ErrorResponse = serde_json::from_str(&body).unwrap();
        assert!(!error.success);
    }
}

#[tokio::test]
async fn test_invalid_request_type_is_rejected() {
    let mut payload = juan_perez();
    payload["tipoSolicitud"] = json!("resonancia");

    let response = app(StubBackend::tokens(report_tokens()))
        .oneshot(post_json("/api/generar-reporte/stream", &payload))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    let error: ErrorResponse = serde_json::from_str(&body_text(response).await).unwrap();
    assert!(!error.success);
}

#[tokio::test]
async fn test_sync_report() {
    let response = app(StubBackend::tokens(vec!["<p>Informe</p>".to_string()]))
        .oneshot(post_json("/api/generar-reporte", &juan_perez()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let report: ReportResponse = serde_json::from_str(&body_text(response).await).unwrap();
    assert!(report.success);
    assert_eq!(report.reporte, "<p>Informe</p>");
    assert_eq!(report.paciente.apellido, "Pérez");
    assert_eq!(report.tipo_solicitud, RequestType::Holter24hs);
}

#[tokio::test]
async fn test_sync_report_failure_is_500() {
    let response = app(StubBackend::failing(vec![], "quota exceeded"))
        .oneshot(post_json("/api/generar-reporte", &juan_perez()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_text(response).await;
    assert!(!body.contains("quota"));
}

#[tokio::test]
async fn test_chat() {
    let request = json!({
        "messages": [
            { "role": "user", "content": "¿Indicación de CDI con FEVI 30%?" },
            { "role": "assistant", "content": "Depende de la etiología." },
            { "role": "user", "content": "Isquémica." }
        ]
    });

    let response = app(StubBackend::tokens(vec![]))
        .oneshot(post_json("/api/chat", &request))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let chat: ChatResponse = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(chat.message, "Respuesta a 3 mensajes");
}

#[tokio::test]
async fn test_chat_backend_failure_is_500_without_details() {
    let request = json!({ "messages": [{ "role": "user", "content": "¿Anticoagulación?" }] });

    let response = app(StubBackend::failing(vec![], "upstream 502 from provider"))
        .oneshot(post_json("/api/chat", &request))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_text(response).await;
    assert!(!body.contains("upstream 502"));
    let error: ErrorResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(error.error, "Error interno del servidor");
}

#[tokio::test]
async fn test_chat_requires_messages() {
    let response = app(StubBackend::tokens(vec![]))
        .oneshot(post_json("/api/chat", &json!({ "messages": [] })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_and_correlation_id() {
    let response = build_router(AppState::unconfigured())
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(CORRELATION_ID_HEADER, "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CORRELATION_ID_HEADER], "req-42");
    let health: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["configured"], false);
}
