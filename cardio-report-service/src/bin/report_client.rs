use anyhow::{Context, bail};
use cardio_report_service::ErrorResponse;
use clap::Parser;
use report_flow::{CompletedReport, ConsumerState, IntakePayload, ReportConsumer, ReportEvent};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "report_client")]
#[command(about = "Request a cardiology report and follow its progress")]
#[command(version)]
struct Args {
    /// Intake form as a JSON file
    intake: PathBuf,

    /// Base URL of the report service
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    /// Write the report HTML here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Extra attempts after a failed generation
    #[arg(short, long, default_value_t = 0)]
    retries: u32,
}

async fn request_report(
    http: &reqwest::Client,
    url: &str,
    payload: &IntakePayload,
) -> anyhow::Result<ConsumerState> {
    let mut response = http
        .post(format!("{}/api/generar-reporte/stream", url.trim_end_matches('/')))
        .json(payload)
        .send()
        .await
        .context("sending report request")?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .json::<ErrorResponse>()
            .await
            .unwrap_or_else(|_| ErrorResponse::new(status.to_string()));
        bail!("service returned {}: {}", status, body.error);
    }

    let mut consumer = ReportConsumer::new();
    consumer.start();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                for event in consumer.feed(&chunk) {
                    if let ReportEvent::Progress(step) = event {
                        eprintln!("[{:>3}%] {}", step.percentage, step.step);
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Report stream interrupted");
                break;
            }
        }
    }

    if consumer.skipped_lines() > 0 {
        warn!(skipped = consumer.skipped_lines(), "Ignored malformed stream lines");
    }
    Ok(consumer.finish().clone())
}

/// Request the report, starting over with a fresh request after any failure.
async fn fetch_report(
    http: &reqwest::Client,
    url: &str,
    payload: &IntakePayload,
    retries: u32,
) -> anyhow::Result<CompletedReport> {
    for attempt in 0..=retries {
        info!(
            attempt = attempt + 1,
            request_type = payload.tipo_solicitud.label(),
            "Requesting report"
        );

        match request_report(http, url, payload).await {
            Ok(ConsumerState::Done(report)) => return Ok(report),
            Ok(ConsumerState::Failed(message)) => eprintln!("Generation failed: {}", message),
            Ok(other) => warn!(state = ?other, "Stream ended in a non-terminal state"),
            Err(e) => warn!(error = %e, "Report request failed"),
        }
    }

    bail!("no report after {} attempt(s)", retries + 1)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "report_client=info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let raw = std::fs::read_to_string(&args.intake)
        .with_context(|| format!("reading {}", args.intake.display()))?;
    let payload: IntakePayload = serde_json::from_str(&raw).context("parsing intake form")?;

    let report = fetch_report(&reqwest::Client::new(), &args.url, &payload, args.retries).await?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, &report.reporte)
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!(
                "{} report for {} {} written to {}",
                report.tipo_solicitud.label(),
                report.paciente.nombre,
                report.paciente.apellido,
                path.display()
            );
        }
        None => println!("{}", report.reporte),
    }

    Ok(())
}
