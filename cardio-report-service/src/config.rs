use std::{str::FromStr, time::Duration};
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o";

/// Runtime settings read from the environment.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// `None` leaves the service up but every generation route answers with a
    /// configuration error.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub port: u16,
    pub step_delay: Duration,
    pub timeout: Duration,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            port: 3000,
            step_delay: report_flow::progress::DEFAULT_STEP_DELAY,
            timeout: report_flow::pipeline::DEFAULT_TIMEOUT,
            log_format: LogFormat::Json,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset or blank values keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        Self {
            api_key: get("OPENROUTER_API_KEY"),
            base_url: get("OPENROUTER_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            model: get("REPORT_MODEL").unwrap_or(defaults.model),
            port: parse_or("PORT", get("PORT"), defaults.port),
            step_delay: get("REPORT_STEP_DELAY_MS")
                .map(|raw| Duration::from_millis(parse_or("REPORT_STEP_DELAY_MS", Some(raw), 500)))
                .unwrap_or(defaults.step_delay),
            timeout: get("REPORT_TIMEOUT_SECS")
                .map(|raw| Duration::from_secs(parse_or("REPORT_TIMEOUT_SECS", Some(raw), 120)))
                .unwrap_or(defaults.timeout),
            log_format: match get("LOG_FORMAT").as_deref() {
                Some("pretty") => LogFormat::Pretty,
                _ => LogFormat::Json,
            },
        }
    }
}

fn parse_or<T: FromStr + Copy>(key: &str, raw: Option<String>, fallback: T) -> T {
    match raw {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Invalid numeric setting, using default");
            fallback
        }),
        None => fallback,
    }
}
