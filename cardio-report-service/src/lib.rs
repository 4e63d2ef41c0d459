pub mod config;
pub mod models;
pub mod openrouter;
pub mod service;

pub use config::{LogFormat, ServiceConfig};
pub use openrouter::{OpenRouterBackend, SseDeltaDecoder};
pub use service::{AppState, CORRELATION_ID_HEADER, build_router, create_app};
pub use models::*;
