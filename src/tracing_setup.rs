use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::models::DEVELOPMENT;

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_DIRECTIVE: &str = "info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable, for local development
    Pretty,
    /// One JSON object per line with the span list attached
    Json,
}

impl LogFormat {
    pub fn for_environment(environment: &str) -> Self {
        if environment == DEVELOPMENT {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        }
    }
}

fn build_filter(directive: Option<&str>) -> Result<EnvFilter> {
    match directive {
        Some(directive) => EnvFilter::try_new(directive)
            .wrap_err_with(|| format!("Invalid log filter: {directive}")),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))),
    }
}

/// Install the global subscriber.
///
/// `directive` overrides `RUST_LOG`; fails if a subscriber is already set.
pub fn init_tracing(format: LogFormat, directive: Option<&str>) -> Result<()> {
    let filter = build_filter(directive)?;
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    match format {
        LogFormat::Json => Registry::default()
            .with(filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(false)
                    .with_span_list(true)
                    .with_thread_ids(true),
            )
            .try_init()
            .wrap_err("Failed to install JSON tracing subscriber")?,
        LogFormat::Pretty => Registry::default()
            .with(filter)
            .with(fmt_layer.pretty())
            .try_init()
            .wrap_err("Failed to install console tracing subscriber")?,
    }

    tracing::info!(?format, "Logging initialized");
    Ok(())
}

/// Pretty output in development, JSON everywhere else.
pub fn init_for_environment(environment: &str) -> Result<()> {
    init_tracing(LogFormat::for_environment(environment), None)
}

/// Span covering one inbound request; the status is recorded once known.
pub fn create_request_span(method: &str, path: &str, request_id: &str) -> tracing::Span {
    tracing::info_span!(
        "request",
        http.method = method,
        http.path = path,
        request.id = request_id,
        http.status_code = tracing::field::Empty,
    )
}
