//! Tracing setup and structured stage logging.

use std::io::IsTerminal;
use tracing::{Level, info, span, warn};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::redaction::redact_error_message;
use crate::types::StageId;

fn use_color() -> bool {
    std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `ssdlc=info` (or `ssdlc=debug` when
/// `verbose`). Logs go to stderr so they never interleave with chat replies
/// on stdout.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("ssdlc=debug,info")
            } else {
                EnvFilter::try_new("ssdlc=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(use_color())
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false);

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                layer
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.with_target(false).compact())
            .try_init()?;
    }

    Ok(())
}

/// Span wrapping one stage execution.
pub fn stage_span(session_id: &str, stage: StageId) -> tracing::Span {
    span!(
        Level::INFO,
        "stage_execution",
        session_id = %session_id,
        stage = %stage,
    )
}

pub fn log_stage_start(session_id: &str, stage: StageId) {
    info!(session_id = %session_id, stage = %stage, "Starting stage");
}

pub fn log_stage_complete(session_id: &str, stage: StageId, attempts: u32, duration_ms: u128) {
    info!(
        session_id = %session_id,
        stage = %stage,
        attempts,
        duration_ms = %duration_ms,
        "Stage completed"
    );
}

/// Logs a stage that was marked complete without a document.
///
/// The error text is redacted first.
pub fn log_stage_degraded(session_id: &str, stage: StageId, error_class: &str, error: &str) {
    warn!(
        session_id = %session_id,
        stage = %stage,
        error_class = %error_class,
        error = %redact_error_message(error),
        "Stage degraded: continuing without its document"
    );
}
