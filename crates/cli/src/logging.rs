//! File logging for the CLI.
//!
//! Stdout belongs to the watch output, so everything goes to
//! `<data_dir>/logs/matchpulse.log` through a non-blocking writer.

use tracing::Span;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::paths;

const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn,tungstenite=warn";
const LOG_FILE: &str = "matchpulse.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    /// `MATCHPULSE_LOG_FORMAT`; anything but `pretty` means json.
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        }
    }
}

/// First usable directive set: `MATCHPULSE_LOG_FILTER`, then `RUST_LOG`,
/// then the default. Blank or unparseable values fall through.
fn filter_directives(explicit: Option<String>, rust_log: Option<String>) -> String {
    [explicit, rust_log]
        .into_iter()
        .flatten()
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty() && EnvFilter::try_new(v).is_ok())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

pub struct LoggingHandle {
    pub run_id: String,
    /// Root span carrying `run_id`; the watch command runs inside it.
    pub span: Span,
    pub guard: WorkerGuard,
}

pub fn init_logging() -> anyhow::Result<LoggingHandle> {
    let log_dir = paths::log_dir();
    std::fs::create_dir_all(&log_dir)?;

    let directives = filter_directives(
        std::env::var("MATCHPULSE_LOG_FILTER").ok(),
        std::env::var("RUST_LOG").ok(),
    );
    let format = LogFormat::parse(std::env::var("MATCHPULSE_LOG_FORMAT").ok().as_deref());

    let file_appender = tracing_appender::rolling::never(&log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let registry = tracing_subscriber::registry().with(EnvFilter::try_new(&directives)?);
    match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .pretty()
                    .with_target(true),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .json()
                    .flatten_event(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_current_span(true),
            )
            .try_init()?,
    }

    let run_id = std::env::var("MATCHPULSE_RUN_ID")
        .unwrap_or_else(|_| format!("pid-{}-{}", std::process::id(), matchpulse_protocol::new_id()));
    let span = tracing::info_span!("matchpulse", run_id = %run_id);

    tracing::info!(
        component = "logging",
        event = "logging.initialized",
        run_id = %run_id,
        log_path = %log_dir.join(LOG_FILE).display(),
        format = format.as_str(),
        filter = %directives,
    );

    Ok(LoggingHandle {
        run_id,
        span,
        guard,
    })
}
