use crate::config::LoggingConfig;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "person_pipeline=info";

/// Initializes console logging, plus daily-rotated JSON logs when
/// `log_dir` is configured.
///
/// The returned guard flushes the file writer on drop; keep it alive until
/// the process exits.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    let console_layer = fmt::layer().with_writer(std::io::stdout);

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => match fs::create_dir_all(dir) {
            Ok(()) => {
                let file_appender = tracing_appender::rolling::daily(dir, "pipeline.log");
                let (writer, guard) = tracing_appender::non_blocking(file_appender);
                (Some(fmt::layer().json().with_writer(writer)), Some(guard))
            }
            Err(e) => {
                eprintln!("Could not create log directory {}: {e}", dir.display());
                (None, None)
            }
        },
        None => (None, None),
    };

    // A second init (tests, embedding apps) keeps the existing subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    guard
}
