/*!
 * Logging Module
 * Centralized logging configuration and utilities
 */
pub mod middleware;

use std::io;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::config::LogConfig;

/// Background writer guards. Dropping them flushes and stops the writers,
/// so hold them until the process exits.
#[must_use]
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

fn default_filter(level: &str) -> String {
    format!("vidz_backend={level},tower_http=debug,axum=debug,sqlx=warn")
}

/// Initialize the logging system
pub fn init(config: &LogConfig) -> LogGuards {
    if let Err(e) = std::fs::create_dir_all(&config.directory) {
        eprintln!("Could not create log directory {}: {}", config.directory, e);
    }

    let (file_writer, file_guard) = non_blocking(rolling::daily(&config.directory, "app.log"));
    let (console_writer, console_guard) = non_blocking(io::stdout());
    let mut guards = vec![file_guard, console_guard];

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&config.level)));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.production {
        let (error_writer, error_guard) =
            non_blocking(rolling::daily(&config.directory, "error.log"));
        guards.push(error_guard);

        // JSON format for production
        let file_layer = fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        let error_layer = fmt::layer()
            .json()
            .with_writer(error_writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(LevelFilter::ERROR);

        let console_layer = fmt::layer()
            .json()
            .with_writer(console_writer)
            .with_target(false);

        subscriber
            .with(file_layer)
            .with(error_layer)
            .with(console_layer)
            .init();
    } else {
        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false);

        let console_layer = fmt::layer()
            .with_writer(console_writer)
            .with_target(true)
            .pretty();

        subscriber.with(file_layer).with(console_layer).init();
    }

    tracing::info!(
        production = config.production,
        level = %config.level,
        "Logging initialized"
    );

    LogGuards { _guards: guards }
}
