//! # Tracing Module
//!
//! Environment-aware console logging using the tracing ecosystem. Logs go to
//! stdout; set `LOG_FORMAT=json` for one JSON object per line.
//!
//! Level resolution: `LOG_LEVEL`, then `RUST_LOG`, then a default derived from
//! `TASKER_ENV` (`production` logs at `info`, everything else at `debug`).

use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Install the global console subscriber. Safe to call more than once.
pub fn init_tracing() {
    TRACING_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let json = use_json_format();
        let use_ansi = !json && IsTerminal::is_terminal(&std::io::stdout());

        let console_layer = if json {
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_filter(EnvFilter::new(&log_level))
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(use_ansi)
                .with_filter(EnvFilter::new(&log_level))
                .boxed()
        };

        let subscriber = tracing_subscriber::registry().with(console_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        } else {
            tracing::info!(
                environment = %environment,
                log_level = %log_level,
                json_format = json,
                ansi_colors = use_ansi,
                "Console logging initialized"
            );
        }
    });
}

/// Test-friendly subscriber writing through the libtest capture
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(get_log_level("test")))
        .with_test_writer()
        .try_init();
}

fn get_environment() -> String {
    std::env::var("TASKER_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn use_json_format() -> bool {
    std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

fn get_log_level(environment: &str) -> String {
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        return level.to_lowercase();
    }

    if let Ok(level) = std::env::var("RUST_LOG") {
        return level.to_lowercase();
    }

    default_log_level(environment).to_string()
}

fn default_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log batch lifecycle operations
///
/// ```rust,ignore
/// log_batch!(info, "Batch created", batch_id: batch.batch_id, batch_type: batch.batch_type);
/// ```
#[macro_export]
macro_rules! log_batch {
    ($level:ident, $operation:expr, batch_id: $batch_id:expr, $($key:ident: $value:expr),* $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            batch_id = %$batch_id,
            $($key = ?$value,)*
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "BATCH {}", $operation
        );
    };
    ($level:ident, $operation:expr, batch_id: $batch_id:expr $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            batch_id = %$batch_id,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "BATCH {}", $operation
        );
    };
    ($level:ident, $operation:expr $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "BATCH {}", $operation
        );
    };
}

/// Log job attempt operations
#[macro_export]
macro_rules! log_job {
    ($level:ident, $operation:expr, job_id: $job_id:expr, $($key:ident: $value:expr),* $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            job_id = %$job_id,
            $($key = ?$value,)*
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "JOB {}", $operation
        );
    };
    ($level:ident, $operation:expr, job_id: $job_id:expr $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            job_id = %$job_id,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "JOB {}", $operation
        );
    };
}
