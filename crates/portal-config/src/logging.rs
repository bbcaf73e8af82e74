//! Logging initialization for portal binaries.
//!
//! Thin mapping from portal settings onto the observability crate. Set
//! `PORTAL_LOG_FILE=1` to also write JSONL to `~/.member-portal/logs/portal.jsonl`.

use crate::Paths;
use observability::LogConfig;

const DEFAULT_SERVICE_NAME: &str = "member-portal";

/// Initialize logging for the default service name.
pub fn init_logging(level: &str, paths: &Paths) {
    init_logging_for_service(DEFAULT_SERVICE_NAME, level, paths);
}

/// Initialize logging with a custom service name.
pub fn init_logging_for_service(service_name: &str, level: &str, paths: &Paths) {
    let log_path = file_logging_enabled(std::env::var("PORTAL_LOG_FILE").ok())
        .then(|| paths.log_file());

    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        log_path,
        also_stderr: true,
    });
}

fn file_logging_enabled(raw: Option<String>) -> bool {
    matches!(
        raw.as_deref().map(str::trim).map(str::to_ascii_lowercase).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
