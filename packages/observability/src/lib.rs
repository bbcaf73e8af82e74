//! # Observability
//!
//! Centralized tracing setup for the Member Portal workspace.
//!
//! Binaries call [`init`] or [`init_with_config`] once at startup and use the
//! standard `tracing` macros everywhere else. Library crates never install a
//! subscriber themselves.
//!
//! ## Sinks
//!
//! - **File**: structured JSONL appended to `log_path`, one flushed line per
//!   event, so several processes can share one file.
//! - **Stderr**: compact human-readable output for foreground runs.
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "member-portal".into(),
//!         default_level: "debug".into(),
//!         also_stderr: true,
//!         ..Default::default()
//!     });
//!     tracing::info!("ready");
//! }
//! ```

mod writer;

use std::io;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use writer::{LogFileWriter, WriterFactory};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, written into the startup event.
    pub service_name: String,

    /// Default level filter (e.g. "debug", "info").
    /// `RUST_LOG` takes precedence when set.
    pub default_level: String,

    /// JSONL output file. `None` disables the file sink.
    pub log_path: Option<PathBuf>,

    /// Also emit compact logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: true,
        }
    }
}

/// Default JSONL location: `~/.member-portal/logs/portal.jsonl`.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".member-portal").join("logs").join("portal.jsonl"))
}

/// Initialize with default settings (stderr only).
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize the global subscriber from `config`.
///
/// Calling this more than once is harmless: the first subscriber wins and
/// later calls only log a debug event. A log file that cannot be opened
/// downgrades to stderr output instead of aborting the process.
pub fn init_with_config(config: LogConfig) {
    let file_writer = match config.log_path.as_ref() {
        Some(path) => match LogFileWriter::new(path) {
            Ok(writer) => Some(writer),
            Err(e) => {
                eprintln!("failed to open log file {}: {}", path.display(), e);
                None
            }
        },
        None => None,
    };
    let also_stderr = config.also_stderr || file_writer.is_none();

    let file_layer = file_writer.map(|writer| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_writer(WriterFactory::new(writer))
            .with_filter(env_filter(&config.default_level))
    });

    let stderr_layer = also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    let installed = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(
            service = %config.service_name,
            log_path = ?config.log_path,
            "observability initialized"
        );
    } else {
        tracing::debug!(service = %config.service_name, "subscriber already installed");
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for callers mapping their own level strings.
pub use tracing::Level;
