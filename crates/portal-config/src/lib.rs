//! Configuration, filesystem layout, and logging setup for Member Portal binaries.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_API_BASE_URL, DEFAULT_LOG_LEVEL, DEFAULT_MANAGEMENT_KEYWORD,
    DEFAULT_REFRESH_IMMEDIATE_SECS, DEFAULT_REFRESH_MARGIN_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
