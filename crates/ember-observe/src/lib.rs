//! Logging bootstrap for the runner daemon.
//!
//! One call to [`init_logger`] installs a global `tracing` subscriber in
//! the configured format: human text, structured JSON, or journald.

mod config;
pub use config::LoggerConfig;

mod error;
pub use error::{LoggerError, LoggerResult};

mod format;
pub use format::LoggerFormat;

mod init;
pub use init::init_logger;

mod level;
pub use level::LoggerLevel;

mod rfc3339;
pub use rfc3339::LoggerRfc3339;
