use tracing::Subscriber;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    config::LoggerConfig,
    error::{LoggerError, LoggerResult},
    format::LoggerFormat,
    rfc3339::LoggerRfc3339,
};

/// Install the global subscriber for the configured format.
pub fn init_logger(cfg: &LoggerConfig) -> LoggerResult<()> {
    match cfg.format {
        LoggerFormat::Text => init_text(cfg),
        LoggerFormat::Json => init_json(cfg),
        LoggerFormat::Journald => init_journald(cfg),
    }
}

fn init_text(cfg: &LoggerConfig) -> LoggerResult<()> {
    let filter = cfg.level.to_env_filter();
    let fmt_layer = fmt::layer()
        .with_ansi(cfg.should_use_color())
        .with_target(cfg.with_targets)
        .with_timer(LoggerRfc3339);

    init_subscriber(tracing_subscriber::registry().with(filter).with(fmt_layer))
}

fn init_json(cfg: &LoggerConfig) -> LoggerResult<()> {
    let filter = cfg.level.to_env_filter();
    let fmt_layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_target(cfg.with_targets)
        .with_timer(LoggerRfc3339);

    init_subscriber(tracing_subscriber::registry().with(filter).with(fmt_layer))
}

#[cfg(target_os = "linux")]
fn init_journald(cfg: &LoggerConfig) -> LoggerResult<()> {
    let filter = cfg.level.to_env_filter();
    let journald =
        tracing_journald::layer().map_err(|e| LoggerError::JournaldInitFailed(e.to_string()))?;

    init_subscriber(tracing_subscriber::registry().with(filter).with(journald))
}

#[cfg(not(target_os = "linux"))]
fn init_journald(_cfg: &LoggerConfig) -> LoggerResult<()> {
    Err(LoggerError::JournaldNotSupported)
}

fn init_subscriber<S>(subscriber: S) -> LoggerResult<()>
where
    S: Subscriber + Send + Sync + 'static,
{
    subscriber
        .try_init()
        .map_err(|_| LoggerError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use crate::LoggerConfig;

    #[test]
    fn filter_builds_from_valid_config() {
        let config = LoggerConfig {
            level: "ember_core=debug,info".parse().unwrap(),
            ..Default::default()
        };
        let _ = config.level.to_env_filter();
    }

    #[cfg(not(target_os = "linux"))]
    #[test]
    fn journald_errors_off_linux() {
        let config = LoggerConfig {
            format: crate::LoggerFormat::Journald,
            ..Default::default()
        };
        assert!(super::init_journald(&config).is_err());
    }
}
