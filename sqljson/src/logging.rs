use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, EnvFilter};

use crate::{SqlJsonError, SqlJsonResult};

/// Install a global fmt subscriber filtered by `filter` (`"info"`,
/// `"sqljson=debug"`, ...).
pub fn init_logging(filter: &str) -> SqlJsonResult<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(filter)
                .map_err(|e| SqlJsonError::Config(format!("Invalid log filter: {e}")))?,
        )
        .with_target(true)
        .try_init()
        .map_err(|_| SqlJsonError::Config("Logging already initialized".into()))
}

/// Level of a diagnostic event, as written in schemas and config files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[serde(alias = "TRACE", alias = "Trace")]
    Trace,
    #[serde(alias = "DEBUG", alias = "Debug")]
    Debug,
    #[serde(alias = "INFO", alias = "Info")]
    Info,
    #[serde(alias = "WARN", alias = "Warn")]
    Warn,
    #[serde(alias = "ERROR", alias = "Error")]
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Debug
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Emit a `tracing` event at a level only known at runtime.
macro_rules! event_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            $crate::logging::LogLevel::Trace => ::tracing::trace!($($arg)+),
            $crate::logging::LogLevel::Debug => ::tracing::debug!($($arg)+),
            $crate::logging::LogLevel::Info => ::tracing::info!($($arg)+),
            $crate::logging::LogLevel::Warn => ::tracing::warn!($($arg)+),
            $crate::logging::LogLevel::Error => ::tracing::error!($($arg)+),
        }
    };
}

pub(crate) use event_at;
