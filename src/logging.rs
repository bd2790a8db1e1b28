//! Diagnostic logging. Test output never goes through here; it goes to a
//! [`crate::sink::LineSink`].

use tracing::Level;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "GOTEST_RELAY_LOG";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Filter directive for `level`, unless `GOTEST_RELAY_LOG` says otherwise.
pub fn filter_directive(level: LogLevel) -> String {
    match std::env::var(LOG_ENV) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().to_owned(),
        _ => format!("gotest_relay={}", level.to_tracing_level()),
    }
}

/// Installs a compact stderr subscriber. Safe to call more than once; only the
/// first call wins.
pub fn init_logging(level: LogLevel) {
    let filter = EnvFilter::try_new(filter_directive(level))
        .unwrap_or_else(|_| EnvFilter::new(format!("gotest_relay={}", level.to_tracing_level())));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
