// Logging setup.
//
// Events go to a daily-rolling JSON file under `log_dir` only. Nothing is
// written to stdout so log lines never interleave with the REPL output.

use crate::config::AppConfig;
use crate::utils::ensure_dir;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE_PREFIX: &str = "tea-dashboard.log";

/// Install the global subscriber.
///
/// The returned guard flushes the background writer on drop and must be held
/// for the life of the process. `None` means file logging is not active:
/// either the directory could not be created (warnings then go to stderr)
/// or a subscriber was already installed.
pub fn init(config: &AppConfig) -> Option<WorkerGuard> {
    if let Err(e) = ensure_dir(Path::new(&config.log_dir)) {
        eprintln!("Warning: could not create log directory {}: {:#}", config.log_dir, e);
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::new("warn"))
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(build_filter(&config.log_level))
        .with(fmt::layer().json().with_writer(writer).with_ansi(false))
        .try_init()
        .ok()
        .map(|_| guard)
}

/// `RUST_LOG` wins over the configured level; an unparsable level means `info`.
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_log_dir() {
        let tmp = TempDir::new().unwrap();
        let log_dir = tmp.path().join("logs");
        let config = AppConfig {
            log_dir: log_dir.display().to_string(),
            ..AppConfig::default()
        };

        let guard = init(&config);
        assert!(log_dir.is_dir());
        assert!(guard.is_some());

        tracing::info!("logger smoke test");
        drop(guard);
    }
}
