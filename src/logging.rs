//! Logging setup with optional daily-rotated file output
//!
//! Output goes to stderr, a rolling log file, or both. `RUST_LOG` directives
//! take precedence over the configured default level.

use crate::error::{Result, ValveSwitchError};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` does not say otherwise
    pub level: Level,

    /// Log to this file, rotated daily
    pub file_path: Option<PathBuf>,

    /// Log to stderr
    pub stderr: bool,

    /// Emit JSON lines instead of the human-readable format
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_path: None,
            stderr: true,
            json: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(rust_log) = std::env::var("RUST_LOG") {
            if rust_log.contains("trace") {
                config.level = Level::TRACE;
            } else if rust_log.contains("debug") {
                config.level = Level::DEBUG;
            } else if rust_log.contains("warn") {
                config.level = Level::WARN;
            } else if rust_log.contains("error") {
                config.level = Level::ERROR;
            }
        }

        if let Ok(log_file) = std::env::var("HMIP_LOG_FILE") {
            if !log_file.trim().is_empty() {
                config.file_path = Some(PathBuf::from(log_file));
            }
        }

        if let Ok(log_stderr) = std::env::var("HMIP_LOG_STDERR") {
            config.stderr = log_stderr.to_lowercase() != "false";
        }

        if let Ok(json) = std::env::var("HMIP_LOG_JSON") {
            config.json = matches!(json.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        config
    }
}

/// Initialize the global subscriber
pub fn init_logging(config: LogConfig) -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(config.level.into())
        .from_env_lossy();

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.stderr {
        let layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
        layers.push(if config.json {
            layer.json().boxed()
        } else {
            layer.with_ansi(true).boxed()
        });
    }

    if let Some(file_path) = &config.file_path {
        let directory = file_path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(directory)?;
        let file_name = file_path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("hmip-valve-switch.log"));
        let appender = tracing_appender::rolling::daily(directory, file_name);

        let layer = fmt::layer().with_writer(appender).with_ansi(false);
        layers.push(if config.json {
            layer.json().boxed()
        } else {
            layer.boxed()
        });
    }

    let subscriber = tracing_subscriber::registry().with(layers).with(env_filter);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| ValveSwitchError::internal(format!("logging already initialized: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        temp_env::with_vars_unset(
            ["RUST_LOG", "HMIP_LOG_FILE", "HMIP_LOG_STDERR", "HMIP_LOG_JSON"],
            || {
                let config = LogConfig::from_env();
                assert_eq!(config.level, Level::INFO);
                assert!(config.file_path.is_none());
                assert!(config.stderr);
                assert!(!config.json);
            },
        );
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        temp_env::with_vars(
            [
                ("RUST_LOG", Some("hmip_valve_switch=debug")),
                ("HMIP_LOG_FILE", Some("/var/log/hmip/switch.log")),
                ("HMIP_LOG_STDERR", Some("FALSE")),
                ("HMIP_LOG_JSON", Some("1")),
            ],
            || {
                let config = LogConfig::from_env();
                assert_eq!(config.level, Level::DEBUG);
                assert_eq!(
                    config.file_path,
                    Some(PathBuf::from("/var/log/hmip/switch.log"))
                );
                assert!(!config.stderr);
                assert!(config.json);
            },
        );
    }
}
