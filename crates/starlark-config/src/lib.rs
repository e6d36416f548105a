//! Configuration for the Starlark debug adapter.
//!
//! The adapter reads an optional TOML file with two sections: `[logging]`
//! controls the global `tracing` subscriber and `[debug_server]` supplies
//! default connection settings that `launch`/`attach` arguments override.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Once},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::{
    fmt::writer::{BoxMakeWriter, MakeWriterExt},
    layer::SubscriberExt,
    Layer,
};

/// Default TCP port of the Starlark debug server.
pub const DEFAULT_DEBUG_SERVER_PORT: u16 = 7300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub debug_server: DebugServerConfig,
}

impl BridgeConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Either a plain level (`info`, `debug`, ...) or `EnvFilter` directives.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs in JSON format.
    #[serde(default)]
    pub json: bool,

    /// Write logs to stderr. Stdout is reserved for DAP traffic.
    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to the given file path.
    ///
    /// If the file cannot be opened, file logging is disabled while stderr
    /// logging stays active.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            "off" | "none" => "off".to_owned(),
            _ => trimmed.to_owned(),
        }
    }

    /// Force `debug` logging, as requested by `--verbose`.
    pub fn set_verbose(&mut self) {
        self.level = "debug".to_owned();
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// The effective filter: the configured level with `RUST_LOG` merged on top.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let config_directives = Self::normalize_level_directives(&self.level);

        match env_directives {
            Some(env_directives) => {
                let combined = format!("{config_directives},{env_directives}");
                tracing_subscriber::EnvFilter::try_new(combined)
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                    .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }

    fn make_writer(&self) -> (BoxMakeWriter, Option<std::io::Error>) {
        let mut writer: Option<BoxMakeWriter> = None;
        if self.stderr {
            // `TestWriter` keeps `cargo test` output capture working in debug builds.
            writer = Some(if cfg!(debug_assertions) {
                BoxMakeWriter::new(tracing_subscriber::fmt::writer::TestWriter::with_stderr)
            } else {
                BoxMakeWriter::new(std::io::stderr)
            });
        }

        let mut file_error = None;
        if let Some(path) = &self.file {
            match std::fs::OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => {
                    let file = Arc::new(file);
                    writer = Some(match writer {
                        Some(writer) => BoxMakeWriter::new(writer.and(file)),
                        None => BoxMakeWriter::new(file),
                    });
                }
                Err(err) => file_error = Some(err),
            }
        }

        (
            writer.unwrap_or_else(|| BoxMakeWriter::new(std::io::sink)),
            file_error,
        )
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DebugServerConfig {
    #[serde(default = "DebugServerConfig::default_host")]
    pub host: String,
    #[serde(default = "DebugServerConfig::default_port")]
    pub port: u16,
    /// Total connection attempts before `launch` fails.
    #[serde(default = "DebugServerConfig::default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "DebugServerConfig::default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl DebugServerConfig {
    fn default_host() -> String {
        "localhost".to_owned()
    }

    fn default_port() -> u16 {
        DEFAULT_DEBUG_SERVER_PORT
    }

    fn default_connect_attempts() -> u32 {
        5
    }

    fn default_retry_delay_ms() -> u64 {
        1_000
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for DebugServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            connect_attempts: Self::default_connect_attempts(),
            retry_delay_ms: Self::default_retry_delay_ms(),
        }
    }
}

static TRACING_INIT: Once = Once::new();

/// Installs the global `tracing` subscriber.
///
/// Safe to call multiple times; only the first call has an effect.
pub fn init_tracing(logging: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let filter = logging.env_filter();
        let (make_writer, file_error) = logging.make_writer();

        let layer: Box<dyn Layer<_> + Send + Sync> = if logging.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        };

        let subscriber = tracing_subscriber::registry().with(filter).with(layer);
        if tracing::subscriber::set_global_default(subscriber).is_ok() {
            if let (Some(path), Some(err)) = (logging.file.as_ref(), file_error) {
                tracing::warn!(
                    target: "starlark.config",
                    path = %path.display(),
                    error = %err,
                    "failed to open log file; file logging disabled"
                );
            }
        }
    });
}

pub fn init_tracing_with_config(config: &BridgeConfig) {
    init_tracing(&config.logging)
}
