//! Shared configuration for the rebind host daemon and its clients.
//!
//! Values are layered by [`ortho_config`]: built-in defaults, then a TOML
//! file (`--config-path` or `REBIND_CONFIG_PATH`), then `REBIND_*`
//! environment variables, then command-line flags.

mod defaults;
mod logging;

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_HOST_PROCESS, DEFAULT_INSTALL_TIMEOUT_MS, DEFAULT_LOG_FILTER, default_host_process,
    default_install_timeout_ms, default_log_filter, default_log_filter_string,
    default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved configuration for the host daemon.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "REBIND")]
pub struct Config {
    /// `tracing` filter expression applied to the daemon's subscriber.
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Output format for structured logs.
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
    /// Upper bound, in milliseconds, for the install rendezvous with the
    /// registry's main context.
    #[ortho_config(default = defaults::DEFAULT_INSTALL_TIMEOUT_MS)]
    pub install_timeout_ms: u64,
    /// Logical process slot the daemon hosts components for.
    #[ortho_config(default = defaults::default_host_process())]
    pub host_process: String,
    /// Optional JSON catalogue describing the components this host can run.
    pub catalog_path: Option<Utf8PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            install_timeout_ms: DEFAULT_INSTALL_TIMEOUT_MS,
            host_process: default_host_process(),
            catalog_path: None,
        }
    }
}

impl Config {
    /// Loads configuration and rejects semantically invalid values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigLoadError::Load`] when any layer fails to parse and
    /// [`ConfigLoadError::Invalid`] when the merged values are unusable.
    pub fn load_validated() -> Result<Self, ConfigLoadError> {
        let config = Self::load().map_err(ConfigLoadError::Load)?;
        config.validate().map_err(ConfigLoadError::Invalid)?;
        Ok(config)
    }

    /// Filter expression for the tracing subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Selected log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Install rendezvous timeout as a [`Duration`].
    #[must_use]
    pub const fn install_timeout(&self) -> Duration {
        Duration::from_millis(self.install_timeout_ms)
    }

    /// Configured host process slot, unparsed.
    #[must_use]
    pub fn host_process(&self) -> &str {
        self.host_process.as_str()
    }

    /// Path to the component catalogue, when configured.
    #[must_use]
    pub fn catalog_path(&self) -> Option<&camino::Utf8Path> {
        self.catalog_path.as_deref()
    }

    /// Rejects values that load cleanly but cannot drive a host.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigValidationError`] when the install timeout is zero or
    /// the host process slot is blank.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.install_timeout_ms == 0 {
            return Err(ConfigValidationError::ZeroInstallTimeout);
        }
        if self.host_process.trim().is_empty() {
            return Err(ConfigValidationError::BlankHostProcess);
        }
        Ok(())
    }
}

/// Semantic problems found after configuration layers merged successfully.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// A zero timeout would fail every install immediately.
    #[error("install_timeout_ms must be greater than zero")]
    ZeroInstallTimeout,
    /// The host process slot was empty.
    #[error("host_process must not be blank")]
    BlankHostProcess,
}

/// Failure to produce a usable [`Config`].
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    /// A configuration layer could not be read or parsed.
    #[error("failed to load configuration: {0}")]
    Load(#[source] Arc<OrthoError>),
    /// The merged configuration failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(#[source] ConfigValidationError),
}
