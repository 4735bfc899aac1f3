//! Logger setup for binaries built on the crate.
//!
//! The library itself only logs through the `log` facade; this installs an
//! `env_logger` backend for it.

use std::sync::Once;

/// Filter used when neither the config nor `RUST_LOG` names one.
///
/// wgpu is chatty at `info`, so its crates are held to warnings.
pub const DEFAULT_FILTER: &str = "info,wgpu_core=warn,wgpu_hal=warn,naga=warn";

/// Logger configuration.
///
/// `env_filter` follows the `env_logger` filter syntax
/// (e.g. `"debug"` or `"xsthree=trace,wgpu=warn"`).
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub write_style: env_logger::WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            write_style: env_logger::WriteStyle::Auto,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    pub fn write_style(mut self, style: env_logger::WriteStyle) -> Self {
        self.write_style = style;
        self
    }

    /// The filter that will be applied: the configured one, else `RUST_LOG`,
    /// else [`DEFAULT_FILTER`].
    pub fn resolved_filter(&self) -> String {
        self.env_filter
            .clone()
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string())
    }
}

static INIT: Once = Once::new();

/// Install the global logger.
///
/// Only the first call has an effect; later calls are ignored. Call early in
/// `main`.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = config.resolved_filter();
        let mut builder = env_logger::Builder::new();
        builder.parse_filters(&filter);
        builder.write_style(config.write_style);

        // Another logger may already be installed (e.g. by a test harness).
        if builder.try_init().is_err() {
            log::debug!("a logger was already installed, keeping it");
            return;
        }
        log::debug!("logging initialized with `{filter}`");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filter_wins() {
        let config = LoggingConfig::new().filter("xsthree=trace");
        assert_eq!(config.resolved_filter(), "xsthree=trace");
    }

    #[test]
    fn init_is_idempotent() {
        init_logging(LoggingConfig::new().filter("warn"));
        init_logging(LoggingConfig::new().filter("trace"));
        log::warn!("still logging after a second init");
    }
}
