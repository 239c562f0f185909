mod logging;

pub use logging::{LogQuery, LogRecord, RecentLogLayer, RecentLogs};

use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Output format of the stdout layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "extern_engine" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    pub format: LogFormat,
    /// How many warn+ records to keep in memory; 0 disables retention.
    pub recent_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            format: LogFormat::Compact,
            recent_capacity: 256,
        }
    }
}

impl TelemetryConfig {
    /// The filter directive string built from the configured levels.
    pub fn filter_directives(&self) -> String {
        let mut filter_str = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter_str
    }
}

/// Handle returned by [`init_telemetry`].
pub struct TelemetryGuard {
    recent: Option<Arc<RecentLogs>>,
}

impl TelemetryGuard {
    /// Access the retained warn+ records.
    pub fn recent(&self) -> Option<&RecentLogs> {
        self.recent.as_deref()
    }
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let recent = (config.recent_capacity > 0).then(|| Arc::new(RecentLogs::new(config.recent_capacity)));
    let recent_layer = recent.clone().map(RecentLogLayer::new);

    let result = tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .with(recent_layer)
        .try_init();
    if let Err(e) = result {
        eprintln!("extern-telemetry: subscriber already installed: {e}");
    }

    TelemetryGuard { recent }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_directives_include_module_levels() {
        let config = TelemetryConfig {
            log_level: Level::WARN,
            module_levels: vec![("extern_engine".into(), Level::DEBUG)],
            ..Default::default()
        };
        assert_eq!(config.filter_directives(), "warn,extern_engine=debug");
    }

    #[test]
    fn defaults() {
        let config = TelemetryConfig::default();
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.recent_capacity, 256);
    }
}
