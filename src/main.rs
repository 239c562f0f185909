//! # extern-cli
//!
//! Opens a fragment stream session against a URL and prints the composed
//! page every time a fragment renders.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::Level;
use url::Url;

use extern_client::{Collaborators, ConnectionSupervisor, ExternConfig};
use extern_core::events::SessionEvent;
use extern_core::surface::MemorySurface;
use extern_telemetry::{init_telemetry, LogFormat, TelemetryConfig};

/// Stream and render a fragment page.
#[derive(Parser, Debug)]
#[command(name = "extern-cli", about = "Stream and render a fragment page")]
struct Cli {
    /// Page to stream.
    url: Url,

    /// JSON config file, merged over the defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base URL for assets (defaults to the page URL).
    #[arg(long)]
    cdn: Option<String>,

    /// Upper bound for a single asset download.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Log as JSON lines instead of compact text.
    #[arg(long)]
    json_logs: bool,

    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Exit after the first stream ends instead of reconnecting.
    #[arg(long)]
    once: bool,
}

impl Cli {
    fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            log_level: self.log_level,
            format: if self.json_logs { LogFormat::Json } else { LogFormat::Compact },
            ..Default::default()
        }
    }

    /// Flags win over the config file and the environment.
    fn apply(&self, config: &mut ExternConfig) {
        if let Some(cdn) = &self.cdn {
            config.cdn = Some(cdn.clone());
        }
        if let Some(ms) = self.timeout_ms {
            config.timeout_ms = ms;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let telemetry = init_telemetry(cli.telemetry());

    let mut config = ExternConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    cli.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let surface = MemorySurface::new();
    let parts = Collaborators::http(&config, Box::new(surface.clone()));
    let supervisor = ConnectionSupervisor::new(cli.url.clone(), ExternConfig { manual: true, ..config }, parts)
        .context("Failed to create session")?;
    let mut events = supervisor.subscribe();
    supervisor.open();
    tracing::info!(url = %cli.url, "session started");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Rendered { fragment, .. }) => {
                    println!("<!-- {fragment} -->\n{}", surface.html());
                }
                Ok(SessionEvent::Error { error }) => {
                    tracing::error!(kind = %error.kind, "{}", error.message);
                    if error.kind == "reconnect_exhausted" {
                        break;
                    }
                }
                Ok(SessionEvent::Done) if cli.once => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "event receiver lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    supervisor.destroy();
    if let Some(recent) = telemetry.recent() {
        if !recent.is_empty() {
            tracing::info!(warnings = recent.len(), "session finished with warnings");
        }
    }
    Ok(())
}
