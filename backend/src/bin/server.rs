//! Nightscout analysis HTTP server.
//!
//! Loads configuration, builds the event source and serves the REST API.
//!
//! # Usage
//!
//! ```bash
//! # Serve an exported Nightscout site from disk
//! NIGHTSCOUT_EXPORT_DIR=./export NIGHTSCOUT_URL=https://my.nightscout.example \
//!   cargo run --bin nightscout-server
//! ```
//!
//! # Environment Variables
//!
//! - `NIGHTSCOUT_CONFIG`: Path to a TOML config file (default: search for `nightscout.toml`)
//! - `NIGHTSCOUT_URL`: Source URL the export belongs to
//! - `NIGHTSCOUT_EXPORT_DIR`: Directory with `entries.json`, `treatments.json`, `profile.json`
//! - `LOCALZONE_NAME`: Default analysis time zone
//! - `HOST`: Server host (default: 0.0.0.0)
//! - `PORT`: Server port (default: 8080)
//! - `RUST_LOG`: Log level (default: info)

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use nightscout_dash::config::AnalysisConfig;
use nightscout_dash::http::{create_router, AppState};
use nightscout_dash::source::{EventSource, LocalSource};

fn load_config() -> anyhow::Result<AnalysisConfig> {
    let mut config = match env::var("NIGHTSCOUT_CONFIG") {
        Ok(path) => AnalysisConfig::from_file(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        Err(_) => AnalysisConfig::from_default_location().unwrap_or_else(|e| {
            warn!("{}; using defaults", e);
            AnalysisConfig::default()
        }),
    };
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(
            env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Level::INFO),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting Nightscout analysis server");

    let config = load_config()?;
    info!(
        "Default time zone {}, default range {} days",
        config.analysis.timezone, config.analysis.default_days
    );

    let source = LocalSource::new();
    match (&config.source.export_dir, config.source_identity()?) {
        (Some(dir), Some(identity)) => {
            source
                .load_export_dir(identity.clone(), dir)
                .with_context(|| format!("loading export directory {}", dir.display()))?;
            info!("Loaded export {} as {}", dir.display(), identity);
        }
        (Some(_), None) => warn!("export_dir is set but no source url; nothing loaded"),
        _ => warn!("No export directory configured; sessions will find no data"),
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = AppState::new(config, Arc::new(source) as Arc<dyn EventSource>);
    let app = create_router(state);

    info!("Server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
