//! Veiltab - Stealth Browser Automation REST Server
//!
//! Environment variables:
//! - `VEILTAB_PORT` - Server port (default: 9377, or the configured value)
//! - `RUST_LOG` - Log filter (default: info)

use std::sync::Arc;

use tracing::info;

use veiltab::{web, AppState, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = veiltab::init_logging();

    info!("Starting Veiltab REST server");

    if let Some(dir) = veiltab::log_dir() {
        info!("Log files saved to: {}", dir.display());
    }

    let mut config = ServerConfig::load();

    // Port override from environment
    if let Some(port) = std::env::var("VEILTAB_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
    {
        config.port = port;
    }

    // Headless handling: with a display (Xvfb or real) a visible window is
    // fine; without one the browser must run headless.
    let has_display = std::env::var("DISPLAY")
        .map(|d| !d.is_empty())
        .unwrap_or(false);
    if !has_display && !config.launch.headless {
        info!("No DISPLAY available - forcing headless mode");
        config.launch.headless = true;
        config.save();
    }

    let port = config.port;
    let state = Arc::new(AppState::new(&config));

    info!("Address: http://0.0.0.0:{}", port);
    info!("Endpoints:");
    info!("  GET  /health                           - Health check");
    info!("  POST /tabs                             - Create tab");
    info!("  GET  /tabs/:id/snapshot                - Get accessibility tree");
    info!("  POST /tabs/:id/click                   - Click element");
    info!("  POST /tabs/:id/type                    - Type text");
    info!("  POST /tabs/:id/navigate                - Navigate to URL");
    info!("  GET  /tabs/:id/screenshot              - Take screenshot");
    info!("  GET  /sessions/:session_key/active-tab - Get active tab for session");

    // Serve until a shutdown signal arrives, then tear the browser down once
    web::start_server(state.clone(), port).await?;
    state.registry.cleanup().await;

    info!("Veiltab stopped");
    Ok(())
}
