//! Veiltab
//!
//! A REST façade over a stealth browser-automation engine: create tabs, drive
//! navigation, snapshot the accessibility tree, and click/type against
//! elements resolved from it.

pub mod browser;
pub mod web;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use browser::{LaunchOptions, TabRegistry};

/// Server configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port the REST API binds to (all interfaces)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Browser launch options
    #[serde(default)]
    pub launch: LaunchOptions,
}

fn default_port() -> u16 {
    9377
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            launch: LaunchOptions::default(),
        }
    }
}

/// Get log directory path (shared across modules)
pub fn log_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("veiltab").join("logs"))
}

impl ServerConfig {
    /// Get config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("veiltab").join("config.json"))
    }

    /// Load config from file, falling back to defaults
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(content) => match serde_json::from_str(&content) {
                        Ok(config) => {
                            info!("Loaded config from {:?}", path);
                            return config;
                        }
                        Err(e) => {
                            warn!("Failed to parse config file: {}", e);
                        }
                    },
                    Err(e) => {
                        warn!("Failed to read config file: {}", e);
                    }
                }
            }
        }
        Self::default()
    }

    /// Save config to file
    pub fn save(&self) {
        if let Some(path) = Self::config_path() {
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    error!("Failed to create config directory: {}", e);
                    return;
                }
            }

            match serde_json::to_string_pretty(self) {
                Ok(content) => {
                    if let Err(e) = std::fs::write(&path, content) {
                        error!("Failed to save config: {}", e);
                    } else {
                        info!("Config saved to {:?}", path);
                    }
                }
                Err(e) => {
                    error!("Failed to serialize config: {}", e);
                }
            }
        }
    }
}

/// Application state shared across request handlers
pub struct AppState {
    /// Tab registry owning the shared browser instance
    pub registry: Arc<TabRegistry>,
}

impl AppState {
    /// Create application state from the given configuration
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            registry: Arc::new(TabRegistry::new(config.launch.clone())),
        }
    }
}

/// Initialize logging: console layer plus a daily-rolling file layer when a
/// log directory is available. The returned guard must be held for the file
/// writer to flush.
pub fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    if let Some(log_dir) = log_dir() {
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "veiltab.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}
