//! Browser process launch with a fixed anti-detection configuration.
//!
//! The launch flag set is static: every browser this service starts gets the
//! same evasion profile. Humanized input pacing lives in the input module; this
//! module only covers process discovery and startup.

use std::path::PathBuf;

use chromiumoxide::{browser::BrowserConfig, Browser};
use futures::StreamExt;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use super::BrowserError;

/// How long a single CDP request may take before the connection gives up.
const CDP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Launch options for the shared browser instance.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOptions {
    /// Path to Chrome/Chromium executable; auto-detected when unset
    pub chrome_path: Option<String>,
    /// Run without a visible window
    pub headless: bool,
    /// Window width
    pub window_width: u32,
    /// Window height
    pub window_height: u32,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            window_width: 1920,
            window_height: 1080,
        }
    }
}

/// Find a Chrome/Chromium executable on the system
pub fn find_chromium() -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = if cfg!(target_os = "windows") {
        let mut paths = vec![
            PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
            PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        ];
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            paths.push(PathBuf::from(format!(
                r"{}\Google\Chrome\Application\chrome.exe",
                local
            )));
        }
        paths
    } else if cfg!(target_os = "macos") {
        vec![PathBuf::from(
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        )]
    } else {
        vec![
            PathBuf::from("/usr/bin/chromium"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/google-chrome-stable"),
        ]
    };

    candidates.into_iter().find(|p| p.exists())
}

/// Launch the browser with the fixed evasion flag set and spawn its CDP event
/// handler task. The handler task ends when the browser disconnects.
pub async fn launch_stealth_browser(options: &LaunchOptions) -> Result<Browser, BrowserError> {
    if options.chrome_path.is_none() && find_chromium().is_none() {
        return Err(BrowserError::LaunchFailed(
            "Chrome/Chromium not found. Install Chromium and restart the server.".to_string(),
        ));
    }

    let mut builder = BrowserConfig::builder();

    // chromiumoxide runs headless by default; with_head() shows the window
    if !options.headless {
        builder = builder.with_head();
    }

    if let Some(ref path) = options.chrome_path {
        builder = builder.chrome_executable(path);
    } else if let Some(path) = find_chromium() {
        info!("Auto-detected Chromium at: {}", path.display());
        builder = builder.chrome_executable(path);
    }

    // =========== STEALTH FLAGS ===========
    // Anti-detection (undetected-chromedriver style): hide the automation
    // surface at the engine level, suppress first-run and restore prompts.
    builder = builder
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-session-crashed-bubble")
        .arg("--disable-restore-session-state")
        .arg("--disable-notifications")
        .arg("--disable-component-update")
        .arg("--disable-domain-reliability")
        .arg("--disable-site-isolation-trials")
        // Required when running as root (e.g. in Docker or on a VPS)
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--window-position=50,50");

    builder = builder
        .viewport(chromiumoxide::handler::viewport::Viewport {
            width: options.window_width,
            height: options.window_height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .request_timeout(CDP_REQUEST_TIMEOUT);

    let config = builder
        .build()
        .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

    let (browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

    // Drive CDP events in the background; when this loop ends the browser
    // process has disconnected or crashed.
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            debug!("browser event: {:?}", event);
        }
        warn!("browser disconnected (event handler ended)");
    });

    info!(
        "Browser launched (headless: {}, window: {}x{})",
        options.headless, options.window_width, options.window_height
    );

    Ok(browser)
}

/// Validate a URL before attempting navigation: it must parse and use an
/// http(s) scheme.
pub fn validate_url(url: &str) -> Result<(), BrowserError> {
    if url.is_empty() {
        return Err(BrowserError::NavigationFailed(
            "URL cannot be empty".to_string(),
        ));
    }

    let parsed = url::Url::parse(url)
        .map_err(|e| BrowserError::NavigationFailed(format!("invalid URL '{}': {}", url, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(BrowserError::NavigationFailed(format!(
            "unsupported URL scheme '{}', only http/https allowed",
            scheme
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_launch_options() {
        let options = LaunchOptions::default();
        assert!(options.headless);
        assert!(options.chrome_path.is_none());
        assert_eq!(options.window_width, 1920);
        assert_eq!(options.window_height, 1080);
    }

    #[test]
    fn test_validate_url_valid() {
        assert!(validate_url("https://example.com").is_ok());
        assert!(validate_url("http://localhost:8080/path?q=1").is_ok());
    }

    #[test]
    fn test_validate_url_empty() {
        assert!(validate_url("").is_err());
    }

    #[test]
    fn test_validate_url_invalid_scheme() {
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("file:///etc/passwd").is_err());
        assert!(validate_url("javascript:alert(1)").is_err());
    }

    #[test]
    fn test_validate_url_malformed() {
        assert!(validate_url("not a url").is_err());
        assert!(validate_url("://missing.scheme").is_err());
    }

    #[test]
    fn test_find_chromium_does_not_panic() {
        // Result depends on the host; just exercise the candidate probing
        let _ = find_chromium();
    }
}
