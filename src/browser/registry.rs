//! Session/tab registry owning the shared browser instance.
//!
//! One browser process serves every tab. Browser creation and tab creation
//! serialize through a single creation lock so concurrent callers cannot race
//! two browser launches or create a tab mid-teardown. Per-tab operations are
//! deliberately not locked against each other.

use std::collections::HashMap;
use std::sync::Arc;

use chromiumoxide::{
    cdp::browser_protocol::{accessibility::GetFullAxTreeParams, page::CaptureScreenshotFormat},
    page::ScreenshotParams,
    Browser, Page,
};
use tokio::sync::{Mutex, RwLock};
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

use super::{
    input,
    launcher::{launch_stealth_browser, validate_url, LaunchOptions},
    snapshot::{build_raw_tree, project, AccessibilityNode},
    tab::{selector_text, TabState},
    BrowserError,
};

/// Upper bound for a navigation to reach its loaded state.
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound for a single click or type action.
const ACTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Registry of browser tabs and the sessions that created them.
pub struct TabRegistry {
    launch_options: LaunchOptions,
    /// Serializes browser creation and tab creation
    creation_lock: Mutex<()>,
    /// The shared browser instance, launched on first use
    browser: RwLock<Option<Browser>>,
    /// All live tabs by ID
    tabs: RwLock<HashMap<String, Arc<TabState>>>,
    /// Latest tab created per session key ("latest wins", not a set)
    session_tabs: RwLock<HashMap<String, String>>,
}

impl TabRegistry {
    /// Create an empty registry; no browser is launched until the first tab.
    pub fn new(launch_options: LaunchOptions) -> Self {
        Self {
            launch_options,
            creation_lock: Mutex::new(()),
            browser: RwLock::new(None),
            tabs: RwLock::new(HashMap::new()),
            session_tabs: RwLock::new(HashMap::new()),
        }
    }

    /// Whether the shared browser has been launched yet.
    pub async fn browser_started(&self) -> bool {
        self.browser.read().await.is_some()
    }

    /// Lazy browser launch. Must be called with the creation lock held so two
    /// callers cannot launch twice.
    async fn ensure_browser(&self) -> Result<(), BrowserError> {
        if self.browser.read().await.is_some() {
            return Ok(());
        }

        let browser = launch_stealth_browser(&self.launch_options).await?;
        *self.browser.write().await = Some(browser);
        Ok(())
    }

    /// Create a new tab, navigate it and remember it as the session's latest.
    pub async fn create_tab(
        &self,
        session_key: &str,
        url: &str,
    ) -> Result<Arc<TabState>, BrowserError> {
        validate_url(url)?;

        let _creating = self.creation_lock.lock().await;
        self.ensure_browser().await?;

        let page = {
            let browser = self.browser.read().await;
            let browser = browser
                .as_ref()
                .ok_or_else(|| BrowserError::LaunchFailed("browser not running".to_string()))?;
            browser
                .new_page("about:blank")
                .await
                .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?
        };

        if let Err(e) = navigate_page(&page, url).await {
            // Don't leak the half-created page
            if let Err(close_err) = page.clone().close().await {
                warn!("Failed to close page after navigation error: {}", close_err);
            }
            return Err(e);
        }

        let tab = Arc::new(TabState::new(page, url.to_string()));
        let tab_id = tab.id.clone();

        self.tabs.write().await.insert(tab_id.clone(), tab.clone());
        self.record_session(session_key, &tab_id).await;

        info!("Tab created: {} -> {}", tab_id, url);
        Ok(tab)
    }

    async fn record_session(&self, session_key: &str, tab_id: &str) {
        self.session_tabs
            .write()
            .await
            .insert(session_key.to_string(), tab_id.to_string());
    }

    /// Get a tab by ID, listing the known IDs when it is absent.
    pub async fn get_tab(&self, tab_id: &str) -> Result<Arc<TabState>, BrowserError> {
        let tabs = self.tabs.read().await;
        tabs.get(tab_id).cloned().ok_or_else(|| {
            let mut known: Vec<String> = tabs.keys().cloned().collect();
            known.sort_unstable();
            BrowserError::TabNotFound {
                tab_id: tab_id.to_string(),
                known,
            }
        })
    }

    /// Latest tab ID created under the given session key, if any.
    pub async fn get_active_tab_for_session(&self, session_key: &str) -> Option<String> {
        self.session_tabs.read().await.get(session_key).cloned()
    }

    /// Navigate an existing tab. Every element reference handed out for the
    /// previous page becomes invalid.
    pub async fn navigate(&self, tab_id: &str, url: &str) -> Result<(), BrowserError> {
        validate_url(url)?;

        let tab = self.get_tab(tab_id).await?;
        navigate_page(tab.page(), url).await?;
        tab.record_navigation(url).await;

        info!("Tab {} navigated to {}", tab_id, url);
        Ok(())
    }

    /// Extract the projected accessibility tree for a tab, assigning element
    /// references to interactive nodes as a side effect.
    pub async fn snapshot(&self, tab_id: &str) -> Result<AccessibilityNode, BrowserError> {
        let tab = self.get_tab(tab_id).await?;

        let resp = tab
            .page()
            .execute(GetFullAxTreeParams::builder().build())
            .await
            .map_err(|e| BrowserError::SnapshotFailed(e.to_string()))?;

        let raw = build_raw_tree(&resp.result.nodes)
            .ok_or_else(|| BrowserError::SnapshotFailed("empty accessibility tree".to_string()))?;

        let mut elements = tab.elements.write().await;
        let tree = project(&raw, &mut elements);

        info!(
            "Snapshot for tab {}: {} refs assigned so far",
            tab_id,
            elements.ref_count()
        );
        Ok(tree)
    }

    /// Click the element a reference resolves to.
    pub async fn click(&self, tab_id: &str, element_ref: &str) -> Result<(), BrowserError> {
        let tab = self.get_tab(tab_id).await?;
        let selector = tab.resolve_ref(element_ref).await?;
        let text = selector_text(&selector).ok_or_else(|| {
            BrowserError::ActionFailed(format!("malformed selector: {}", selector))
        })?;

        match timeout(ACTION_TIMEOUT, input::click_text(tab.page(), text)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(BrowserError::ActionFailed(format!(
                    "click timed out after {}s",
                    ACTION_TIMEOUT.as_secs()
                )))
            }
        }

        info!("Clicked element: {} ({})", element_ref, selector);
        Ok(())
    }

    /// Type text into the element a reference resolves to.
    pub async fn type_text(
        &self,
        tab_id: &str,
        element_ref: &str,
        text: &str,
    ) -> Result<(), BrowserError> {
        let tab = self.get_tab(tab_id).await?;
        let selector = tab.resolve_ref(element_ref).await?;
        let needle = selector_text(&selector).ok_or_else(|| {
            BrowserError::ActionFailed(format!("malformed selector: {}", selector))
        })?;

        match timeout(ACTION_TIMEOUT, input::type_into_text(tab.page(), needle, text)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(BrowserError::ActionFailed(format!(
                    "type timed out after {}s",
                    ACTION_TIMEOUT.as_secs()
                )))
            }
        }

        info!("Typed into element: {} ({})", element_ref, selector);
        Ok(())
    }

    /// Capture the tab's current viewport as PNG bytes.
    pub async fn screenshot(&self, tab_id: &str) -> Result<Vec<u8>, BrowserError> {
        let tab = self.get_tab(tab_id).await?;

        let bytes = tab
            .page()
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
            )
            .await
            .map_err(|e| BrowserError::ScreenshotFailed(e.to_string()))?;

        info!("Screenshot taken for tab {}: {} bytes", tab_id, bytes.len());
        Ok(bytes)
    }

    /// Close every tracked page and tear down the browser. Individual close
    /// failures are logged and swallowed; shutdown proceeds regardless.
    /// Safe to call more than once.
    pub async fn cleanup(&self) {
        info!("Cleaning up browser resources");

        // Hold the creation lock so no tab can be created mid-teardown
        let _creating = self.creation_lock.lock().await;

        let tabs: Vec<(String, Arc<TabState>)> = self.tabs.write().await.drain().collect();
        for (tab_id, tab) in tabs {
            if let Err(e) = tab.page().clone().close().await {
                warn!("Failed to close tab {}: {}", tab_id, e);
            }
        }
        self.session_tabs.write().await.clear();

        if let Some(mut browser) = self.browser.write().await.take() {
            if let Err(e) = browser.close().await {
                warn!("Browser close failed: {}", e);
            }
            // Brief grace period, then make sure the process is really gone
            tokio::time::sleep(Duration::from_millis(500)).await;
            let _ = browser.kill().await;
        }

        info!("Cleanup complete");
    }
}

/// Navigate a page and wait for its content to load, bounded by the fixed
/// navigation timeout.
async fn navigate_page(page: &Page, url: &str) -> Result<(), BrowserError> {
    let nav = async {
        page.goto(url).await?;
        page.wait_for_navigation().await?;
        Ok::<(), chromiumoxide::error::CdpError>(())
    };

    match timeout(NAVIGATION_TIMEOUT, nav).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(BrowserError::NavigationFailed(e.to_string())),
        Err(_) => Err(BrowserError::NavigationFailed(format!(
            "timed out after {}s loading {}",
            NAVIGATION_TIMEOUT.as_secs(),
            url
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TabRegistry {
        TabRegistry::new(LaunchOptions::default())
    }

    #[tokio::test]
    async fn test_browser_not_started_initially() {
        assert!(!registry().browser_started().await);
    }

    #[tokio::test]
    async fn test_unknown_tab_lists_known_ids() {
        let registry = registry();
        let err = registry.get_tab("tab-missing").await.unwrap_err();
        match err {
            BrowserError::TabNotFound { tab_id, known } => {
                assert_eq!(tab_id, "tab-missing");
                assert!(known.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_session_has_no_active_tab() {
        assert_eq!(registry().get_active_tab_for_session("nope").await, None);
    }

    #[tokio::test]
    async fn test_session_mapping_latest_wins() {
        let registry = registry();
        registry.record_session("sess", "tab-1").await;
        registry.record_session("sess", "tab-2").await;
        assert_eq!(
            registry.get_active_tab_for_session("sess").await.as_deref(),
            Some("tab-2")
        );
    }

    #[tokio::test]
    async fn test_create_tab_rejects_bad_url_before_launching() {
        let registry = registry();
        let err = registry.create_tab("sess", "ftp://example.com").await;
        assert!(matches!(err, Err(BrowserError::NavigationFailed(_))));
        // Validation failed before any browser work happened
        assert!(!registry.browser_started().await);
    }

    #[tokio::test]
    async fn test_cleanup_twice_is_idempotent() {
        let registry = registry();
        registry.cleanup().await;
        registry.cleanup().await;
        assert!(registry.tabs.read().await.is_empty());
        assert!(registry.session_tabs.read().await.is_empty());
        assert!(!registry.browser_started().await);
    }
}
