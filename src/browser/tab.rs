//! Per-tab state: page handle, current URL and the element reference index.

use std::collections::HashMap;

use chromiumoxide::Page;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::BrowserError;

/// Maps short-lived element references (`e1`, `e2`, ...) to the selector that
/// resolves them on the page. References are assigned in snapshot traversal
/// order and stay monotonic across repeated snapshots of the same page; only
/// navigation resets the counter back to zero.
#[derive(Debug, Default)]
pub struct ElementIndex {
    next_ref: u64,
    selectors: HashMap<String, String>,
}

impl ElementIndex {
    /// Assign the next reference to an element identified by its visible text.
    ///
    /// Two elements with identical text end up with distinct references that
    /// resolve to the same selector; lookup then hits whichever matches first
    /// in the document. That collision is a known limitation of text-based
    /// selectors and is kept as-is.
    pub fn assign(&mut self, name: &str) -> String {
        self.next_ref += 1;
        let element_ref = format!("e{}", self.next_ref);
        self.selectors.insert(element_ref.clone(), text_selector(name));
        element_ref
    }

    /// Resolve a reference to its selector, if the reference is still valid.
    pub fn resolve(&self, element_ref: &str) -> Option<&str> {
        self.selectors.get(element_ref).map(String::as_str)
    }

    /// Currently valid references, sorted for stable error listings.
    pub fn known_refs(&self) -> Vec<String> {
        let mut refs: Vec<String> = self.selectors.keys().cloned().collect();
        refs.sort_unstable();
        refs
    }

    /// Drop all references and restart numbering from `e1`.
    pub fn reset(&mut self) {
        self.next_ref = 0;
        self.selectors.clear();
    }

    pub fn ref_count(&self) -> u64 {
        self.next_ref
    }
}

/// Build the exact-visible-text selector recorded for an interactive element.
pub fn text_selector(name: &str) -> String {
    format!("text=\"{}\"", name)
}

/// Extract the text needle from a selector produced by [`text_selector`].
pub fn selector_text(selector: &str) -> Option<&str> {
    selector.strip_prefix("text=\"")?.strip_suffix('"')
}

/// State for a single browser tab.
#[derive(Debug)]
pub struct TabState {
    /// Unique tab ID (e.g. `tab-3f8a...`)
    pub id: String,
    /// The underlying page handle
    page: Page,
    /// URL the tab currently points at
    url: RwLock<String>,
    /// Element reference index, rebuilt by snapshots and cleared by navigation
    pub(crate) elements: RwLock<ElementIndex>,
}

impl TabState {
    pub(crate) fn new(page: Page, url: String) -> Self {
        Self {
            id: format!("tab-{}", Uuid::new_v4()),
            page,
            url: RwLock::new(url),
            elements: RwLock::new(ElementIndex::default()),
        }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub async fn current_url(&self) -> String {
        self.url.read().await.clone()
    }

    /// Record a completed navigation: update the URL and invalidate every
    /// element reference handed out for the previous page.
    pub(crate) async fn record_navigation(&self, url: &str) {
        *self.url.write().await = url.to_string();
        self.elements.write().await.reset();
    }

    /// Resolve an element reference to its selector, failing with the list of
    /// currently valid references when it is unknown.
    pub async fn resolve_ref(&self, element_ref: &str) -> Result<String, BrowserError> {
        let elements = self.elements.read().await;
        match elements.resolve(element_ref) {
            Some(selector) => Ok(selector.to_string()),
            None => Err(BrowserError::UnknownElementRef {
                element_ref: element_ref.to_string(),
                known: elements.known_refs(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_numbers_sequentially() {
        let mut index = ElementIndex::default();
        assert_eq!(index.assign("First"), "e1");
        assert_eq!(index.assign("Second"), "e2");
        assert_eq!(index.assign("Third"), "e3");
        assert_eq!(index.ref_count(), 3);
    }

    #[test]
    fn test_resolve_returns_text_selector() {
        let mut index = ElementIndex::default();
        let element_ref = index.assign("More information...");
        assert_eq!(
            index.resolve(&element_ref),
            Some("text=\"More information...\"")
        );
    }

    #[test]
    fn test_resolve_unknown_ref() {
        let index = ElementIndex::default();
        assert_eq!(index.resolve("e1"), None);
    }

    #[test]
    fn test_duplicate_names_get_distinct_refs_same_selector() {
        let mut index = ElementIndex::default();
        let a = index.assign("Submit");
        let b = index.assign("Submit");
        assert_ne!(a, b);
        assert_eq!(index.resolve(&a), index.resolve(&b));
    }

    #[test]
    fn test_reset_clears_refs_and_counter() {
        let mut index = ElementIndex::default();
        index.assign("One");
        index.assign("Two");
        index.reset();
        assert!(index.known_refs().is_empty());
        assert_eq!(index.ref_count(), 0);
        // Numbering restarts from e1 after a reset
        assert_eq!(index.assign("Three"), "e1");
    }

    #[test]
    fn test_known_refs_sorted() {
        let mut index = ElementIndex::default();
        for name in ["a", "b", "c"] {
            index.assign(name);
        }
        assert_eq!(index.known_refs(), vec!["e1", "e2", "e3"]);
    }

    #[test]
    fn test_selector_round_trip() {
        let selector = text_selector("Accept all");
        assert_eq!(selector, "text=\"Accept all\"");
        assert_eq!(selector_text(&selector), Some("Accept all"));
    }

    #[test]
    fn test_selector_text_rejects_other_formats() {
        assert_eq!(selector_text("css=#login"), None);
        assert_eq!(selector_text("text=unquoted"), None);
    }

    #[test]
    fn test_selector_text_keeps_embedded_quotes() {
        let selector = text_selector("say \"hi\"");
        assert_eq!(selector_text(&selector), Some("say \"hi\""));
    }
}
