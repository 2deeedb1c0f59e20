//! Browser error types

use thiserror::Error;

/// Browser-related errors
#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Tab not found: {tab_id}. Available tabs: {known:?}")]
    TabNotFound { tab_id: String, known: Vec<String> },

    #[error("Unknown element ref: {element_ref}. Available refs: {known:?}")]
    UnknownElementRef {
        element_ref: String,
        known: Vec<String>,
    },

    #[error("No active tab found for session: {0}")]
    SessionNotFound(String),

    #[error("Action failed: {0}")]
    ActionFailed(String),

    #[error("Screenshot failed: {0}")]
    ScreenshotFailed(String),

    #[error("Failed to get accessibility tree: {0}")]
    SnapshotFailed(String),
}
