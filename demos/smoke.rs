//! End-to-end smoke check against a real Chromium.
//!
//! Run with: cargo run --example smoke
//!
//! Drives the tab registry directly (no HTTP server): create a tab for
//! example.com, snapshot the accessibility tree, take a screenshot, clean up.
//! Requires a local Chrome/Chromium install.

use veiltab::browser::{LaunchOptions, TabRegistry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("=== Veiltab Smoke Test ===\n");

    let registry = TabRegistry::new(LaunchOptions::default());

    println!("Step 1: Creating tab for https://example.com ...");
    let tab = registry
        .create_tab("smoke-session", "https://example.com")
        .await?;
    println!("  Tab: {} -> {}\n", tab.id, tab.current_url().await);

    println!("Step 2: Looking up the session's active tab...");
    let active = registry.get_active_tab_for_session("smoke-session").await;
    assert_eq!(active.as_deref(), Some(tab.id.as_str()));
    println!("  Active tab: {}\n", tab.id);

    println!("Step 3: Taking accessibility snapshot...");
    let tree = registry.snapshot(&tab.id).await?;
    assert!(!tree.role.is_empty());
    println!("  Root role: {}", tree.role);
    println!(
        "  Root name: {}\n",
        tree.name.as_deref().unwrap_or("(none)")
    );

    println!("Step 4: Taking screenshot...");
    let bytes = registry.screenshot(&tab.id).await?;
    assert!(!bytes.is_empty());
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    println!("  {} bytes (valid PNG header)\n", bytes.len());

    println!("Step 5: Cleaning up...");
    registry.cleanup().await;
    registry.cleanup().await; // second run must be a no-op

    println!("\n=== All checks passed ===");
    Ok(())
}
