//! Synthetic page input with humanized pacing.
//!
//! Elements are resolved by exact visible text (the selector strategy recorded
//! in the element index), scrolled into view, then driven with raw CDP input
//! events. Keystrokes and mouse presses carry randomized delays so the input
//! stream does not look machine-generated.

use chromiumoxide::{
    cdp::browser_protocol::input::{
        DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
        DispatchMouseEventType, MouseButton,
    },
    Page,
};
use rand::{Rng, SeedableRng};
use serde_json::Value;
use tokio::time::Duration;
use tracing::debug;

use super::BrowserError;

/// JavaScript template: find the first element whose trimmed visible text (or
/// accessible label) equals the needle, scroll it into view and report its
/// center point. Returns null when nothing matches.
const LOCATE_BY_TEXT_JS: &str = r#"
((needle) => {
    const textOf = (el) => {
        const label = el.getAttribute && el.getAttribute('aria-label');
        if (label && label.trim() === needle) return needle;
        const text = el.innerText || el.textContent || '';
        return text.trim().replace(/\s+/g, ' ');
    };

    for (const el of document.querySelectorAll('body, body *')) {
        if (textOf(el) !== needle) continue;
        el.scrollIntoView({ behavior: 'instant', block: 'center' });
        const rect = el.getBoundingClientRect();
        if (rect.width === 0 && rect.height === 0) continue;
        return {
            x: rect.x + rect.width / 2,
            y: rect.y + rect.height / 2
        };
    }
    return null;
})
"#;

/// JavaScript template: focus the first element matching the needle the same
/// way [`LOCATE_BY_TEXT_JS`] finds it. Returns true when focused.
const FOCUS_BY_TEXT_JS: &str = r#"
((needle) => {
    const textOf = (el) => {
        const label = el.getAttribute && el.getAttribute('aria-label');
        if (label && label.trim() === needle) return needle;
        const text = el.innerText || el.textContent || '';
        return text.trim().replace(/\s+/g, ' ');
    };

    for (const el of document.querySelectorAll('body, body *')) {
        if (textOf(el) !== needle) continue;
        el.scrollIntoView({ behavior: 'instant', block: 'center' });
        el.focus();
        return true;
    }
    return false;
})
"#;

fn call_with_needle(template: &str, needle: &str) -> Result<String, BrowserError> {
    let encoded = serde_json::to_string(needle)
        .map_err(|e| BrowserError::ActionFailed(format!("could not encode text needle: {e}")))?;
    Ok(format!("({})({})", template.trim(), encoded))
}

/// Find the center point of the first element with the given visible text.
async fn locate_by_text(page: &Page, text: &str) -> Result<(f64, f64), BrowserError> {
    let js = call_with_needle(LOCATE_BY_TEXT_JS, text)?;

    let result: Value = page
        .evaluate(js)
        .await
        .map_err(|e| BrowserError::ActionFailed(e.to_string()))?
        .into_value()
        .map_err(|e| BrowserError::ActionFailed(format!("locate result: {e}")))?;

    if result.is_null() {
        return Err(BrowserError::ActionFailed(format!(
            "no visible element with text \"{}\"",
            text
        )));
    }

    let x = result["x"]
        .as_f64()
        .ok_or_else(|| BrowserError::ActionFailed("locate result missing x".to_string()))?;
    let y = result["y"]
        .as_f64()
        .ok_or_else(|| BrowserError::ActionFailed("locate result missing y".to_string()))?;

    Ok((x, y))
}

/// Click the first element whose visible text matches. The cursor path is a
/// short interpolated move followed by a press/release pair with a held
/// button, like a real click.
pub async fn click_text(page: &Page, text: &str) -> Result<(), BrowserError> {
    let (x, y) = locate_by_text(page, text).await?;

    let mut rng = rand::rngs::StdRng::from_entropy();

    // Approach the target in a few steps instead of teleporting
    let start_x: f64 = rng.gen_range(100.0..600.0);
    let start_y: f64 = rng.gen_range(100.0..400.0);
    let steps = rng.gen_range(4..8);
    for i in 1..=steps {
        let t = i as f64 / steps as f64;
        let move_event = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseMoved)
            .x(start_x + (x - start_x) * t)
            .y(start_y + (y - start_y) * t)
            .button(MouseButton::None)
            .build()
            .map_err(BrowserError::ActionFailed)?;
        page.execute(move_event)
            .await
            .map_err(|e| BrowserError::ActionFailed(e.to_string()))?;
        tokio::time::sleep(Duration::from_millis(rng.gen_range(10..30))).await;
    }

    // Humans don't click pixel-perfect
    let click_x = x + rng.gen_range(-2.0..2.0);
    let click_y = y + rng.gen_range(-2.0..2.0);

    let press = DispatchMouseEventParams::builder()
        .r#type(DispatchMouseEventType::MousePressed)
        .x(click_x)
        .y(click_y)
        .button(MouseButton::Left)
        .click_count(1)
        .build()
        .map_err(BrowserError::ActionFailed)?;
    page.execute(press)
        .await
        .map_err(|e| BrowserError::ActionFailed(e.to_string()))?;

    // Hold 40-120ms like real clicks
    tokio::time::sleep(Duration::from_millis(rng.gen_range(40..120))).await;

    let release = DispatchMouseEventParams::builder()
        .r#type(DispatchMouseEventType::MouseReleased)
        .x(click_x)
        .y(click_y)
        .button(MouseButton::Left)
        .click_count(1)
        .build()
        .map_err(BrowserError::ActionFailed)?;
    page.execute(release)
        .await
        .map_err(|e| BrowserError::ActionFailed(e.to_string()))?;

    debug!("clicked element at ({:.0}, {:.0})", click_x, click_y);
    Ok(())
}

/// Focus the first element whose visible text matches and type into it using
/// raw CDP keyboard events with variable per-keystroke delays.
pub async fn type_into_text(page: &Page, text: &str, input: &str) -> Result<(), BrowserError> {
    let js = call_with_needle(FOCUS_BY_TEXT_JS, text)?;

    let focused: Value = page
        .evaluate(js)
        .await
        .map_err(|e| BrowserError::ActionFailed(e.to_string()))?
        .into_value()
        .map_err(|e| BrowserError::ActionFailed(format!("focus result: {e}")))?;

    if focused.as_bool() != Some(true) {
        return Err(BrowserError::ActionFailed(format!(
            "no visible element with text \"{}\"",
            text
        )));
    }

    let mut rng = rand::rngs::StdRng::from_entropy();

    for c in input.chars() {
        let key_down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .text(c.to_string())
            .build()
            .map_err(BrowserError::ActionFailed)?;
        page.execute(key_down)
            .await
            .map_err(|e| BrowserError::ActionFailed(e.to_string()))?;

        let key_up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .build()
            .map_err(BrowserError::ActionFailed)?;
        page.execute(key_up)
            .await
            .map_err(|e| BrowserError::ActionFailed(e.to_string()))?;

        tokio::time::sleep(Duration::from_millis(rng.gen_range(25..75))).await;
    }

    debug!("typed {} chars", input.chars().count());
    Ok(())
}
