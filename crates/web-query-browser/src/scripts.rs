//! JavaScript evaluated inside the page
//!
//! Selectors never get spliced into source text: remote mode hands them to the
//! protocol as parameters, embedded mode embeds them as JSON string literals.

use crate::error::Result;

/// HTTP status of the main document, 0 when the engine does not expose it
pub const NAVIGATION_STATUS: &str = r#"
(() => {
    const entry = performance.getEntriesByType('navigation')[0];
    return entry && typeof entry.responseStatus === 'number' ? entry.responseStatus : 0;
})()
"#;

/// Called with `this` bound to the matched element
pub const TEXT_CONTENT_FN: &str = "function() { return this.textContent; }";

/// Post the finished navigation's status and URL back over IPC
pub const REPORT_NAVIGATION: &str = r#"
(() => {
    const entry = performance.getEntriesByType('navigation')[0];
    const status = entry && typeof entry.responseStatus === 'number' ? entry.responseStatus : 0;
    window.ipc.postMessage(JSON.stringify({ kind: 'navigation', status, url: window.location.href }));
})();
"#;

/// Look up one selector and post its visible text back over IPC
///
/// # Arguments
/// * `id` - Correlates the IPC reply with the request
/// * `selector` - CSS selector, any characters allowed
pub fn query_script(id: u64, selector: &str) -> Result<String> {
    let selector = serde_json::to_string(selector)?;
    Ok(format!(
        r#"
(() => {{
    const id = {id};
    try {{
        const el = document.querySelector({selector});
        window.ipc.postMessage(JSON.stringify({{
            kind: 'query', id, found: el !== null, text: el === null ? null : el.innerText
        }}));
    }} catch (e) {{
        window.ipc.postMessage(JSON.stringify({{ kind: 'query', id, error: String(e) }}));
    }}
}})();
"#
    ))
}
