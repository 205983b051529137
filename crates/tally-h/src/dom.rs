//! Page-side helpers: JavaScript snippets and evaluation with timeout and
//! navigation-context retry.

use chromiumoxide::Page;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use serde_json::Value;
use std::time::Duration;
use tally_engine::backend::BackendError;

/// Maximum retries for context errors during page navigation.
const MAX_CONTEXT_RETRIES: u32 = 10;

/// Delay between retries when context is not found (page navigating).
const CONTEXT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Attribute used to tag the element `click_text` picked, so it can be
/// clicked through CDP like any other element.
pub const HIT_ATTRIBUTE: &str = "data-tally-hit";

/// Check if an error indicates the page context is unavailable (e.g., during navigation).
fn is_context_error(err: &str) -> bool {
    err.contains("Cannot find context")
        || err.contains("Execution context was destroyed")
        || err.contains("-32000")
}

enum EvalError {
    Timeout,
    Context(String),
    Other(String),
}

async fn evaluate_once(
    page: &Page,
    expression: &str,
    await_promise: bool,
    timeout: Duration,
) -> Result<Value, EvalError> {
    let params = EvaluateParams::builder()
        .expression(expression)
        .await_promise(await_promise)
        .return_by_value(true)
        .build()
        .map_err(EvalError::Other)?;

    match tokio::time::timeout(timeout, page.evaluate(params)).await {
        Err(_) => Err(EvalError::Timeout),
        Ok(Err(e)) => {
            let err_str = e.to_string();
            if is_context_error(&err_str) {
                Err(EvalError::Context(err_str))
            } else {
                Err(EvalError::Other(err_str))
            }
        }
        Ok(Ok(remote_object)) => Ok(remote_object.value().cloned().unwrap_or(Value::Null)),
    }
}

/// Evaluate `expression` and return its JSON value. Context errors while the
/// page is navigating are retried; a timeout usually means a blocking dialog.
pub async fn evaluate(
    page: &Page,
    expression: &str,
    await_promise: bool,
    timeout: Duration,
) -> Result<Value, BackendError> {
    let mut last_error = None;

    for attempt in 0..MAX_CONTEXT_RETRIES {
        match evaluate_once(page, expression, await_promise, timeout).await {
            Ok(value) => return Ok(value),
            Err(EvalError::Timeout) => {
                return Err(BackendError::Timeout(format!(
                    "script did not finish within {:?}",
                    timeout
                )));
            }
            Err(EvalError::Context(err_str)) => {
                tracing::debug!(
                    "Context error during evaluation (attempt {}/{}), retrying...",
                    attempt + 1,
                    MAX_CONTEXT_RETRIES
                );
                last_error = Some(err_str);
                tokio::time::sleep(CONTEXT_RETRY_DELAY).await;
            }
            Err(EvalError::Other(err_str)) => return Err(BackendError::Script(err_str)),
        }
    }

    Err(BackendError::Script(last_error.unwrap_or_else(|| {
        "evaluation failed after retries".to_string()
    })))
}

/// JSON-encode `value` as a JavaScript string literal.
pub fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Collects the options of a native select, or of a custom listbox.
const OPTIONS_OF: &str = r#"
const optionsOf = (el) => {
  const nodes = el.tagName === 'SELECT'
    ? Array.from(el.options)
    : Array.from(el.querySelectorAll('option, [role="option"], li'));
  return nodes.map((o) => ({
    label: (o.label || o.textContent || '').trim(),
    value: o.value !== undefined ? String(o.value) : o.getAttribute('data-value'),
  }));
};
"#;

pub fn fill(selector: &str, text: &str) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({sel});
  if (!el) return 'missing';
  el.focus();
  el.value = {text};
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return 'ok';
}})()"#,
        sel = js_string(selector),
        text = js_string(text),
    )
}

/// Select an option of a native `<select>` by `label` (`by_value = false`)
/// or by `value`, firing the events a user selection would.
pub fn select(selector: &str, wanted: &str, by_value: bool) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({sel});
  if (!el) return 'missing';
  if (el.tagName !== 'SELECT') return 'not-select';
  const wanted = {wanted};
  const idx = Array.from(el.options).findIndex((o) =>
    {by_value} ? o.value === wanted : (o.label || o.textContent || '').trim() === wanted);
  if (idx < 0) return 'no-option';
  el.selectedIndex = idx;
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return 'ok';
}})()"#,
        sel = js_string(selector),
        wanted = js_string(wanted),
        by_value = by_value,
    )
}

/// Options of the element as `[{label, value}]`, or `null` when missing.
pub fn list_options(selector: &str) -> String {
    format!(
        r#"(() => {{
  {OPTIONS_OF}
  const el = document.querySelector({sel});
  return el ? optionsOf(el) : null;
}})()"#,
        sel = js_string(selector),
    )
}

/// Tag the innermost visible element whose text contains `text`
/// (case-insensitive, exact matches first). Returns the tag value or `null`.
pub fn mark_text(text: &str, token: u64) -> String {
    format!(
        r#"(() => {{
  const needle = {text}.trim().toLowerCase();
  if (!needle) return null;
  document.querySelectorAll('[{attr}]').forEach((e) => e.removeAttribute('{attr}'));
  const visible = (e) => {{
    const r = e.getBoundingClientRect();
    const s = window.getComputedStyle(e);
    return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none';
  }};
  const own = (e) => (e.innerText || e.textContent || '').trim().toLowerCase();
  const hits = Array.from(document.body.querySelectorAll('*'))
    .filter((e) => visible(e) && own(e).includes(needle))
    .filter((e) => !Array.from(e.children).some((c) => visible(c) && own(c).includes(needle)));
  if (!hits.length) return null;
  const hit = hits.find((e) => own(e) === needle) || hits[0];
  hit.setAttribute('{attr}', '{token}');
  hit.scrollIntoView({{ block: 'center' }});
  return '{token}';
}})()"#,
        text = js_string(text),
        attr = HIT_ATTRIBUTE,
        token = token,
    )
}

/// Absolute hrefs of every anchor on the page.
pub const ANCHOR_HREFS: &str =
    "Array.from(document.querySelectorAll('a[href]')).map((a) => a.href)";

/// Fetch `href` with the page's cookies. Resolves to `{ok, status, body}`.
pub fn fetch_text(href: &str) -> String {
    format!(
        r#"(async () => {{
  const r = await fetch({href}, {{ credentials: 'include' }});
  return {{ ok: r.ok, status: r.status, body: r.ok ? await r.text() : '' }};
}})()"#,
        href = js_string(href),
    )
}

/// HTTP status of the current document; 0 when the browser does not expose it.
pub const NAVIGATION_STATUS: &str = r#"(() => {
  const nav = performance.getEntriesByType('navigation')[0];
  return nav && nav.responseStatus ? nav.responseStatus : 0;
})()"#;

/// Whether `href` points at a tabular file, judged by its path extension.
pub fn is_data_link(href: &str, extensions: &[String]) -> bool {
    let path = href
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    extensions
        .iter()
        .any(|ext| path.ends_with(&ext.to_ascii_lowercase()))
}
