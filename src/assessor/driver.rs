//! Cascading input driver.
//!
//! Applies the three resolved selections in strict dependency order —
//! region, then street, then address number — because each upstream
//! selection triggers server-side repopulation of the next control's
//! option set. Option state is re-read from the live DOM before every
//! step; the snapshot taken at enumeration time is already stale by then.

use crate::assessor::controls::{ControlRole, ResolvedControls, SelectControl};
use crate::assessor::matcher::resolve_option;
use crate::assessor::session::PropertyQuery;
use crate::config::AppConfig;
use crate::error::LookupError;
use crate::renderer::RenderContext;
use anyhow::{bail, Context, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// Outcome of a bounded poll.
#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut,
}

/// Poll `probe` until it yields a value or `timeout` elapses.
///
/// The probe runs once immediately, then every `interval`. This is the
/// single waiting primitive of the driver; it carries no assumption about
/// what is being waited for beyond "not there yet".
pub async fn poll_until<T, F, Fut>(timeout: Duration, interval: Duration, mut probe: F) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = probe().await {
            return PollOutcome::Ready(value);
        }
        if Instant::now() >= deadline {
            return PollOutcome::TimedOut;
        }
        sleep(interval).await;
    }
}

/// Sanitize a string for safe injection into a JavaScript string literal.
///
/// Escapes all characters that could break out of a JS string context:
/// - Backslashes, single/double quotes, backticks
/// - Newlines, carriage returns, tabs
/// - HTML script tags (to prevent XSS if value is reflected in HTML)
/// - Null bytes
pub(crate) fn sanitize_js_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\\' => result.push_str("\\\\"),
            '\'' => result.push_str("\\'"),
            '"' => result.push_str("\\\""),
            '`' => result.push_str("\\`"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            '\0' => {}                       // Strip null bytes
            '<' => result.push_str("\\x3c"), // Prevent </script> injection
            '>' => result.push_str("\\x3e"),
            _ => result.push(ch),
        }
    }
    result
}

/// Drive the full cascade, then submit the form and settle.
pub async fn drive_cascade(
    ctx: &dyn RenderContext,
    roles: &ResolvedControls,
    query: &PropertyQuery,
    config: &AppConfig,
) -> Result<(), LookupError> {
    let steps: [(ControlRole, &SelectControl, &str); 3] = [
        (ControlRole::Region, &roles.region, query.region.as_str()),
        (ControlRole::Street, &roles.street, query.street_name.as_str()),
        (
            ControlRole::AddressNumber,
            &roles.address,
            query.address_number.as_str(),
        ),
    ];

    for (idx, (role, control, target)) in steps.iter().enumerate() {
        let options = read_options(ctx, &control.selector).await?;
        let value = resolve_option(target, &options).ok_or_else(|| {
            LookupError::OptionNotFound {
                role: *role,
                target: target.to_string(),
            }
        })?;

        info!(role = %role, value = %value, "selecting");
        select_value(ctx, &control.selector, &value).await?;

        if let Some((_, next, _)) = steps.get(idx + 1) {
            wait_for_repopulation(ctx, &next.selector, config).await;
        }
    }

    submit_and_settle(ctx, &roles.address.selector, config).await?;
    Ok(())
}

/// Read a control's current (value, label) option pairs from the live DOM.
pub async fn read_options(
    ctx: &dyn RenderContext,
    selector: &str,
) -> Result<Vec<(String, String)>> {
    let js = format!(
        r#"(() => {{
            const el = document.querySelector('{}');
            if (!el || !el.options) return null;
            return Array.from(el.options).map(o => [o.value, o.text]);
        }})()"#,
        sanitize_js_string(selector)
    );
    let value = ctx.execute_js(&js).await?;
    if value.is_null() {
        bail!("select control '{selector}' not found on page");
    }
    serde_json::from_value(value).context("malformed option payload")
}

/// Assign `value` to a select and fire a bubbling `change` event so the
/// page's repopulation handlers run.
async fn select_value(ctx: &dyn RenderContext, selector: &str, value: &str) -> Result<()> {
    let js = format!(
        r#"(() => {{
            const el = document.querySelector('{sel}');
            if (!el) return false;
            el.value = '{val}';
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return true;
        }})()"#,
        sel = sanitize_js_string(selector),
        val = sanitize_js_string(value),
    );
    let result = ctx.execute_js(&js).await?;
    if !result.as_bool().unwrap_or(false) {
        bail!("select control '{selector}' disappeared before assignment");
    }
    Ok(())
}

/// Wait for a dependent control to grow past the placeholder-only state
/// (more than one option). A timeout here is not fatal: some pages
/// repopulate without a detectable DOM signal, so we degrade to a fixed
/// grace delay and let the next read decide.
async fn wait_for_repopulation(ctx: &dyn RenderContext, selector: &str, config: &AppConfig) {
    let outcome = poll_until(
        Duration::from_millis(config.repopulate_timeout_ms),
        Duration::from_millis(config.repopulate_poll_ms),
        || probe_option_count(ctx, selector),
    )
    .await;

    match outcome {
        PollOutcome::Ready(count) => {
            debug!(selector, count, "dependent control repopulated");
        }
        PollOutcome::TimedOut => {
            debug!(selector, "no repopulation signal, proceeding after grace delay");
            sleep(Duration::from_millis(config.grace_delay_ms)).await;
        }
    }
}

/// Probe the option count of a select; yields only past placeholder state.
/// Script errors count as "not yet" — this wait is never fatal.
async fn probe_option_count(ctx: &dyn RenderContext, selector: &str) -> Option<u64> {
    let js = format!(
        r#"(() => {{
            const el = document.querySelector('{}');
            return el && el.options ? el.options.length : 0;
        }})()"#,
        sanitize_js_string(selector)
    );
    match ctx.execute_js(&js).await {
        Ok(value) => {
            let count = value.as_u64().unwrap_or(0);
            (count > 1).then_some(count)
        }
        Err(_) => None,
    }
}

/// Submit the form and wait for the response page to become readable.
///
/// Prefers a real submit control; otherwise synthesizes the accept
/// keystroke at the form (a scripted Enter is untrusted, so
/// `requestSubmit` carries the actual submission). After the fixed settle
/// delay, opportunistically waits for a results table — non-fatal if one
/// never appears, since extraction is best-effort anyway.
async fn submit_and_settle(
    ctx: &dyn RenderContext,
    address_selector: &str,
    config: &AppConfig,
) -> Result<()> {
    let js = format!(
        r#"(() => {{
            const btn = document.querySelector(
                'input[type="submit"], button[type="submit"], input[type="image"]');
            if (btn) {{ btn.click(); return 'clicked'; }}
            const el = document.querySelector('{sel}');
            const target = el || document.body;
            const key = {{ key: 'Enter', code: 'Enter', keyCode: 13, bubbles: true }};
            target.dispatchEvent(new KeyboardEvent('keydown', key));
            target.dispatchEvent(new KeyboardEvent('keyup', key));
            if (el && el.form) {{
                if (typeof el.form.requestSubmit === 'function') el.form.requestSubmit();
                else el.form.submit();
            }}
            return 'keyed';
        }})()"#,
        sel = sanitize_js_string(address_selector),
    );
    let how = ctx.execute_js(&js).await?;
    debug!(method = how.as_str().unwrap_or("?"), "form submitted");

    sleep(Duration::from_millis(config.settle_delay_ms)).await;

    let outcome = poll_until(
        Duration::from_millis(config.results_timeout_ms),
        Duration::from_millis(config.repopulate_poll_ms),
        || probe_results_table(ctx),
    )
    .await;
    if outcome == PollOutcome::TimedOut {
        debug!("results table never appeared; extracting anyway");
    }
    Ok(())
}

/// Probe for the presence of any populated table on the response page.
async fn probe_results_table(ctx: &dyn RenderContext) -> Option<()> {
    let js = "(() => { return !!document.querySelector('table td'); })()";
    match ctx.execute_js(js).await {
        Ok(value) if value.as_bool().unwrap_or(false) => Some(()),
        _ => None,
    }
}
