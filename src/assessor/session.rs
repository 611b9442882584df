//! Lookup orchestration: one browser context per request, torn down on
//! every exit path.

use crate::assessor::controls::{enumerate_selects, resolve_roles};
use crate::assessor::driver::drive_cascade;
use crate::assessor::extract::{extract_record, PropertyRecord};
use crate::config::AppConfig;
use crate::error::LookupError;
use crate::renderer::{RenderContext, Renderer};
use tracing::{debug, info, warn};

/// Caller-supplied lookup target. Immutable for the request's lifetime.
#[derive(Debug, Clone)]
pub struct PropertyQuery {
    pub region: String,
    pub street_name: String,
    pub address_number: String,
}

/// Run one full lookup in a fresh browser context.
///
/// The context is acquired before any fallible step and closed
/// unconditionally afterward; a close-time failure is logged and
/// swallowed so it can never mask the lookup's own outcome.
pub async fn fetch_property_record(
    renderer: &dyn Renderer,
    config: &AppConfig,
    query: &PropertyQuery,
) -> Result<PropertyRecord, LookupError> {
    let mut ctx = renderer.new_context().await.map_err(LookupError::Browser)?;

    let outcome = run_lookup(ctx.as_mut(), config, query).await;

    if let Err(e) = ctx.close().await {
        warn!("browser context close failed: {e:#}");
    }

    outcome
}

async fn run_lookup(
    ctx: &mut dyn RenderContext,
    config: &AppConfig,
    query: &PropertyQuery,
) -> Result<PropertyRecord, LookupError> {
    info!(url = %config.form_url, "loading assessor form");
    let nav = ctx
        .navigate(&config.form_url, config.page_load_timeout_ms)
        .await
        .map_err(|e| LookupError::Navigation {
            what: format!("form page load failed: {e:#}"),
            timeout_ms: config.page_load_timeout_ms,
        })?;
    debug!(final_url = %nav.final_url, load_ms = nav.load_time_ms, "form loaded");

    let controls = enumerate_selects(&*ctx).await?;
    let roles = resolve_roles(&controls)?;

    drive_cascade(&*ctx, &roles, query, config).await?;

    let response_url = ctx.get_url().await.unwrap_or_default();
    debug!(url = %response_url, "reading response page");
    let html = ctx.get_html().await?;
    let record = extract_record(&html);
    info!(
        region = %query.region,
        street = %query.street_name,
        number = %query.address_number,
        "lookup complete"
    );
    Ok(record)
}
