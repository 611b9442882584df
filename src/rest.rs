// Copyright 2026 Parcelscope Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP REST API.
//!
//! Request-shape validation happens here, before any browser work: a
//! missing field costs the caller a 400 and the server nothing. Lookup
//! failures map to 500 with a machine-readable category and a
//! human-readable detail string.

use crate::assessor::{fetch_property_record, PropertyQuery};
use crate::config::AppConfig;
use crate::quote::{render_quote_email, QuoteMailer, QuoteRequest};
use crate::renderer::Renderer;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

/// Shared application state. Everything here is constructed once at
/// startup and injected; there is no process-global mutable state.
pub struct AppState {
    pub config: AppConfig,
    pub renderer: Arc<dyn Renderer>,
    pub mailer: Arc<dyn QuoteMailer>,
}

/// Build the axum Router with all endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/property/info", post(property_info))
        .route("/api/quote/submit", post(quote_submit))
        .layer(cors)
        .with_state(state)
}

/// Start the REST API server on the given port.
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("REST API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Inbound property-info body. The `city` field maps to the region role
/// of the assessor form.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PropertyInfoRequest {
    city: Option<String>,
    street_name: Option<String>,
    address_number: Option<String>,
}

impl PropertyInfoRequest {
    /// All three fields are required; returns the missing field's wire name.
    fn into_query(self) -> Result<PropertyQuery, &'static str> {
        let region = non_blank(self.city).ok_or("city")?;
        let street_name = non_blank(self.street_name).ok_or("streetName")?;
        let address_number = non_blank(self.address_number).ok_or("addressNumber")?;
        Ok(PropertyQuery {
            region,
            street_name,
            address_number,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

async fn property_info(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PropertyInfoRequest>,
) -> Response {
    let query = match body.into_query() {
        Ok(query) => query,
        Err(field) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("missing required field: {field}") })),
            )
                .into_response();
        }
    };

    match fetch_property_record(state.renderer.as_ref(), &state.config, &query).await {
        Ok(record) => (
            StatusCode::OK,
            Json(json!({ "success": true, "data": record })),
        )
            .into_response(),
        Err(e) => {
            error!("property lookup failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.kind(), "details": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn quote_submit(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QuoteRequest>,
) -> Response {
    let quote = match body.validate() {
        Ok(quote) => quote,
        Err(field) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("missing required field: {field}") })),
            )
                .into_response();
        }
    };

    let email = render_quote_email(&quote);
    match state.mailer.send(&email).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))).into_response(),
        Err(e) => {
            error!("quote delivery failed: {e:#}");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "quote delivery failed", "details": e.to_string() })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(city: Option<&str>, street: Option<&str>, number: Option<&str>) -> PropertyInfoRequest {
        PropertyInfoRequest {
            city: city.map(String::from),
            street_name: street.map(String::from),
            address_number: number.map(String::from),
        }
    }

    #[test]
    fn test_into_query_requires_each_field() {
        assert_eq!(
            body(None, Some("Main St"), Some("123")).into_query().unwrap_err(),
            "city"
        );
        assert_eq!(
            body(Some("Boston"), None, Some("123")).into_query().unwrap_err(),
            "streetName"
        );
        assert_eq!(
            body(Some("Boston"), Some("Main St"), None)
                .into_query()
                .unwrap_err(),
            "addressNumber"
        );
    }

    #[test]
    fn test_into_query_rejects_blank_strings() {
        assert_eq!(
            body(Some("   "), Some("Main St"), Some("123"))
                .into_query()
                .unwrap_err(),
            "city"
        );
    }

    #[test]
    fn test_into_query_trims_fields() {
        let query = body(Some(" Boston "), Some("Main St"), Some("123"))
            .into_query()
            .unwrap();
        assert_eq!(query.region, "Boston");
        assert_eq!(query.street_name, "Main St");
        assert_eq!(query.address_number, "123");
    }
}
