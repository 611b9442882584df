//! End-to-end lookup tests against a scripted renderer double.
//!
//! The mock implements the renderer traits over an in-memory form state:
//! it answers the driver's injected scripts, applies cascade repopulation
//! when a selection fires, and counts context creation and close calls so
//! resource-safety properties are directly observable.

use anyhow::{bail, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use parcelscope::assessor::{fetch_property_record, PropertyQuery};
use parcelscope::config::AppConfig;
use parcelscope::error::LookupError;
use parcelscope::quote::{QuoteEmail, QuoteMailer};
use parcelscope::renderer::{NavigationResult, RenderContext, Renderer};
use parcelscope::rest::{router, AppState};

const FIXTURE_HTML: &str = r#"
<html><body>
<table>
    <tr><td>Owner: JOHN Q PUBLIC</td></tr>
    <tr><td>Total Value: $350,000</td></tr>
    <tr><td>Year Built: 1985</td></tr>
</table>
</body></html>
"#;

const PARTIAL_HTML: &str = r#"
<html><body>
<table><tr><td>Building Value: $245,000</td></tr></table>
</body></html>
"#;

#[derive(Clone)]
struct MockSelect {
    selector: String,
    id: String,
    name: String,
    options: Vec<(String, String)>,
}

struct PageState {
    selects: Vec<MockSelect>,
    /// Selecting the key selector repopulates the target selector.
    cascades: HashMap<String, (String, Vec<(String, String)>)>,
    selections: Vec<(String, String)>,
    navigations: Vec<String>,
    submitted: bool,
    html: String,
    fail_navigate: bool,
    fail_html: bool,
}

fn select(selector: &str, id: &str, name: &str, options: &[(&str, &str)]) -> MockSelect {
    MockSelect {
        selector: selector.to_string(),
        id: id.to_string(),
        name: name.to_string(),
        options: options
            .iter()
            .map(|(v, l)| (v.to_string(), l.to_string()))
            .collect(),
    }
}

fn pairs(options: &[(&str, &str)]) -> Vec<(String, String)> {
    options
        .iter()
        .map(|(v, l)| (v.to_string(), l.to_string()))
        .collect()
}

/// The standard three-dropdown form: city populated up front, street and
/// number starting placeholder-only until the upstream selection fires.
fn form_page() -> PageState {
    let mut cascades = HashMap::new();
    cascades.insert(
        "#ddlCity".to_string(),
        (
            "#ddlStreet".to_string(),
            pairs(&[("", "Select Street"), ("44", "MAIN ST"), ("45", "ELM ST")]),
        ),
    );
    cascades.insert(
        "#ddlStreet".to_string(),
        (
            "#ddlNumber".to_string(),
            pairs(&[("", "Select Number"), ("9", "123"), ("10", "125")]),
        ),
    );
    PageState {
        selects: vec![
            select(
                "#ddlCity",
                "ddlCity",
                "ctl00$city",
                &[("", "Select City"), ("12", "BOSTON"), ("7", "CAMBRIDGE")],
            ),
            select("#ddlStreet", "ddlStreet", "ctl00$street", &[("", "Select Street")]),
            select(
                "#ddlNumber",
                "ddlNumber",
                "ctl00$addressnumber",
                &[("", "Select Number")],
            ),
        ],
        cascades,
        selections: Vec::new(),
        navigations: Vec::new(),
        submitted: false,
        html: FIXTURE_HTML.to_string(),
        fail_navigate: false,
        fail_html: false,
    }
}

struct MockRenderer {
    state: Arc<Mutex<PageState>>,
    contexts_opened: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl MockRenderer {
    fn new(page: PageState) -> Self {
        Self {
            state: Arc::new(Mutex::new(page)),
            contexts_opened: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        self.contexts_opened.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MockContext {
            state: Arc::clone(&self.state),
            closes: Arc::clone(&self.closes),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.contexts_opened.load(Ordering::Relaxed) - self.closes.load(Ordering::Relaxed)
    }
}

struct MockContext {
    state: Arc<Mutex<PageState>>,
    closes: Arc<AtomicUsize>,
}

fn capture(script: &str, pattern: &str) -> Option<String> {
    Regex::new(pattern)
        .ok()?
        .captures(script)?
        .get(1)
        .map(|m| m.as_str().to_string())
}

fn handle_script(state: &mut PageState, script: &str) -> Result<Value> {
    // Dropdown enumeration
    if script.contains("querySelectorAll('select')") {
        let payload: Vec<Value> = state
            .selects
            .iter()
            .enumerate()
            .map(|(i, s)| {
                json!({
                    "selector": s.selector,
                    "id": s.id,
                    "name": s.name,
                    "position": i,
                    "options": s.options,
                })
            })
            .collect();
        return Ok(Value::Array(payload));
    }

    // Value assignment with change dispatch
    if script.contains("dispatchEvent(new Event('change'") {
        let selector = capture(script, r"querySelector\('([^']+)'\)")
            .ok_or_else(|| anyhow::anyhow!("no selector in select script"))?;
        let value = capture(script, r"el\.value = '([^']*)'")
            .ok_or_else(|| anyhow::anyhow!("no value in select script"))?;
        state.selections.push((selector.clone(), value));
        if let Some((target, options)) = state.cascades.get(&selector).cloned() {
            if let Some(sel) = state.selects.iter_mut().find(|s| s.selector == target) {
                sel.options = options;
            }
        }
        return Ok(Value::Bool(true));
    }

    // Repopulation probe
    if script.contains("el.options.length") {
        let selector = capture(script, r"querySelector\('([^']+)'\)").unwrap_or_default();
        let count = state
            .selects
            .iter()
            .find(|s| s.selector == selector)
            .map(|s| s.options.len())
            .unwrap_or(0);
        return Ok(json!(count));
    }

    // Form submission
    if script.contains("requestSubmit") {
        state.submitted = true;
        return Ok(json!("clicked"));
    }

    // Results-table probe
    if script.contains("table td") {
        return Ok(Value::Bool(true));
    }

    // Single-control option read
    if script.contains("Array.from(el.options)") {
        let selector = capture(script, r"querySelector\('([^']+)'\)").unwrap_or_default();
        return match state.selects.iter().find(|s| s.selector == selector) {
            Some(s) => Ok(json!(s.options)),
            None => Ok(Value::Null),
        };
    }

    bail!("unrecognized script: {script}")
}

#[async_trait]
impl RenderContext for MockContext {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
        let mut state = self.state.lock().unwrap();
        if state.fail_navigate {
            bail!("connection refused");
        }
        state.navigations.push(url.to_string());
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: 1,
        })
    }

    async fn execute_js(&self, script: &str) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        handle_script(&mut state, script)
    }

    async fn get_html(&self) -> Result<String> {
        let state = self.state.lock().unwrap();
        if state.fail_html {
            bail!("tab crashed");
        }
        Ok(state.html.clone())
    }

    async fn get_url(&self) -> Result<String> {
        Ok("mock://form".to_string())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.closes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

struct NoopMailer;

#[async_trait]
impl QuoteMailer for NoopMailer {
    async fn send(&self, _email: &QuoteEmail) -> Result<()> {
        Ok(())
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        form_url: "mock://form".to_string(),
        page_load_timeout_ms: 1_000,
        repopulate_timeout_ms: 200,
        repopulate_poll_ms: 10,
        grace_delay_ms: 10,
        settle_delay_ms: 10,
        results_timeout_ms: 100,
        ..AppConfig::default()
    }
}

fn query() -> PropertyQuery {
    PropertyQuery {
        region: "Boston".to_string(),
        street_name: "Main St".to_string(),
        address_number: "123".to_string(),
    }
}

fn app(renderer: MockRenderer) -> (Arc<AppState>, Arc<MockRenderer>) {
    let renderer = Arc::new(renderer);
    let state = Arc::new(AppState {
        config: test_config(),
        renderer: renderer.clone(),
        mailer: Arc::new(NoopMailer),
    });
    (state, renderer)
}

// ── Ordering and end-to-end ─────────────────────────────────────────────

#[tokio::test]
async fn driver_applies_selections_in_dependency_order() {
    let renderer = MockRenderer::new(form_page());
    let record = fetch_property_record(&renderer, &test_config(), &query())
        .await
        .expect("lookup should succeed");

    let state = renderer.state.lock().unwrap();
    let order: Vec<&str> = state.selections.iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(order, ["#ddlCity", "#ddlStreet", "#ddlNumber"]);
    // Exact case-insensitive label matches resolved the values.
    assert_eq!(state.selections[0].1, "12");
    assert_eq!(state.selections[1].1, "44");
    assert_eq!(state.selections[2].1, "9");
    assert!(state.submitted);
    assert_eq!(state.navigations, ["mock://form"]);

    assert_eq!(record.owner.as_deref(), Some("JOHN Q PUBLIC"));
}

#[tokio::test]
async fn end_to_end_lookup_extracts_fixture_fields() {
    let renderer = MockRenderer::new(form_page());
    let record = fetch_property_record(&renderer, &test_config(), &query())
        .await
        .expect("lookup should succeed");

    assert_eq!(record.owner.as_deref(), Some("JOHN Q PUBLIC"));
    assert_eq!(record.total_value.as_deref(), Some("$350,000"));
    assert_eq!(record.year_built.as_deref(), Some("1985"));
    assert_eq!(record.building_value, None);
    assert_eq!(record.land_value, None);
    assert_eq!(record.lot_size, None);
    assert_eq!(record.last_sale_price, None);
}

#[tokio::test]
async fn driver_proceeds_after_grace_when_repopulation_is_silent() {
    // Street repopulates to a single real option: the placeholder-count
    // wait can never fire, so the driver must degrade to the grace delay
    // and still complete the cascade.
    let mut page = form_page();
    page.cascades.insert(
        "#ddlCity".to_string(),
        ("#ddlStreet".to_string(), pairs(&[("44", "MAIN ST")])),
    );
    let renderer = MockRenderer::new(page);

    let record = fetch_property_record(&renderer, &test_config(), &query())
        .await
        .expect("lookup should survive a silent repopulation");

    let state = renderer.state.lock().unwrap();
    assert_eq!(state.selections.len(), 3);
    assert_eq!(state.selections[1], ("#ddlStreet".to_string(), "44".to_string()));
    assert_eq!(record.total_value.as_deref(), Some("$350,000"));
}

// ── Resource safety ─────────────────────────────────────────────────────

#[tokio::test]
async fn context_closed_exactly_once_on_success() {
    let renderer = MockRenderer::new(form_page());
    fetch_property_record(&renderer, &test_config(), &query())
        .await
        .expect("lookup should succeed");
    assert_eq!(renderer.contexts_opened.load(Ordering::Relaxed), 1);
    assert_eq!(renderer.closes.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn context_closed_exactly_once_on_resolution_failure() {
    let mut page = form_page();
    page.selects.truncate(2);
    let renderer = MockRenderer::new(page);

    let err = fetch_property_record(&renderer, &test_config(), &query())
        .await
        .expect_err("two dropdowns cannot be classified");
    assert!(matches!(err, LookupError::Resolution { found: 2 }));
    assert_eq!(renderer.closes.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn context_closed_exactly_once_on_option_failure() {
    let mut page = form_page();
    // Region offers nothing but an empty placeholder: unmatchable.
    page.selects[0].options = pairs(&[("", "Select City")]);
    let renderer = MockRenderer::new(page);

    let err = fetch_property_record(&renderer, &test_config(), &query())
        .await
        .expect_err("empty-valued region options cannot match");
    match &err {
        LookupError::OptionNotFound { target, .. } => assert_eq!(target, "Boston"),
        other => panic!("expected OptionNotFound, got {other:?}"),
    }
    assert!(err.to_string().contains("region"));
    assert_eq!(renderer.closes.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn context_closed_exactly_once_on_navigation_failure() {
    let mut page = form_page();
    page.fail_navigate = true;
    let renderer = MockRenderer::new(page);

    let err = fetch_property_record(&renderer, &test_config(), &query())
        .await
        .expect_err("navigation failure must abort the lookup");
    assert!(matches!(err, LookupError::Navigation { .. }));
    assert_eq!(renderer.closes.load(Ordering::Relaxed), 1);
    // The failure happened before any selection.
    assert!(renderer.state.lock().unwrap().selections.is_empty());
}

#[tokio::test]
async fn context_closed_exactly_once_on_page_read_failure() {
    let mut page = form_page();
    page.fail_html = true;
    let renderer = MockRenderer::new(page);

    let err = fetch_property_record(&renderer, &test_config(), &query())
        .await
        .expect_err("unreadable response page must abort the lookup");
    assert!(matches!(err, LookupError::Browser(_)));
    assert_eq!(renderer.closes.load(Ordering::Relaxed), 1);
}

// ── HTTP surface ────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_field_returns_400_without_navigation() {
    let (state, renderer) = app(MockRenderer::new(form_page()));

    let response = router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/property/info")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"city":"Boston","streetName":"Main St"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].as_str().unwrap().contains("addressNumber"));

    // No browser session was opened, no navigation attempted.
    assert_eq!(renderer.contexts_opened.load(Ordering::Relaxed), 0);
    assert!(renderer.state.lock().unwrap().navigations.is_empty());
}

#[tokio::test]
async fn partial_extraction_still_returns_200() {
    let mut page = form_page();
    page.html = PARTIAL_HTML.to_string();
    let (state, _renderer) = app(MockRenderer::new(page));

    let response = router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/property/info")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"city":"Boston","streetName":"Main St","addressNumber":"123"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["buildingValue"], "$245,000");
    assert!(body["data"].get("owner").is_none());
    assert!(body["data"].get("totalValue").is_none());
}

#[tokio::test]
async fn lookup_failure_returns_500_with_details() {
    let mut page = form_page();
    page.selects.truncate(1);
    let (state, renderer) = app(MockRenderer::new(page));

    let response = router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/property/info")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"city":"Boston","streetName":"Main St","addressNumber":"123"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "control_resolution_failed");
    assert!(body["details"].as_str().unwrap().contains("found 1"));
    assert_eq!(renderer.closes.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn quote_submit_requires_email() {
    let (state, _renderer) = app(MockRenderer::new(form_page()));

    let response = router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/quote/submit")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"name":"Ann"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].as_str().unwrap().contains("email"));
}
