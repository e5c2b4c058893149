use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::mock::{generate_mock_shifts, resolve_seed};
use crate::portal::{PortalClient, RawPageStore};
use crate::preferences::Preferences;
use crate::scoring::{ScoredShift, ShiftMatcher};
use crate::subscribers::{Subscriber, SubscriberStore};
use crate::sync::{ScoreRequest, ScoreResponse};

const BANNER: &str = "ShiftMatch API\n\nPOST /api/shifts, /api/mock-shifts, /api/login, /api/signup-daily-email\nGET /api/raw/{token}, /health\n";
const MOCK_FALLBACK_NOTE: &str = " (Using sample data; could not parse live shifts.)";

#[derive(Clone)]
pub struct ApiState {
    config: Config,
    db_path: PathBuf,
    raw_pages: Arc<RawPageStore>,
}

impl ApiState {
    pub fn new(config: Config) -> Self {
        Self {
            db_path: config.resolved_db_path(),
            raw_pages: Arc::new(RawPageStore::new(config.raw_pages.ttl())),
            config,
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorBody {
            ok: false,
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct MockRequest {
    #[serde(default)]
    preferences: Preferences,
}

#[derive(Debug, Serialize)]
struct MockResponse {
    scored_shifts: Vec<ScoredShift>,
    source: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    member_number: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    preferences: Preferences,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum LoginResponse {
    Scored {
        success: bool,
        message: String,
        scored_shifts: Vec<ScoredShift>,
        raw_token: Option<Uuid>,
        source: &'static str,
        debug: Vec<String>,
    },
    Failed {
        success: bool,
        message: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        debug: Vec<String>,
    },
}

impl LoginResponse {
    fn failed(message: impl Into<String>, debug: Vec<String>) -> Self {
        Self::Failed {
            success: false,
            message: message.into(),
            debug,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SignupRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    member_number: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    preferences: Preferences,
}

#[derive(Debug, Serialize)]
struct SignupResponse {
    success: bool,
    message: String,
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/shifts", post(score_shifts))
        .route("/api/mock-shifts", post(mock_shifts))
        .route("/api/login", post(login))
        .route("/api/raw/:token", get(raw_page))
        .route("/api/signup-daily-email", post(signup_daily_email))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(config: Config, bind: SocketAddr) -> Result<()> {
    let app = build_router(ApiState::new(config));
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("ShiftMatch API listening on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index() -> &'static str {
    BANNER
}

async fn health() -> Json<ApiResponse<HealthResponse>> {
    ok(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Re-scores the shifts the caller already holds; nothing is fetched.
async fn score_shifts(body: Bytes) -> ApiResult<ScoreResponse> {
    let request: ScoreRequest = parse_body(&body)?;
    let matcher = matcher_for(&request.preferences)?;
    Ok(Json(ScoreResponse {
        scored_shifts: matcher.rank(&request.shifts),
    }))
}

async fn mock_shifts(State(state): State<ApiState>, body: Bytes) -> ApiResult<MockResponse> {
    let request: MockRequest = parse_body(&body)?;
    let matcher = matcher_for(&request.preferences)?;
    let shifts = generate_mock_shifts(state.config.mock.count, resolve_seed(&state.config.mock));
    Ok(Json(MockResponse {
        scored_shifts: matcher.rank(&shifts),
        source: "mock",
    }))
}

async fn login(State(state): State<ApiState>, body: Bytes) -> ApiResult<LoginResponse> {
    let request: LoginRequest = parse_body(&body)?;
    let member = request.member_number.trim();
    let password = request.password.trim();
    if member.is_empty() || password.is_empty() {
        return Ok(Json(LoginResponse::failed(
            "Member number and password are required.",
            Vec::new(),
        )));
    }
    let matcher = matcher_for(&request.preferences)?;

    let portal = PortalClient::new(&state.config.portal).map_err(ApiError::internal)?;
    let outcome = portal.login(member, password).await;
    let mut debug = outcome.debug;
    if !outcome.success {
        return Ok(Json(LoginResponse::failed(outcome.message, debug)));
    }

    let page = portal.fetch_shifts().await;
    debug.extend(page.debug);

    if page.success && !page.shifts.is_empty() {
        let token = state.raw_pages.put(page.html);
        info!(shifts = page.shifts.len(), "scored live portal shifts");
        return Ok(Json(LoginResponse::Scored {
            success: true,
            message: outcome.message,
            scored_shifts: matcher.rank(&page.shifts),
            raw_token: Some(token),
            source: "live",
            debug,
        }));
    }

    warn!(message = %page.message, "live shifts unavailable; serving sample data");
    let shifts = generate_mock_shifts(state.config.mock.count, resolve_seed(&state.config.mock));
    Ok(Json(LoginResponse::Scored {
        success: true,
        message: format!("{}{MOCK_FALLBACK_NOTE}", outcome.message),
        scored_shifts: matcher.rank(&shifts),
        raw_token: None,
        source: "mock",
        debug,
    }))
}

async fn raw_page(State(state): State<ApiState>, Path(token): Path<String>) -> Response {
    let html = Uuid::parse_str(&token)
        .ok()
        .and_then(|token| state.raw_pages.get(&token));
    match html {
        Some(html) => ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], html).into_response(),
        None => (StatusCode::NOT_FOUND, "Expired or not found").into_response(),
    }
}

async fn signup_daily_email(
    State(state): State<ApiState>,
    body: Bytes,
) -> ApiResult<SignupResponse> {
    let request: SignupRequest = parse_body(&body)?;
    let email = request.email.trim();
    if email.is_empty() {
        return Ok(Json(SignupResponse {
            success: false,
            message: "Email address required.".to_string(),
        }));
    }
    request
        .preferences
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let at = state.config.digest.schedule().map_err(ApiError::internal)?;

    let subscriber = Subscriber::new(
        email,
        request.member_number,
        request.password.trim(),
        request.preferences,
    );
    open_store(&state)?
        .upsert(&subscriber)
        .map_err(ApiError::internal)?;
    info!(email = %subscriber.email, "daily digest subscription saved");

    Ok(Json(SignupResponse {
        success: true,
        message: format!(
            "Daily emails will be sent to {} at {}.",
            subscriber.email,
            at.format("%H:%M")
        ),
    }))
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { ok: true, data })
}

/// Bodies are read as JSON whatever the content type; an empty body means defaults.
fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> std::result::Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")))
}

fn matcher_for(preferences: &Preferences) -> std::result::Result<ShiftMatcher, ApiError> {
    preferences
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(ShiftMatcher::new(preferences))
}

fn open_store(state: &ApiState) -> std::result::Result<SubscriberStore, ApiError> {
    SubscriberStore::open(&state.db_path).map_err(ApiError::internal)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::response::Html;
    use serde_json::{json, Value};
    use tokio::sync::watch;

    use super::*;
    use crate::config::{MockConfig, PortalConfig, SyncConfig};
    use crate::sync::PreferenceSyncClient;

    struct TestServer {
        base: String,
        client: reqwest::Client,
        _dir: tempfile::TempDir,
        db_path: PathBuf,
    }

    impl TestServer {
        async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
            let response = self
                .client
                .post(format!("{}{path}", self.base))
                .json(&body)
                .send()
                .await
                .expect("request sent");
            let status = response.status();
            let body = response.json().await.expect("JSON body");
            (status, body)
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    async fn start(portal_base: Option<String>) -> TestServer {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("shiftmatch.db");
        let mut config = Config::default();
        config.storage.db_path = db_path.display().to_string();
        config.mock = MockConfig {
            count: 12,
            seed: Some(5),
        };
        if let Some(base_url) = portal_base {
            config.portal = PortalConfig {
                base_url,
                ..PortalConfig::default()
            };
        }
        TestServer {
            base: serve(build_router(ApiState::new(config))).await,
            client: reqwest::Client::new(),
            _dir: dir,
            db_path,
        }
    }

    /// Portal stand-in that accepts any login and serves `shifts_html`.
    async fn fake_portal(shifts_html: &'static str) -> String {
        let app = Router::new()
            .route(
                "/services/login/",
                get(|| async {
                    Html(r#"<form id="loginform" action="/services/login/"><input name="csrfmiddlewaretoken" value="t"></form>"#)
                })
                .post(|| async { Html("<a href=\"/logout/\">Log out</a>") }),
            )
            .route("/services/home", get(|| async { Html("home") }))
            .route(
                "/services/shifts/0/0/0/:date/",
                get(move || async move { Html(shifts_html) }),
            );
        serve(app).await
    }

    #[tokio::test]
    async fn health_reports_version() {
        let server = start(None).await;
        let body: Value = server
            .client
            .get(format!("{}/health", server.base))
            .send()
            .await
            .expect("request sent")
            .json()
            .await
            .expect("JSON body");
        assert_eq!(body["ok"], true);
        assert_eq!(body["data"]["status"], "ok");
        assert_eq!(body["data"]["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn score_endpoint_ranks_and_drops_excluded() {
        let server = start(None).await;
        let (status, body) = server
            .post(
                "/api/shifts",
                json!({
                    "shifts": [
                        {"id": "a", "committee": "Office"},
                        {"id": "b", "committee": "Checkout"},
                        {"id": "c", "committee": "Produce"}
                    ],
                    "preferences": {"committees": ["Produce"], "excludedCommittees": ["Office"]}
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let ids = body["scored_shifts"]
            .as_array()
            .expect("array")
            .iter()
            .map(|s| s["shift"]["id"].as_str().unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["c", "b"]);
        assert_eq!(
            body["scored_shifts"][0]["breakdown"]["committee"],
            "Top choice: Produce (+10%)"
        );
    }

    #[tokio::test]
    async fn missing_fields_mean_empty_values() {
        let server = start(None).await;
        let (status, body) = server.post("/api/shifts", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"scored_shifts": []}));
    }

    #[tokio::test]
    async fn conflicting_preferences_are_rejected() {
        let server = start(None).await;
        let (status, body) = server
            .post(
                "/api/shifts",
                json!({"shifts": [], "preferences": {"committees": ["Office"], "excludedCommittees": ["OFFICE"]}}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
        assert!(body["error"].as_str().is_some_and(|e| e.contains("Office")));
    }

    #[tokio::test]
    async fn sync_client_rescoring_through_http() {
        let server = start(None).await;
        let (tx, rx) = watch::channel(Preferences::default());
        let sync_config = SyncConfig {
            scorer_url: format!("{}/api/shifts", server.base),
            debounce_ms: 20,
            request_timeout_secs: Some(5),
        };
        let mut client =
            PreferenceSyncClient::from_config(&sync_config, rx).expect("client builds");

        let shifts = generate_mock_shifts(6, 11);
        client.replace_results(ShiftMatcher::new(&Preferences::default()).rank(&shifts));
        let mut rendered = client.subscribe();

        let excluded = shifts[0].committee().to_string();
        tx.send_modify(|prefs| prefs.exclude(&excluded));
        client.on_preferences_changed();

        tokio::time::timeout(Duration::from_secs(5), rendered.changed())
            .await
            .expect("re-score arrives")
            .expect("sender alive");
        let results = client.results();
        assert!(results.len() < shifts.len());
        assert!(results.iter().all(|s| s.shift.committee() != excluded));
    }

    #[tokio::test]
    async fn mock_endpoint_tags_source() {
        let server = start(None).await;
        let (_, body) = server
            .post("/api/mock-shifts", json!({"preferences": {"days": ["Monday"]}}))
            .await;
        assert_eq!(body["source"], "mock");
        assert_eq!(body["scored_shifts"].as_array().map(Vec::len), Some(12));
    }

    #[tokio::test]
    async fn login_requires_credentials() {
        let server = start(None).await;
        let (_, body) = server
            .post("/api/login", json!({"member_number": " ", "password": "x"}))
            .await;
        assert_eq!(
            body,
            json!({"success": false, "message": "Member number and password are required."})
        );
    }

    #[tokio::test]
    async fn login_scores_live_shifts_and_keeps_raw_page() {
        const PAGE: &str = r#"<div class="grid-container"><div class="col"><p>Tue 3/3/2026</p>
<a class="shift" href="/services/shift_claim/5/"><b>9:00am</b> Office</a></div></div>"#;
        let server = start(Some(fake_portal(PAGE).await)).await;

        let (_, body) = server
            .post("/api/login", json!({"member_number": "42", "password": "pw"}))
            .await;
        assert_eq!(body["success"], true);
        assert_eq!(body["source"], "live");
        assert_eq!(body["scored_shifts"][0]["shift"]["committee"], "Office");

        let token = body["raw_token"].as_str().expect("token issued");
        let response = server
            .client
            .get(format!("{}/api/raw/{token}", server.base))
            .send()
            .await
            .expect("request sent");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/html")));
        assert_eq!(response.text().await.expect("body"), PAGE);
    }

    #[tokio::test]
    async fn login_falls_back_to_sample_data() {
        let server = start(Some(fake_portal("<p>No calendar</p>").await)).await;
        let (_, body) = server
            .post("/api/login", json!({"member_number": "42", "password": "pw"}))
            .await;
        assert_eq!(body["success"], true);
        assert_eq!(body["source"], "mock");
        assert_eq!(body["raw_token"], Value::Null);
        assert!(body["message"]
            .as_str()
            .is_some_and(|m| m.ends_with(MOCK_FALLBACK_NOTE)));
        assert_eq!(body["scored_shifts"].as_array().map(Vec::len), Some(12));
    }

    #[tokio::test]
    async fn unknown_raw_token_is_not_found() {
        let server = start(None).await;
        for token in [Uuid::new_v4().to_string(), "not-a-token".to_string()] {
            let response = server
                .client
                .get(format!("{}/api/raw/{token}", server.base))
                .send()
                .await
                .expect("request sent");
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(response.text().await.expect("body"), "Expired or not found");
        }
    }

    #[tokio::test]
    async fn signup_upserts_subscriber() {
        let server = start(None).await;
        let (_, body) = server
            .post("/api/signup-daily-email", json!({"email": ""}))
            .await;
        assert_eq!(body["success"], false);

        for member in ["1", "2"] {
            let (_, body) = server
                .post(
                    "/api/signup-daily-email",
                    json!({"email": "m@example.com", "member_number": member, "password": "pw"}),
                )
                .await;
            assert_eq!(body["success"], true);
            assert_eq!(
                body["message"],
                "Daily emails will be sent to m@example.com at 20:01."
            );
        }

        let store = SubscriberStore::open(&server.db_path).expect("open store");
        assert_eq!(store.count().expect("count"), 1);
        let stored = store
            .get("m@example.com")
            .expect("query")
            .expect("subscriber present");
        assert_eq!(stored.member_number, "2");
    }
}
