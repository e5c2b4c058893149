use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::preferences::Preferences;
use crate::scoring::{ScoredShift, ShiftMatcher};
use crate::shift::Shift;
use crate::sync::error::SyncError;

const CONNECT_TIMEOUT_SECS: u64 = 6;
const ERROR_PREVIEW_CHARS: usize = 180;

/// Body of a re-score request: the opaque shifts plus the current filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreRequest {
    #[serde(default)]
    pub shifts: Vec<Shift>,
    #[serde(default)]
    pub preferences: Preferences,
}

/// An absent `scored_shifts` field decodes as an empty list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreResponse {
    #[serde(default)]
    pub scored_shifts: Vec<ScoredShift>,
}

#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, request: &ScoreRequest) -> Result<ScoreResponse, SyncError>;
}

/// Scorer reached over HTTP (`POST /api/shifts`).
#[derive(Debug, Clone)]
pub struct HttpScorer {
    client: Client,
    endpoint: String,
}

impl HttpScorer {
    pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> Result<Self, SyncError> {
        let mut builder = Client::builder()
            .user_agent(concat!("shiftmatch/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::with_client(builder.build()?, endpoint))
    }

    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Scorer for HttpScorer {
    async fn score(&self, request: &ScoreRequest) -> Result<ScoreResponse, SyncError> {
        debug!(
            endpoint = %self.endpoint,
            shifts = request.shifts.len(),
            "posting re-score request"
        );
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let preview: String = body.chars().take(ERROR_PREVIEW_CHARS).collect();
            return Err(SyncError::Transport(format!(
                "POST {} returned {status}: {preview}",
                self.endpoint
            )));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

/// In-process scorer backed by [`ShiftMatcher`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalScorer;

#[async_trait]
impl Scorer for LocalScorer {
    async fn score(&self, request: &ScoreRequest) -> Result<ScoreResponse, SyncError> {
        request
            .preferences
            .validate()
            .map_err(|e| SyncError::Transport(format!("preferences rejected: {e}")))?;
        let matcher = ShiftMatcher::new(&request.preferences);
        Ok(ScoreResponse {
            scored_shifts: matcher.rank(&request.shifts),
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use serde_json::json;

    use super::*;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}/api/shifts")
    }

    fn request() -> ScoreRequest {
        ScoreRequest {
            shifts: vec![Shift::new(json!({"id": 1}))],
            preferences: Preferences {
                days: vec!["Mon".to_string()],
                committees: vec!["Receiving".to_string()],
                ..Preferences::default()
            },
        }
    }

    #[test]
    fn request_body_matches_wire_shape() {
        assert_eq!(
            serde_json::to_string(&request()).expect("serializable"),
            r#"{"shifts":[{"id":1}],"preferences":{"days":["Mon"],"times":[],"committees":["Receiving"],"excludedCommittees":[]}}"#
        );
    }

    #[test]
    fn response_without_scored_shifts_is_empty() {
        let response: ScoreResponse =
            serde_json::from_str(r#"{"source":"mock"}"#).expect("valid response");
        assert!(response.scored_shifts.is_empty());
    }

    #[tokio::test]
    async fn http_scorer_posts_request_and_decodes_response() {
        let app = Router::new().route(
            "/api/shifts",
            post(|axum::Json(body): axum::Json<serde_json::Value>| async move {
                let shift = body["shifts"][0].clone();
                axum::Json(json!({
                    "scored_shifts": [
                        {"shift": shift, "score": 88, "breakdown": {"day": "Mon is a preferred day"}}
                    ]
                }))
            }),
        );
        let endpoint = serve(app).await;
        let scorer = HttpScorer::new(endpoint, None).expect("client builds");

        let response = scorer.score(&request()).await.expect("score succeeds");
        assert_eq!(response.scored_shifts.len(), 1);
        assert_eq!(response.scored_shifts[0].score, 88);
        assert_eq!(response.scored_shifts[0].shift.as_value(), &json!({"id": 1}));
    }

    #[tokio::test]
    async fn non_success_status_is_a_transport_failure() {
        let app = Router::new().route(
            "/api/shifts",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let scorer = HttpScorer::new(serve(app).await, None).expect("client builds");
        let err = scorer.score(&request()).await.expect_err("500 must fail");
        assert!(matches!(err, SyncError::Transport(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn malformed_body_is_a_parse_failure() {
        let app = Router::new().route("/api/shifts", post(|| async { "{not json" }));
        let scorer = HttpScorer::new(serve(app).await, None).expect("client builds");
        let err = scorer.score(&request()).await.expect_err("bad JSON must fail");
        assert!(matches!(err, SyncError::Parse(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn unreachable_scorer_is_a_transport_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);
        let scorer =
            HttpScorer::new(format!("http://{addr}/api/shifts"), None).expect("client builds");
        let err = scorer.score(&request()).await.expect_err("nothing listening");
        assert!(err.is_failure());
    }

    #[tokio::test]
    async fn local_scorer_ranks_in_process() {
        let response = tokio_test::assert_ok!(LocalScorer.score(&request()).await);
        assert_eq!(response.scored_shifts.len(), 1);

        let mut conflicting = request();
        conflicting.preferences.excluded_committees = vec!["receiving".to_string()];
        tokio_test::assert_err!(LocalScorer.score(&conflicting).await);
    }
}
