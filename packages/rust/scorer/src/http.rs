//! HTTP-backed similarity scorer.
//!
//! POSTs text pairs to an embedding-similarity endpoint. Network failures,
//! timeouts, and malformed responses all degrade to `ScorerUnavailable`;
//! the endpoint being down must never take a batch down with it.

use serde::{Deserialize, Serialize};

use lineup_shared::{LineupError, Result};

use crate::{SimilarityScorer, clamp_similarity};

/// Default timeout in seconds for scoring requests.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// User-Agent string for scoring requests.
const USER_AGENT: &str = concat!("Lineup/", env!("CARGO_PKG_VERSION"));

/// Configuration for the HTTP scorer.
#[derive(Debug, Clone)]
pub struct HttpScorerConfig {
    /// Endpoint URL (e.g., `http://localhost:8089/score`).
    pub endpoint: String,
    /// Timeout for scoring requests in seconds.
    pub timeout_secs: u64,
    /// Backend identifier reported via [`SimilarityScorer::id`].
    pub scorer_id: String,
}

impl Default for HttpScorerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8089/score".into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            scorer_id: "embedding-http".into(),
        }
    }
}

/// Request body sent to the endpoint.
#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    text_a: &'a str,
    text_b: &'a str,
}

/// Response body expected from the endpoint.
#[derive(Debug, Deserialize)]
struct ScoreResponse {
    similarity: f64,
}

/// Similarity scorer backed by an HTTP embedding service.
pub struct HttpScorer {
    config: HttpScorerConfig,
    client: reqwest::Client,
}

impl HttpScorer {
    /// Build the scorer and its HTTP client.
    pub fn new(config: HttpScorerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                LineupError::scorer_unavailable(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { config, client })
    }
}

#[async_trait::async_trait]
impl SimilarityScorer for HttpScorer {
    fn id(&self) -> &str {
        &self.config.scorer_id
    }

    async fn score(&self, text_a: &str, text_b: &str) -> Result<f64> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&ScoreRequest { text_a, text_b })
            .send()
            .await
            .map_err(|e| {
                LineupError::scorer_unavailable(format!("{}: {e}", self.config.endpoint))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LineupError::scorer_unavailable(format!(
                "{}: HTTP {status}",
                self.config.endpoint
            )));
        }

        let body: ScoreResponse = response.json().await.map_err(|e| {
            LineupError::scorer_unavailable(format!(
                "{}: invalid response body: {e}",
                self.config.endpoint
            ))
        })?;

        Ok(clamp_similarity(body.similarity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(endpoint: String) -> HttpScorerConfig {
        HttpScorerConfig {
            endpoint,
            timeout_secs: 2,
            scorer_id: "embedding-http".into(),
        }
    }

    #[tokio::test]
    async fn scores_against_mock_server() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/score"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"similarity": 0.83})),
            )
            .mount(&server)
            .await;

        let scorer = HttpScorer::new(test_config(format!("{}/score", server.uri())))
            .expect("build scorer");
        let s = scorer
            .score("SUMMIT X", "SUMMIT EXPERT PACKAGE")
            .await
            .expect("score");
        assert_eq!(s, 0.83);
    }

    #[tokio::test]
    async fn server_error_degrades_to_unavailable() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/score"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let scorer = HttpScorer::new(test_config(format!("{}/score", server.uri())))
            .expect("build scorer");
        let err = scorer.score("a", "b").await.unwrap_err();
        assert!(matches!(err, LineupError::ScorerUnavailable { .. }));
    }

    #[tokio::test]
    async fn out_of_range_similarity_is_clamped() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/score"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"similarity": 1.4})),
            )
            .mount(&server)
            .await;

        let scorer = HttpScorer::new(test_config(format!("{}/score", server.uri())))
            .expect("build scorer");
        let s = scorer.score("a", "b").await.expect("score");
        assert_eq!(s, 1.0);
    }

    #[tokio::test]
    async fn unreachable_endpoint_degrades_to_unavailable() {
        // Reserved TEST-NET-1 address: nothing listens there.
        let scorer = HttpScorer::new(test_config("http://192.0.2.1:9/score".into()))
            .expect("build scorer");
        let err = scorer.score("a", "b").await.unwrap_err();
        assert!(matches!(err, LineupError::ScorerUnavailable { .. }));
    }
}
