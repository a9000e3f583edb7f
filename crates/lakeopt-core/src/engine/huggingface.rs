//! Hugging Face text-generation inference client.
//!
//! Sends the rendered prompt to a hosted model and parses the generated text
//! back into an [`OptimizationResult`].  One HTTP request per call.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::engine::prompt::PromptRenderer;
use crate::engine::{EngineError, OptimizationEngine};
use crate::model::{OptimizationRequest, OptimizationResult};

/// Default hosted model endpoint.
pub const DEFAULT_INFERENCE_URL: &str =
    "https://api-inference.huggingface.co/models/google/gemma-7b-it";

/// Longest slice of an error body carried into an error message.
const ERROR_BODY_CHARS: usize = 500;

/// Connection settings for [`HuggingFaceEngine`].
#[derive(Debug, Clone)]
pub struct HuggingFaceConfig {
    /// Inference endpoint URL.
    pub url: String,
    /// Bearer token.  Calls fail with [`EngineError::Unavailable`] while unset.
    pub token: Option<String>,
    pub max_new_tokens: u32,
    pub temperature: f32,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl Default for HuggingFaceConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_INFERENCE_URL.to_owned(),
            token: None,
            max_new_tokens: 2048,
            temperature: 0.3,
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    inputs: &'a str,
    parameters: GenerateParameters,
}

#[derive(Serialize)]
struct GenerateParameters {
    max_new_tokens: u32,
    temperature: f32,
    return_full_text: bool,
}

#[derive(Deserialize)]
struct Generation {
    generated_text: String,
}

/// [`OptimizationEngine`] backed by a hosted text-generation model.
#[derive(Debug)]
pub struct HuggingFaceEngine {
    client: reqwest::Client,
    config: HuggingFaceConfig,
    prompt: PromptRenderer,
}

impl HuggingFaceEngine {
    pub fn new(config: HuggingFaceConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| EngineError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        let prompt = PromptRenderer::new()
            .map_err(|e| EngineError::Failed(format!("invalid prompt template: {e}")))?;
        Ok(Self {
            client,
            config,
            prompt,
        })
    }
}

#[async_trait]
impl OptimizationEngine for HuggingFaceEngine {
    async fn optimize(
        &self,
        request: &OptimizationRequest,
    ) -> Result<OptimizationResult, EngineError> {
        let token = self.config.token.as_deref().ok_or_else(|| {
            EngineError::Unavailable("engine credential (HF_TOKEN) is not configured".to_owned())
        })?;
        let prompt = self
            .prompt
            .render(request)
            .map_err(|e| EngineError::Failed(format!("failed to render prompt: {e}")))?;

        debug!(url = %self.config.url, prompt_chars = prompt.len(), "sending inference request");
        let response = self
            .client
            .post(&self.config.url)
            .bearer_auth(token)
            .json(&GenerateRequest {
                inputs: &prompt,
                parameters: GenerateParameters {
                    max_new_tokens: self.config.max_new_tokens,
                    temperature: self.config.temperature,
                    return_full_text: false,
                },
            })
            .send()
            .await
            .map_err(|e| EngineError::Unavailable(format!("inference request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!(
                "inference endpoint returned {status}: {}",
                truncate(&body, ERROR_BODY_CHARS)
            );
            warn!(%status, "inference endpoint rejected request");
            return Err(if status == StatusCode::SERVICE_UNAVAILABLE {
                EngineError::Unavailable(message)
            } else {
                EngineError::Failed(message)
            });
        }

        let generations: Vec<Generation> = response.json().await.map_err(|e| {
            if e.is_timeout() {
                EngineError::Unavailable(format!("inference response timed out: {e}"))
            } else {
                EngineError::Failed(format!("unexpected inference response shape: {e}"))
            }
        })?;
        let text = generations
            .into_iter()
            .next()
            .map(|g| g.generated_text)
            .ok_or_else(|| EngineError::Failed("inference response has no generations".to_owned()))?;

        info!(generated_chars = text.len(), "received generated proposal");
        parse_generated(&text)
    }
}

/// Parse model output into a proposal, tolerating markdown fences and chatter
/// around the JSON object.
pub fn parse_generated(text: &str) -> Result<OptimizationResult, EngineError> {
    let body = strip_code_fence(text.trim());
    let json = match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => {
            return Err(EngineError::Failed(
                "generated text contains no JSON object".to_owned(),
            ));
        }
    };
    serde_json::from_str(json)
        .map_err(|e| EngineError::Failed(format!("generated text is not a valid proposal: {e}")))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    match rest.find("```") {
        Some(end) => rest[..end].trim(),
        None => rest.trim(),
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DdlStatement, QueryItem};

    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    const PROPOSAL: &str = r#"{"ddl":[{"statement":"CREATE SCHEMA lake.opt"}],"migrations":[],"queries":[{"queryid":"q1","query":"SELECT * FROM lake.opt.t"}]}"#;

    fn request() -> OptimizationRequest {
        OptimizationRequest {
            url: "jdbc:trino://localhost".to_owned(),
            ddl: vec![DdlStatement::new("CREATE TABLE lake.raw.t (id int)")],
            queries: vec![QueryItem {
                queryid: "q1".to_owned(),
                query: "SELECT * FROM lake.raw.t".to_owned(),
                runquantity: 10,
            }],
        }
    }

    /// Serve `router` on an ephemeral port and return the model URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/models/test")
    }

    fn engine(url: String, token: Option<&str>) -> HuggingFaceEngine {
        HuggingFaceEngine::new(HuggingFaceConfig {
            url,
            token: token.map(str::to_owned),
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn fenced_generation_is_parsed() {
        let router = Router::new().route(
            "/models/test",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let authorized = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    == Some("Bearer secret");
                let well_formed = body["parameters"]["return_full_text"] == json!(false)
                    && body["inputs"].as_str().is_some_and(|p| p.contains("q1: SELECT"));
                if !authorized || !well_formed {
                    return (axum::http::StatusCode::BAD_REQUEST, Json(json!({"error": "bad"})));
                }
                let text = format!("```json\n{PROPOSAL}\n```");
                (axum::http::StatusCode::OK, Json(json!([{ "generated_text": text }])))
            }),
        );
        let url = serve(router).await;

        let result = engine(url, Some("secret")).optimize(&request()).await.unwrap();
        assert_eq!(result.ddl[0].statement, "CREATE SCHEMA lake.opt");
        assert_eq!(result.queries[0].queryid, "q1");
    }

    #[tokio::test]
    async fn service_unavailable_maps_to_unavailable() {
        let router = Router::new().route(
            "/models/test",
            post(|| async {
                (
                    axum::http::StatusCode::SERVICE_UNAVAILABLE,
                    "model is loading",
                )
            }),
        );
        let url = serve(router).await;

        let err = engine(url, Some("t")).optimize(&request()).await.unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(m) if m.contains("model is loading")));
    }

    #[tokio::test]
    async fn server_error_maps_to_failed() {
        let router = Router::new().route(
            "/models/test",
            post(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let url = serve(router).await;

        let err = engine(url, Some("t")).optimize(&request()).await.unwrap_err();
        assert!(matches!(err, EngineError::Failed(m) if m.contains("500")));
    }

    #[tokio::test]
    async fn unexpected_response_shape_is_failed() {
        let router = Router::new().route(
            "/models/test",
            post(|| async { Json(json!({ "generated_text": "not a list" })) }),
        );
        let url = serve(router).await;

        let err = engine(url, Some("t")).optimize(&request()).await.unwrap_err();
        assert!(matches!(err, EngineError::Failed(_)));
    }

    #[tokio::test]
    async fn missing_token_is_unavailable() {
        let err = engine("http://127.0.0.1:9/models/test".to_owned(), None)
            .optimize(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(m) if m.contains("HF_TOKEN")));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = engine(format!("http://{addr}/models/test"), Some("t"))
            .optimize(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)));
    }

    #[test]
    fn parse_accepts_bare_and_chatty_output() {
        assert!(parse_generated(PROPOSAL).is_ok());
        assert!(parse_generated(&format!("Here is the plan:\n{PROPOSAL}\nGood luck.")).is_ok());
        assert!(parse_generated(&format!("```\n{PROPOSAL}\n```")).is_ok());
    }

    #[test]
    fn parse_rejects_non_json_and_wrong_shape() {
        assert!(matches!(
            parse_generated("I cannot help with that."),
            Err(EngineError::Failed(_))
        ));
        assert!(matches!(
            parse_generated(r#"{"ddl": "CREATE SCHEMA x.y"}"#),
            Err(EngineError::Failed(_))
        ));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
