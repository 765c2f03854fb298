//! Gemini `generateContent` backend over reqwest.
//!
//! Only the subset of the REST API this crate needs is modelled: a single
//! user turn, an optional system instruction, and `generationConfig` with an
//! optional JSON response schema. Non-success responses are decoded from the
//! standard `{"error": {"code", "message", "status"}}` envelope and
//! classified by [`GenerationError::from_status`].

use crate::config::StudioConfig;
use crate::error::{CardsError, GenerationError};
use crate::pipeline::backend::{
    GenerationBackend, GenerationRequest, GenerationResponse, ResponseFormat,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Backend calling the Gemini REST API.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl GeminiBackend {
    /// Build a client from the config. A missing API key is not an error
    /// here; the first request fails with [`GenerationError::MissingCredential`].
    pub fn new(config: &StudioConfig) -> Result<Self, CardsError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CardsError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    async fn send(&self, request: &GenerationRequest) -> Result<GenerationResponse, GenerationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(GenerationError::MissingCredential)?;

        let body = serde_json::to_vec(&build_body(request))
            .map_err(|e| GenerationError::MalformedResponse(format!("request encoding: {e}")))?;

        let response = self
            .client
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &text));
        }

        parse_success(&text)
    }
}

impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> BoxFuture<'a, Result<GenerationResponse, GenerationError>> {
        self.send(request).boxed()
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestBody<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<&'a Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseBody {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

fn build_body(request: &GenerationRequest) -> RequestBody<'_> {
    let (mime, schema) = match &request.response_format {
        ResponseFormat::Text => (None, None),
        ResponseFormat::Json { schema } => (Some("application/json"), Some(schema)),
    };

    RequestBody {
        contents: vec![Content {
            role: Some("user"),
            parts: vec![Part {
                text: &request.prompt,
            }],
        }],
        system_instruction: request.system_instruction.as_deref().map(|text| Content {
            role: None,
            parts: vec![Part { text }],
        }),
        generation_config: GenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_output_tokens,
            response_mime_type: mime,
            response_schema: schema,
        },
    }
}

/// Turn a non-success response into a structured error.
///
/// The envelope's numeric `code` wins over the HTTP status when present, and
/// its `status` string (e.g. `RESOURCE_EXHAUSTED`) becomes the error code.
fn classify_failure(http_status: u16, body: &str) -> GenerationError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let status = envelope.error.code.unwrap_or(http_status);
            GenerationError::from_status(status, envelope.error.status, envelope.error.message)
        }
        Err(_) => {
            let snippet: String = body.chars().take(200).collect();
            GenerationError::from_status(http_status, None, snippet)
        }
    }
}

fn parse_success(body: &str) -> Result<GenerationResponse, GenerationError> {
    let parsed: ResponseBody = serde_json::from_str(body)
        .map_err(|e| GenerationError::MalformedResponse(format!("response body: {e}")))?;

    let candidate = parsed.candidates.into_iter().next().ok_or_else(|| {
        let feedback = parsed
            .prompt_feedback
            .map(|f| f.to_string())
            .unwrap_or_else(|| "no candidates".to_string());
        GenerationError::MalformedResponse(format!("empty response: {feedback}"))
    })?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(GenerationError::MalformedResponse(format!(
            "candidate has no text (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    let (prompt_tokens, completion_tokens) = parsed
        .usage_metadata
        .map(|u| (u.prompt_token_count, u.candidates_token_count))
        .unwrap_or((0, 0));
    debug!(
        "Gemini response: {} chars, {} input tokens, {} output tokens",
        text.len(),
        prompt_tokens,
        completion_tokens
    );

    Ok(GenerationResponse {
        text,
        prompt_tokens,
        completion_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_includes_schema_for_json_requests() {
        let req = GenerationRequest::text("gemini-2.5-flash", "analyse this")
            .with_system_instruction("be precise")
            .with_json_schema(json!({"type": "OBJECT"}))
            .with_temperature(0.3);
        let body = serde_json::to_value(build_body(&req)).unwrap();

        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "analyse this");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be precise");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "OBJECT");
        assert!(body["generationConfig"].get("maxOutputTokens").is_none());
    }

    #[test]
    fn text_requests_omit_mime_type() {
        let req = GenerationRequest::text("m", "p");
        let body = serde_json::to_value(build_body(&req)).unwrap();
        assert!(body["generationConfig"].get("responseMimeType").is_none());
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn quota_envelope_is_rate_limited() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = classify_failure(429, body);
        assert!(err.is_rate_limited());
    }

    #[test]
    fn non_json_failure_keeps_http_status() {
        let err = classify_failure(503, "<html>unavailable</html>");
        assert!(matches!(err, GenerationError::Service { status: 503, .. }));
    }

    #[test]
    fn bad_request_is_not_rate_limited() {
        let body = r#"{"error":{"code":400,"message":"bad","status":"INVALID_ARGUMENT"}}"#;
        let err = classify_failure(400, body);
        assert!(!err.is_rate_limited());
    }

    #[test]
    fn success_concatenates_parts_and_reads_usage() {
        let body = r#"{
            "candidates": [{"content": {"parts": [{"text": "<html>"}, {"text": "</html>"}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 34}
        }"#;
        let resp = parse_success(body).unwrap();
        assert_eq!(resp.text, "<html></html>");
        assert_eq!(resp.prompt_tokens, 12);
        assert_eq!(resp.completion_tokens, 34);
    }

    #[test]
    fn blocked_prompt_is_malformed() {
        let body = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let err = parse_success(body).unwrap_err();
        assert!(matches!(err, GenerationError::MalformedResponse(ref m) if m.contains("SAFETY")));
    }

    #[tokio::test]
    async fn missing_key_fails_on_first_call() {
        let config = StudioConfig::builder().no_api_key().build().unwrap();
        let backend = GeminiBackend::new(&config).unwrap();
        let req = GenerationRequest::text("m", "p");
        let err = backend.generate(&req).await.unwrap_err();
        assert_eq!(err, GenerationError::MissingCredential);
    }
}
