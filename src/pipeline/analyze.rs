//! Blueprint generation: one structured call per document.
//!
//! The analysis request carries the document, the style instruction and the
//! [`blueprint_response_schema`]; the answer is parsed into a
//! [`DesignBlueprint`]. Empty text is *not* rejected here (the workflow
//! controller owns input validation), but an answer without card outlines is:
//! every later render call indexes into them.

use crate::config::{StudioConfig, StylePreference};
use crate::error::GenerationError;
use crate::model::{blueprint_response_schema, DesignBlueprint};
use crate::pipeline::backend::{GenerationBackend, GenerationRequest, GenerationResponse};
use crate::pipeline::postprocess::extract_json;
use crate::pipeline::retry::{with_retry, RetryPolicy};
use crate::progress::ProgressCallback;
use crate::prompts::{analysis_prompt, ANALYSIS_SYSTEM_PROMPT};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Produces a [`DesignBlueprint`] from raw document text.
#[derive(Clone)]
pub struct BlueprintGenerator {
    backend: Arc<dyn GenerationBackend>,
    model: String,
    temperature: f32,
    max_output_tokens: Option<u32>,
    retry: RetryPolicy,
    progress: Option<ProgressCallback>,
}

impl BlueprintGenerator {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: &StudioConfig) -> Self {
        Self {
            backend,
            model: config.analysis_model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            retry: RetryPolicy::new(config.max_retries, config.retry_backoff()),
            progress: config.progress_callback.clone(),
        }
    }

    /// Build the analysis request without sending it.
    pub fn build_request(&self, text: &str, style: StylePreference) -> GenerationRequest {
        GenerationRequest::text(&self.model, analysis_prompt(text, style))
            .with_system_instruction(ANALYSIS_SYSTEM_PROMPT)
            .with_json_schema(blueprint_response_schema())
            .with_temperature(self.temperature)
            .with_max_output_tokens(self.max_output_tokens)
    }

    /// Analyse `text` into a blueprint, retrying rate-limited calls.
    ///
    /// Returns the blueprint together with the raw response (for token
    /// accounting).
    pub async fn generate(
        &self,
        text: &str,
        style: StylePreference,
    ) -> Result<(DesignBlueprint, GenerationResponse), GenerationError> {
        let start = Instant::now();
        let request = self.build_request(text, style);
        info!(
            "Analysing document ({} chars, style {}) with {}",
            text.len(),
            style,
            self.backend.name()
        );

        let response = with_retry(
            &self.retry,
            |attempt, delay| {
                if let Some(cb) = &self.progress {
                    cb.on_retry("analysis", attempt, delay);
                }
            },
            || self.backend.generate(&request),
        )
        .await?;

        let blueprint = parse_blueprint(&response.text)?;
        debug!(
            "Blueprint: {} cards, style {}, {:?}",
            blueprint.card_count(),
            blueprint.style,
            start.elapsed()
        );
        Ok((blueprint, response))
    }
}

/// Parse and validate the structured analysis answer.
pub fn parse_blueprint(raw: &str) -> Result<DesignBlueprint, GenerationError> {
    let blueprint: DesignBlueprint = serde_json::from_str(extract_json(raw))
        .map_err(|e| GenerationError::MalformedResponse(format!("blueprint: {e}")))?;

    if blueprint.card_outlines.is_empty() {
        return Err(GenerationError::MalformedResponse(
            "blueprint has no card outlines".into(),
        ));
    }
    Ok(blueprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CardStyle;
    use crate::pipeline::backend::ResponseFormat;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicU32, Ordering};

    const VALID: &str = r##"{
        "style": "vibrant",
        "themeColor": "#ff0066",
        "secondaryColor": "#00ccff",
        "fontPairing": {"heading": "Poppins", "body": "Nunito"},
        "cardOutlines": [{"title": "Cover", "points": ["p"]}],
        "description": "bright"
    }"##;

    struct Fixed {
        answer: Result<&'static str, GenerationError>,
        calls: AtomicU32,
    }

    impl GenerationBackend for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn generate<'a>(
            &'a self,
            _request: &'a GenerationRequest,
        ) -> BoxFuture<'a, Result<GenerationResponse, GenerationError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let answer = self.answer.clone().map(GenerationResponse::new);
            async move { answer }.boxed()
        }
    }

    fn generator(answer: Result<&'static str, GenerationError>) -> (BlueprintGenerator, Arc<Fixed>) {
        let backend = Arc::new(Fixed {
            answer,
            calls: AtomicU32::new(0),
        });
        let config = StudioConfig::builder().no_api_key().build().unwrap();
        (BlueprintGenerator::new(backend.clone(), &config), backend)
    }

    #[test]
    fn request_uses_schema_and_analysis_model() {
        let (gen, _) = generator(Ok(VALID));
        let req = gen.build_request("doc", StylePreference::Fixed(CardStyle::Retro));
        assert_eq!(req.model, crate::config::DEFAULT_MODEL);
        assert!(matches!(req.response_format, ResponseFormat::Json { .. }));
        assert!(req.prompt.contains("retro"));
    }

    #[tokio::test]
    async fn parses_valid_answer() {
        let (gen, backend) = generator(Ok(VALID));
        let (bp, _) = gen.generate("Hello world", StylePreference::Auto).await.unwrap();
        assert_eq!(bp.style, CardStyle::Vibrant);
        assert_eq!(bp.card_outlines[0].title, "Cover");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_answer_fails_without_retry() {
        let (gen, backend) = generator(Ok("not json at all"));
        let err = gen.generate("x", StylePreference::Auto).await.unwrap_err();
        assert!(matches!(err, GenerationError::MalformedResponse(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_outline_list_is_rejected() {
        let raw = VALID.replace(r#"[{"title": "Cover", "points": ["p"]}]"#, "[]");
        assert!(parse_blueprint(&raw).is_err());
    }

    #[test]
    fn unknown_style_is_rejected() {
        let raw = VALID.replace("vibrant", "baroque");
        assert!(parse_blueprint(&raw).is_err());
    }

    #[test]
    fn fenced_json_is_accepted() {
        let raw = format!("```json\n{VALID}\n```");
        assert!(parse_blueprint(&raw).is_ok());
    }
}
