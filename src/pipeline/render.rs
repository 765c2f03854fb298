//! Card rendering: one free-text call per requested card index.
//!
//! Cards are rendered on demand, never eagerly for the whole blueprint. Each
//! call sees the shared, read-only blueprint plus the card's position, and
//! returns one self-contained HTML document extracted from the model's answer
//! by [`extract_markup`].

use crate::config::StudioConfig;
use crate::error::{CardsError, GenerationError, WorkflowError};
use crate::model::{DesignBlueprint, GeneratedCard};
use crate::pipeline::backend::{GenerationBackend, GenerationRequest, GenerationResponse};
use crate::pipeline::postprocess::extract_markup;
use crate::pipeline::retry::{with_retry, RetryPolicy};
use crate::progress::ProgressCallback;
use crate::prompts::{render_prompt, RENDER_SYSTEM_PROMPT};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Synthesises the HTML document for one card of a blueprint.
#[derive(Clone)]
pub struct CardRenderer {
    backend: Arc<dyn GenerationBackend>,
    model: String,
    temperature: f32,
    max_output_tokens: Option<u32>,
    retry: RetryPolicy,
    progress: Option<ProgressCallback>,
}

impl CardRenderer {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: &StudioConfig) -> Self {
        Self {
            backend,
            model: config.render_model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            retry: RetryPolicy::new(config.max_retries, config.retry_backoff()),
            progress: config.progress_callback.clone(),
        }
    }

    /// Build the render request for `index`, checking it is in range.
    pub fn build_request(
        &self,
        blueprint: &DesignBlueprint,
        index: usize,
    ) -> Result<GenerationRequest, WorkflowError> {
        let total = blueprint.card_count();
        if index >= total {
            return Err(WorkflowError::CardIndexOutOfRange { index, total });
        }
        Ok(GenerationRequest::text(&self.model, render_prompt(blueprint, index))
            .with_system_instruction(RENDER_SYSTEM_PROMPT)
            .with_temperature(self.temperature)
            .with_max_output_tokens(self.max_output_tokens))
    }

    /// Render card `index`, retrying rate-limited calls.
    pub async fn render(
        &self,
        blueprint: &DesignBlueprint,
        index: usize,
    ) -> Result<(GeneratedCard, GenerationResponse), CardsError> {
        let start = Instant::now();
        let request = self.build_request(blueprint, index)?;
        let title = blueprint.card_outlines[index].title.clone();
        info!(
            "Rendering card {}/{} \"{}\" with {}",
            index + 1,
            blueprint.card_count(),
            title,
            self.backend.name()
        );

        let label = format!("card {}", index + 1);
        let response = with_retry(
            &self.retry,
            |attempt, delay| {
                if let Some(cb) = &self.progress {
                    cb.on_retry(&label, attempt, delay);
                }
            },
            || self.backend.generate(&request),
        )
        .await?;

        let html = extract_markup(&response.text);
        if html.is_empty() {
            return Err(GenerationError::MalformedResponse(format!(
                "card {} came back without markup",
                index + 1
            ))
            .into());
        }
        debug!(
            "Card {}: {} bytes of markup, {} output tokens, {:?}",
            index + 1,
            html.len(),
            response.completion_tokens,
            start.elapsed()
        );

        Ok((GeneratedCard { index, html, title }, response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CardStyle;
    use crate::model::{CardOutline, FontPairing};
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::Mutex;

    struct Echo {
        answer: &'static str,
        seen: Mutex<Vec<String>>,
    }

    impl GenerationBackend for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn generate<'a>(
            &'a self,
            request: &'a GenerationRequest,
        ) -> BoxFuture<'a, Result<GenerationResponse, GenerationError>> {
            self.seen.lock().unwrap().push(request.prompt.clone());
            async move { Ok(GenerationResponse::new(self.answer)) }.boxed()
        }
    }

    fn blueprint(n: usize) -> DesignBlueprint {
        DesignBlueprint {
            style: CardStyle::Elegant,
            theme_color: "#000".into(),
            secondary_color: "#fff".into(),
            font_pairing: FontPairing {
                heading: "Cormorant".into(),
                body: "Source Sans 3".into(),
            },
            card_outlines: (0..n)
                .map(|i| CardOutline {
                    title: format!("Card {i}"),
                    points: vec![format!("point {i}")],
                })
                .collect(),
            description: String::new(),
        }
    }

    fn renderer(answer: &'static str) -> (CardRenderer, Arc<Echo>) {
        let backend = Arc::new(Echo {
            answer,
            seen: Mutex::new(Vec::new()),
        });
        let config = StudioConfig::builder().no_api_key().build().unwrap();
        (CardRenderer::new(backend.clone(), &config), backend)
    }

    #[tokio::test]
    async fn renders_and_strips_fence() {
        let (r, backend) = renderer("```html\n<html>ok</html>\n```");
        let (card, _) = r.render(&blueprint(3), 1).await.unwrap();
        assert_eq!(card.index, 1);
        assert_eq!(card.title, "Card 1");
        assert_eq!(card.html, "<html>ok</html>");
        let seen = backend.seen.lock().unwrap();
        assert!(seen[0].contains("Design card 2 of 3"));
    }

    #[tokio::test]
    async fn out_of_range_index_sends_nothing() {
        let (r, backend) = renderer("<html></html>");
        let err = r.render(&blueprint(2), 2).await.unwrap_err();
        assert!(matches!(
            err,
            CardsError::Workflow(WorkflowError::CardIndexOutOfRange { index: 2, total: 2 })
        ));
        assert!(backend.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_markup_is_malformed() {
        let (r, _) = renderer("```html\n\n```");
        let err = r.render(&blueprint(1), 0).await.unwrap_err();
        assert!(matches!(
            err,
            CardsError::Generation(GenerationError::MalformedResponse(_))
        ));
    }
}
