//! The studio: async entry point tying the workflow controller to the
//! generation pipeline.
//!
//! [`Studio`] is cheap to clone; clones share the same workflow. The
//! controller lock is only held for the synchronous `begin_*` / `finish_*`
//! steps, never across a network call, so a [`Studio::reset`] issued while a
//! request is in flight takes effect immediately and the late result is
//! dropped.

use crate::config::{StudioConfig, StylePreference};
use crate::error::CardsError;
use crate::model::{DesignBlueprint, GeneratedCard, UsageStats};
use crate::pipeline::analyze::BlueprintGenerator;
use crate::pipeline::backend::{GenerationBackend, GenerationResponse};
use crate::pipeline::gemini::GeminiBackend;
use crate::pipeline::render::CardRenderer;
use crate::progress::ProgressCallback;
use crate::workflow::{CardJob, Commit, WorkflowController, WorkflowSnapshot};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

/// What happened to a request once its response came back.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The result was committed to the workflow.
    Committed(T),
    /// The workflow was reset or moved on while the request was in flight.
    Discarded,
    /// Nothing was sent ("next" on the last card).
    Skipped,
}

impl<T> Outcome<T> {
    pub fn committed(self) -> Option<T> {
        match self {
            Outcome::Committed(value) => Some(value),
            Outcome::Discarded | Outcome::Skipped => None,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, Outcome::Committed(_))
    }
}

/// Document-to-cards studio.
#[derive(Clone)]
pub struct Studio {
    controller: Arc<Mutex<WorkflowController>>,
    generator: BlueprintGenerator,
    renderer: CardRenderer,
    progress: Option<ProgressCallback>,
    usage: Arc<Mutex<UsageStats>>,
}

impl Studio {
    /// Build a studio, using the configured backend or the Gemini client.
    pub fn new(config: &StudioConfig) -> Result<Self, CardsError> {
        let backend = resolve_backend(config)?;
        Ok(Self::with_backend(backend, config))
    }

    pub fn with_backend(backend: Arc<dyn GenerationBackend>, config: &StudioConfig) -> Self {
        info!("Studio using backend {}", backend.name());
        Self {
            controller: Arc::new(Mutex::new(WorkflowController::new())),
            generator: BlueprintGenerator::new(Arc::clone(&backend), config),
            renderer: CardRenderer::new(backend, config),
            progress: config.progress_callback.clone(),
            usage: Arc::new(Mutex::new(UsageStats::default())),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, WorkflowController>, CardsError> {
        self.controller
            .lock()
            .map_err(|_| CardsError::Internal("workflow lock poisoned".into()))
    }

    fn record_usage(&self, response: &GenerationResponse) {
        if let Ok(mut usage) = self.usage.lock() {
            usage.record(response.prompt_tokens, response.completion_tokens);
        }
    }

    /// Current workflow state, blueprint, card and error.
    pub fn snapshot(&self) -> Result<WorkflowSnapshot, CardsError> {
        Ok(self.lock()?.snapshot())
    }

    /// Tokens spent so far, including requests whose results were discarded.
    pub fn usage(&self) -> UsageStats {
        self.usage.lock().map(|u| *u).unwrap_or_default()
    }

    /// Return to `Idle`, dropping the blueprint, the card and any in-flight
    /// result.
    pub fn reset(&self) -> Result<(), CardsError> {
        self.lock()?.reset();
        Ok(())
    }

    /// Analyse `text` into a blueprint.
    ///
    /// Empty text fails with [`crate::WorkflowError::EmptyInput`] before any
    /// request is sent. A generation failure is recorded on the workflow
    /// (which returns to `Idle`) and returned.
    pub async fn analyze(
        &self,
        text: &str,
        style: StylePreference,
    ) -> Result<Outcome<Arc<DesignBlueprint>>, CardsError> {
        let job = {
            let mut wf = self.lock()?;
            wf.begin_analysis_with(text, style)?
        };
        if let Some(cb) = &self.progress {
            cb.on_analysis_start(job.text.len());
        }

        let result = self.generator.generate(&job.text, job.style).await;
        if let Ok((_, response)) = &result {
            self.record_usage(response);
        }

        let mut wf = self.lock()?;
        match result {
            Ok((blueprint, _)) => {
                if wf.finish_analysis(job.ticket, Ok(blueprint)) == Commit::Discarded {
                    return Ok(Outcome::Discarded);
                }
                let committed = wf.blueprint().cloned();
                match committed {
                    Some(blueprint) => {
                        drop(wf);
                        if let Some(cb) = &self.progress {
                            cb.on_blueprint_ready(blueprint.card_count());
                        }
                        Ok(Outcome::Committed(blueprint))
                    }
                    None => Err(CardsError::Internal(
                        wf.error().unwrap_or("analysis was not committed").to_string(),
                    )),
                }
            }
            Err(e) => {
                let err = CardsError::from(e);
                let message = err.user_message();
                if wf.finish_analysis(job.ticket, Err(message.clone())) == Commit::Discarded {
                    return Ok(Outcome::Discarded);
                }
                drop(wf);
                warn!("Analysis failed: {}", err);
                if let Some(cb) = &self.progress {
                    cb.on_error(&message);
                }
                Err(err)
            }
        }
    }

    /// Render card `index` of the current blueprint.
    ///
    /// A failure is recorded on the workflow (which returns to
    /// `BlueprintReady`, keeping the blueprint and the previous card) and
    /// returned.
    pub async fn render_card(&self, index: usize) -> Result<Outcome<GeneratedCard>, CardsError> {
        let job = self.lock()?.begin_card(index)?;
        self.run_card(job).await
    }

    /// Render the card after the current one. [`Outcome::Skipped`] when the
    /// current card is the last.
    pub async fn next_card(&self) -> Result<Outcome<GeneratedCard>, CardsError> {
        let next = self.lock()?.begin_next()?;
        match next {
            Some(job) => self.run_card(job).await,
            None => Ok(Outcome::Skipped),
        }
    }

    async fn run_card(&self, job: CardJob) -> Result<Outcome<GeneratedCard>, CardsError> {
        let total = job.blueprint.card_count();
        if let Some(cb) = &self.progress {
            cb.on_card_start(job.index, total);
        }

        let result = self.renderer.render(&job.blueprint, job.index).await;
        if let Ok((_, response)) = &result {
            self.record_usage(response);
        }

        let mut wf = self.lock()?;
        match result {
            Ok((card, _)) => {
                if wf.finish_card(job.ticket, Ok(card.clone())) == Commit::Discarded {
                    return Ok(Outcome::Discarded);
                }
                drop(wf);
                if let Some(cb) = &self.progress {
                    cb.on_card_complete(card.index, total, card.html.len());
                }
                Ok(Outcome::Committed(card))
            }
            Err(err) => {
                let message = err.user_message();
                if wf.finish_card(job.ticket, Err(message.clone())) == Commit::Discarded {
                    return Ok(Outcome::Discarded);
                }
                drop(wf);
                warn!("Card {} failed: {}", job.index + 1, err);
                if let Some(cb) = &self.progress {
                    cb.on_error(&message);
                }
                Err(err)
            }
        }
    }
}

fn resolve_backend(config: &StudioConfig) -> Result<Arc<dyn GenerationBackend>, CardsError> {
    if let Some(backend) = &config.backend {
        return Ok(Arc::clone(backend));
    }
    Ok(Arc::new(GeminiBackend::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CardStyle;
    use crate::error::{GenerationError, WorkflowError};
    use crate::pipeline::backend::{GenerationRequest, ResponseFormat};
    use crate::workflow::WorkflowState;
    use futures::future::BoxFuture;
    use futures::FutureExt;

    const BLUEPRINT: &str = r##"{
        "style": "nature",
        "themeColor": "#2f6b3a",
        "secondaryColor": "#f1e9d2",
        "fontPairing": {"heading": "Lora", "body": "Karla"},
        "cardOutlines": [
            {"title": "Cover", "points": []},
            {"title": "Roots", "points": ["a"]}
        ],
        "description": "earthy"
    }"##;

    /// Answers analysis requests with a blueprint and render requests with
    /// markup, or fails every call.
    struct Scripted {
        fail: Option<GenerationError>,
    }

    impl GenerationBackend for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn generate<'a>(
            &'a self,
            request: &'a GenerationRequest,
        ) -> BoxFuture<'a, Result<GenerationResponse, GenerationError>> {
            let result = match (&self.fail, &request.response_format) {
                (Some(e), _) => Err(e.clone()),
                (None, ResponseFormat::Json { .. }) => Ok(GenerationResponse::new(BLUEPRINT)),
                (None, ResponseFormat::Text) => {
                    Ok(GenerationResponse::new("```html\n<div id=\"card-container\"></div>\n```"))
                }
            };
            async move { result }.boxed()
        }
    }

    fn studio(fail: Option<GenerationError>) -> Studio {
        let config = StudioConfig::builder()
            .no_api_key()
            .max_retries(0)
            .build()
            .unwrap();
        Studio::with_backend(Arc::new(Scripted { fail }), &config)
    }

    #[tokio::test]
    async fn full_walk_through_the_deck() {
        let s = studio(None);
        let bp = s.analyze("Hello world", StylePreference::Auto).await.unwrap();
        assert_eq!(bp.committed().unwrap().card_count(), 2);

        let card = s.render_card(0).await.unwrap().committed().unwrap();
        assert_eq!(card.title, "Cover");
        let card = s.next_card().await.unwrap().committed().unwrap();
        assert_eq!(card.index, 1);
        assert_eq!(s.next_card().await.unwrap(), Outcome::Skipped);

        let snap = s.snapshot().unwrap();
        assert_eq!(snap.state, WorkflowState::CardReady);
        assert!(!snap.has_next);
        assert_eq!(s.usage().requests, 3);
    }

    #[tokio::test]
    async fn empty_text_sends_nothing() {
        let s = studio(None);
        let err = s.analyze("  ", StylePreference::Auto).await.unwrap_err();
        assert!(matches!(err, CardsError::Workflow(WorkflowError::EmptyInput)));
        assert_eq!(s.snapshot().unwrap().state, WorkflowState::Idle);
        assert_eq!(s.usage().requests, 0);
    }

    #[tokio::test]
    async fn analysis_failure_is_recorded() {
        let s = studio(Some(GenerationError::Transport("offline".into())));
        let err = s.analyze("doc", StylePreference::Auto).await.unwrap_err();
        assert!(!err.is_rate_limited());
        let snap = s.snapshot().unwrap();
        assert_eq!(snap.state, WorkflowState::Idle);
        assert!(snap.error.is_some());
    }

    #[tokio::test]
    async fn rejected_reanalysis_leaves_inputs_alone() {
        let s = studio(None);
        s.analyze("doc", StylePreference::Auto).await.unwrap();
        let err = s
            .analyze("other doc", StylePreference::Fixed(CardStyle::Retro))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CardsError::Workflow(WorkflowError::InvalidTransition { .. })
        ));

        let wf = s.lock().unwrap();
        assert_eq!(wf.input_text(), "doc");
        assert_eq!(wf.style(), StylePreference::Auto);
        assert_eq!(wf.state(), WorkflowState::BlueprintReady);
        drop(wf);
        assert_eq!(s.usage().requests, 1);
    }

    #[tokio::test]
    async fn reset_returns_to_idle() {
        let s = studio(None);
        s.analyze("doc", StylePreference::Auto).await.unwrap();
        s.reset().unwrap();
        let snap = s.snapshot().unwrap();
        assert_eq!(snap.state, WorkflowState::Idle);
        assert!(snap.blueprint.is_none());
    }
}
