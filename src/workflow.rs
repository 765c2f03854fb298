//! The workflow controller: an explicit state machine over the two-phase
//! generation workflow.
//!
//! ```text
//!            start analysis (non-empty text)
//!   Idle ──────────────────────────────▶ Analyzing
//!    ▲  ◀──────── analysis failed ─────────┘ │ analysis succeeded
//!    │                                       ▼
//!    │          render failed         BlueprintReady ◀─┐
//!    │     ┌─────────────────────────────▶  │          │
//!    │     │                                │ request  │ render failed
//!    │  GeneratingCard ◀────────────────────┘ card     │
//!    │     │  ▲                                        │
//!    │     │  └──── request card / next ─── CardReady  │
//!    │     └── render succeeded ─────────▶     │       │
//!    │                                         └───────┘
//!    └──────────── reset (from any state) ──────────────
//! ```
//!
//! There is no resting error state: failures fall back to `Idle` (analysis)
//! or `BlueprintReady` (render) with an error message attached.
//!
//! Requests are split into `begin_*` / `finish_*` so the async call happens
//! outside the controller. Every `begin_*` and every reset bumps an epoch;
//! a `finish_*` whose ticket carries an older epoch is discarded, so a slow
//! response can never overwrite newer state.

use crate::config::StylePreference;
use crate::error::WorkflowError;
use crate::model::{DesignBlueprint, GeneratedCard};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Resting and in-flight states of the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum WorkflowState {
    #[default]
    Idle,
    Analyzing,
    BlueprintReady,
    GeneratingCard,
    CardReady,
}

/// Inputs to the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowEvent {
    StartAnalysis,
    AnalysisSucceeded,
    AnalysisFailed,
    RequestCard,
    RequestNext,
    RenderSucceeded,
    RenderFailed,
    Reset,
}

impl WorkflowState {
    /// The transition table. `None` means the event is not accepted here.
    pub fn on(self, event: WorkflowEvent) -> Option<WorkflowState> {
        use WorkflowEvent as E;
        use WorkflowState as S;

        match (self, event) {
            (_, E::Reset) => Some(S::Idle),
            (S::Idle, E::StartAnalysis) => Some(S::Analyzing),
            (S::Analyzing, E::AnalysisSucceeded) => Some(S::BlueprintReady),
            (S::Analyzing, E::AnalysisFailed) => Some(S::Idle),
            (S::BlueprintReady | S::CardReady, E::RequestCard) => Some(S::GeneratingCard),
            (S::CardReady, E::RequestNext) => Some(S::GeneratingCard),
            (S::GeneratingCard, E::RenderSucceeded) => Some(S::CardReady),
            (S::GeneratingCard, E::RenderFailed) => Some(S::BlueprintReady),
            (
                S::Idle | S::Analyzing | S::BlueprintReady | S::GeneratingCard | S::CardReady,
                E::StartAnalysis
                | E::AnalysisSucceeded
                | E::AnalysisFailed
                | E::RequestCard
                | E::RequestNext
                | E::RenderSucceeded
                | E::RenderFailed,
            ) => None,
        }
    }

    /// A request is in flight; new generation requests are rejected.
    pub fn is_busy(self) -> bool {
        matches!(self, WorkflowState::Analyzing | WorkflowState::GeneratingCard)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowState::Idle => "idle",
            WorkflowState::Analyzing => "analyzing",
            WorkflowState::BlueprintReady => "blueprint-ready",
            WorkflowState::GeneratingCard => "generating-card",
            WorkflowState::CardReady => "card-ready",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a `finish_*` call changed the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    Applied,
    /// The ticket was stale (reset or newer request since it was issued).
    Discarded,
}

/// Proof of an in-flight analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisTicket {
    epoch: u64,
}

/// Proof of an in-flight card render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardTicket {
    epoch: u64,
    index: usize,
}

impl CardTicket {
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Everything the caller needs to run an analysis outside the controller.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub ticket: AnalysisTicket,
    pub text: String,
    pub style: StylePreference,
}

/// Everything the caller needs to run a render outside the controller.
#[derive(Debug, Clone)]
pub struct CardJob {
    pub ticket: CardTicket,
    pub blueprint: Arc<DesignBlueprint>,
    pub index: usize,
}

/// Point-in-time copy of the observable workflow state.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSnapshot {
    pub state: WorkflowState,
    pub blueprint: Option<Arc<DesignBlueprint>>,
    pub current_card: Option<GeneratedCard>,
    pub pending_index: Option<usize>,
    pub error: Option<String>,
    pub has_next: bool,
}

/// Single owner of the workflow state, blueprint and current card.
#[derive(Debug, Default)]
pub struct WorkflowController {
    state: WorkflowState,
    input_text: String,
    style: StylePreference,
    blueprint: Option<Arc<DesignBlueprint>>,
    current_card: Option<GeneratedCard>,
    pending_index: Option<usize>,
    error: Option<String>,
    epoch: u64,
}

impl WorkflowController {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn input_text(&self) -> &str {
        &self.input_text
    }

    pub fn style(&self) -> StylePreference {
        self.style
    }

    pub fn blueprint(&self) -> Option<&Arc<DesignBlueprint>> {
        self.blueprint.as_ref()
    }

    pub fn current_card(&self) -> Option<&GeneratedCard> {
        self.current_card.as_ref()
    }

    /// Index being rendered while in `GeneratingCard`.
    pub fn pending_index(&self) -> Option<usize> {
        self.pending_index
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// `true` when "next" would issue a request.
    pub fn has_next(&self) -> bool {
        self.next_index().is_some()
    }

    fn next_index(&self) -> Option<usize> {
        if self.state != WorkflowState::CardReady {
            return None;
        }
        let current = self.current_card.as_ref()?.index;
        let last = self.blueprint.as_ref()?.last_index()?;
        (current < last).then_some(current + 1)
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            state: self.state,
            blueprint: self.blueprint.clone(),
            current_card: self.current_card.clone(),
            pending_index: self.pending_index,
            error: self.error.clone(),
            has_next: self.has_next(),
        }
    }

    // ── Inputs ───────────────────────────────────────────────────────────

    pub fn set_input_text(&mut self, text: impl Into<String>) -> Result<(), WorkflowError> {
        self.ensure_not_busy()?;
        self.input_text = text.into();
        Ok(())
    }

    pub fn set_style(&mut self, style: StylePreference) -> Result<(), WorkflowError> {
        self.ensure_not_busy()?;
        self.style = style;
        Ok(())
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    // ── Analysis ─────────────────────────────────────────────────────────

    /// `Idle → Analyzing` using the stored input text and style.
    ///
    /// Empty or whitespace-only text is rejected without a state change.
    pub fn begin_analysis(&mut self) -> Result<AnalysisJob, WorkflowError> {
        let next = self.transition(WorkflowEvent::StartAnalysis, "start analysis")?;
        if self.input_text.trim().is_empty() {
            return Err(WorkflowError::EmptyInput);
        }

        self.epoch += 1;
        self.state = next;
        self.error = None;
        info!("Workflow: {} (epoch {})", self.state, self.epoch);

        Ok(AnalysisJob {
            ticket: AnalysisTicket { epoch: self.epoch },
            text: self.input_text.clone(),
            style: self.style,
        })
    }

    /// Store `text` and `style`, then start the analysis.
    ///
    /// The transition and the input are checked first, so a rejected request
    /// leaves the stored input untouched.
    pub fn begin_analysis_with(
        &mut self,
        text: &str,
        style: StylePreference,
    ) -> Result<AnalysisJob, WorkflowError> {
        self.transition(WorkflowEvent::StartAnalysis, "start analysis")?;
        if text.trim().is_empty() {
            return Err(WorkflowError::EmptyInput);
        }
        self.input_text = text.to_string();
        self.style = style;
        self.begin_analysis()
    }

    /// Commit an analysis result. `Err` carries the user-facing message.
    pub fn finish_analysis(
        &mut self,
        ticket: AnalysisTicket,
        result: Result<DesignBlueprint, String>,
    ) -> Commit {
        if ticket.epoch != self.epoch || self.state != WorkflowState::Analyzing {
            debug!("Discarding stale analysis result (epoch {})", ticket.epoch);
            return Commit::Discarded;
        }

        match result {
            Ok(blueprint) if !blueprint.card_outlines.is_empty() => {
                self.blueprint = Some(Arc::new(blueprint));
                self.current_card = None;
                self.error = None;
                self.state = WorkflowState::BlueprintReady;
            }
            Ok(_) => {
                self.fail_analysis("The analysis produced no cards. Please try again.".into());
            }
            Err(message) => self.fail_analysis(message),
        }
        info!("Workflow: {}", self.state);
        Commit::Applied
    }

    fn fail_analysis(&mut self, message: String) {
        self.blueprint = None;
        self.error = Some(message);
        self.state = WorkflowState::Analyzing
            .on(WorkflowEvent::AnalysisFailed)
            .unwrap_or(WorkflowState::Idle);
    }

    // ── Cards ────────────────────────────────────────────────────────────

    /// `BlueprintReady | CardReady → GeneratingCard` for card `index`.
    pub fn begin_card(&mut self, index: usize) -> Result<CardJob, WorkflowError> {
        let next = self.transition(WorkflowEvent::RequestCard, "render a card")?;
        self.start_card(next, index)
    }

    /// `CardReady → GeneratingCard` for the card after the current one.
    ///
    /// Returns `Ok(None)` without touching anything when the current card is
    /// the last one.
    pub fn begin_next(&mut self) -> Result<Option<CardJob>, WorkflowError> {
        let next = self.transition(WorkflowEvent::RequestNext, "render the next card")?;
        match self.next_index() {
            Some(index) => self.start_card(next, index).map(Some),
            None => {
                debug!("Next card requested on the last card; nothing to do");
                Ok(None)
            }
        }
    }

    fn start_card(&mut self, next: WorkflowState, index: usize) -> Result<CardJob, WorkflowError> {
        let blueprint = self
            .blueprint
            .clone()
            .ok_or(WorkflowError::InvalidTransition {
                action: "render a card",
                state: "missing a blueprint",
            })?;
        let total = blueprint.card_count();
        if index >= total {
            return Err(WorkflowError::CardIndexOutOfRange { index, total });
        }

        self.epoch += 1;
        self.state = next;
        self.pending_index = Some(index);
        self.error = None;
        info!("Workflow: {} card {}/{} (epoch {})", self.state, index + 1, total, self.epoch);

        Ok(CardJob {
            ticket: CardTicket {
                epoch: self.epoch,
                index,
            },
            blueprint,
            index,
        })
    }

    /// Commit a render result. `Err` carries the user-facing message.
    ///
    /// On failure the blueprint and the previous card are kept.
    pub fn finish_card(
        &mut self,
        ticket: CardTicket,
        result: Result<GeneratedCard, String>,
    ) -> Commit {
        if ticket.epoch != self.epoch
            || self.state != WorkflowState::GeneratingCard
            || self.pending_index != Some(ticket.index)
        {
            debug!("Discarding stale render of card {}", ticket.index + 1);
            return Commit::Discarded;
        }

        self.pending_index = None;
        match result {
            Ok(card) if card.index == ticket.index => {
                self.current_card = Some(card);
                self.error = None;
                self.state = WorkflowState::CardReady;
            }
            Ok(card) => {
                self.error = Some(format!(
                    "Received card {} while waiting for card {}. Please try again.",
                    card.index + 1,
                    ticket.index + 1
                ));
                self.state = WorkflowState::BlueprintReady;
            }
            Err(message) => {
                self.error = Some(message);
                self.state = WorkflowState::BlueprintReady;
            }
        }
        info!("Workflow: {}", self.state);
        Commit::Applied
    }

    // ── Reset ────────────────────────────────────────────────────────────

    /// Any state → `Idle`, clearing every field. In-flight results that
    /// arrive later are discarded.
    pub fn reset(&mut self) {
        let epoch = self.epoch + 1;
        *self = Self {
            epoch,
            ..Self::default()
        };
        info!("Workflow: reset (epoch {})", epoch);
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn ensure_not_busy(&self) -> Result<(), WorkflowError> {
        if self.state.is_busy() {
            Err(WorkflowError::Busy)
        } else {
            Ok(())
        }
    }

    fn transition(
        &self,
        event: WorkflowEvent,
        action: &'static str,
    ) -> Result<WorkflowState, WorkflowError> {
        self.ensure_not_busy()?;
        self.state
            .on(event)
            .ok_or(WorkflowError::InvalidTransition {
                action,
                state: self.state.as_str(),
            })
    }
}
