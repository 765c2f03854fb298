//! # edgequake-cards
//!
//! Turn free-form document text into a deck of styled "knowledge cards",
//! each a standalone HTML document, using a generative model for both
//! planning and markup synthesis.
//!
//! ## Why two phases?
//!
//! One call that writes every card at once is slow, expensive and fails as
//! a whole. Instead the document is analysed once into a small, typed
//! [`DesignBlueprint`] (style, colours, fonts, ordered card outlines), and
//! cards are rendered one at a time, on demand, from that shared plan. A
//! failed card costs one request and leaves the blueprint intact.
//!
//! ## Pipeline Overview
//!
//! ```text
//! text + style
//!  │
//!  ├─ 1. Analyse   structured JSON call → DesignBlueprint   (retry on 429)
//!  ├─ 2. Render    per card index → HTML document           (retry on 429)
//!  ├─ 3. Extract   strip ```html fences
//!  └─ 4. Export    filter stylesheets → rasterize 700×1160 @2× → PNG
//! ```
//!
//! The [`WorkflowController`] state machine orders these steps and rejects
//! overlapping requests; [`Studio`] drives it asynchronously.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_cards::{Studio, StudioConfig, StylePreference};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key from GEMINI_API_KEY (or API_KEY)
//!     let studio = Studio::new(&StudioConfig::default())?;
//!     studio.analyze("Rust ownership in five minutes…", StylePreference::Auto).await?;
//!     if let Some(card) = studio.render_card(0).await?.committed() {
//!         println!("{}", card.html);
//!     }
//!     eprintln!("tokens: {:?}", studio.usage());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature     | Default | Description |
//! |-------------|---------|-------------|
//! | `cli`       | on      | Enables the `edgecards` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `clipboard` | on (via `cli`) | "Copy code" support through arboard |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-cards = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

#[cfg(feature = "clipboard")]
pub mod clipboard;
pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod studio;
pub mod workflow;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{CardStyle, StudioConfig, StudioConfigBuilder, StylePreference};
pub use error::{CardsError, ExportError, GenerationError, WorkflowError};
pub use export::{
    sanitize_file_name, CorsProbe, ExportOptions, ExportPipeline, ExportedImage,
    HeadlessBrowser, RasterJob, Rasterizer, RenderSurface, RuleAccess, SandboxedSurface,
};
pub use model::{CardOutline, DesignBlueprint, FontPairing, GeneratedCard, UsageStats};
pub use pipeline::backend::{GenerationBackend, GenerationRequest, GenerationResponse};
pub use progress::{NoopProgressCallback, ProgressCallback, StudioProgressCallback};
pub use studio::{Outcome, Studio};
pub use workflow::{WorkflowController, WorkflowSnapshot, WorkflowState};
