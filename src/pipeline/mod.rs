//! Generation stages for document-to-cards conversion.
//!
//! Each submodule implements exactly one step, so each is independently
//! testable and the model backend can be swapped without touching the rest.
//!
//! ## Data Flow
//!
//! ```text
//! text ──▶ analyze ──▶ blueprint ──▶ render(index) ──▶ postprocess ──▶ card
//!            │                          │
//!            └──────── retry ───────────┘
//!                        │
//!                     backend (gemini)
//! ```
//!
//! 1. [`backend`]: the opaque generation capability (trait + request shapes)
//! 2. [`gemini`]: default backend over the Gemini REST API
//! 3. [`retry`]: exponential backoff on rate-limit failures only
//! 4. [`analyze`]: document → [`crate::model::DesignBlueprint`]
//! 5. [`render`]: blueprint + index → [`crate::model::GeneratedCard`]
//! 6. [`postprocess`]: strip code fences around the model's answer

pub mod analyze;
pub mod backend;
pub mod gemini;
pub mod postprocess;
pub mod render;
pub mod retry;
