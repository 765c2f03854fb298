//! Error types for the edgequake-cards library.
//!
//! Errors are split by the layer that produces them:
//!
//! * [`GenerationError`]: the generative-model capability failed. This is the
//!   only error the retry executor looks at, and it does so through the
//!   tagged [`GenerationError::RateLimited`] variant, never by inspecting the
//!   message text.
//!
//! * [`WorkflowError`]: the workflow controller refused a request because it
//!   is not valid in the current state (busy, empty input, no next card).
//!   Rejections never change state.
//!
//! * [`ExportError`]: the image export failed. Security faults are kept apart
//!   from generic failures so the user can be pointed at the copy-code
//!   fallback.
//!
//! [`CardsError`] is the top-level type returned by the public API and wraps
//! all three. Every variant can render a short user-facing message via
//! `user_message()`; the `Display` output is the detailed, log-oriented form.

use std::path::PathBuf;
use thiserror::Error;

/// Quota / rate-limit status code reported by the Gemini API.
pub const QUOTA_EXHAUSTED_CODE: &str = "RESOURCE_EXHAUSTED";

/// All fatal errors returned by the edgequake-cards library.
#[derive(Debug, Error)]
pub enum CardsError {
    /// The generative-model call failed (after retries, if it was retryable).
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// The workflow controller rejected the request.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Image export failed.
    #[error(transparent)]
    Export(#[from] ExportError),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not read the input document or write an output file.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CardsError {
    /// Short message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            CardsError::Generation(e) => e.user_message().to_string(),
            CardsError::Workflow(e) => e.to_string(),
            CardsError::Export(e) => e.user_message().to_string(),
            CardsError::InvalidConfig(_) | CardsError::Io { .. } | CardsError::Internal(_) => {
                self.to_string()
            }
        }
    }

    /// `true` when this error is a rate-limit failure that outlived the retry budget.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CardsError::Generation(e) if e.is_rate_limited())
    }
}

/// A failure of the external generation capability.
///
/// Built from the HTTP status and the service's machine-readable error code
/// via [`GenerationError::from_status`], which is the single place where a
/// response is classified as rate-limited.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// HTTP 429 or an exhausted quota. Retried with exponential backoff.
    #[error("Rate limit exceeded (status {status:?}, code {code:?}): {message}")]
    RateLimited {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    /// Any other non-success response from the service.
    #[error("Generation service error {status} ({code:?}): {message}")]
    Service {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// The request never produced an HTTP response (DNS, TLS, timeout…).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service answered but the payload did not have the expected shape.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// No API key was configured. Surfaces on the first call, not at startup.
    #[error("No API key configured.\nSet GEMINI_API_KEY (or API_KEY) in the environment.")]
    MissingCredential,
}

impl GenerationError {
    /// Classify a non-success response.
    ///
    /// `code` is the service's status string (e.g. `RESOURCE_EXHAUSTED`) or a
    /// numeric code rendered as a string.
    pub fn from_status(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let code_is_rate_limit = code
            .as_deref()
            .map(|c| c == "429" || c.eq_ignore_ascii_case(QUOTA_EXHAUSTED_CODE))
            .unwrap_or(false);

        if status == 429 || code_is_rate_limit {
            GenerationError::RateLimited {
                status: Some(status),
                code,
                message,
            }
        } else {
            GenerationError::Service {
                status,
                code,
                message,
            }
        }
    }

    /// Tagged-variant check used by the retry executor.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GenerationError::RateLimited { .. })
    }

    /// Short message suitable for showing to an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            GenerationError::RateLimited { .. } => {
                "The generation service is rate limiting requests. Please wait a minute and try again."
            }
            GenerationError::MissingCredential => {
                "No API key is configured. Set GEMINI_API_KEY and try again."
            }
            _ => "Generation failed. Please try again.",
        }
    }
}

/// A request the workflow controller refused. State is left untouched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    /// Analysis was requested with empty or whitespace-only text.
    #[error("Nothing to analyse: the document text is empty")]
    EmptyInput,

    /// Another analysis or render is already in flight.
    #[error("A generation request is already in progress")]
    Busy,

    /// The request is not valid from the current state.
    #[error("Cannot {action} while the workflow is {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    /// The requested card index does not exist in the blueprint.
    #[error("Card {index} does not exist (blueprint has {total} cards)")]
    CardIndexOutOfRange { index: usize, total: usize },
}

/// Image export failure.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The rendering surface's document could not be read.
    #[error("Rendering surface document is unreadable: {0}")]
    DocumentUnreadable(String),

    /// Neither the card container nor a document root was found.
    #[error("No card container found in the rendering surface")]
    ContainerNotFound,

    /// The rasterizer hit a cross-origin security fault.
    #[error("Security fault during rasterisation: {0}")]
    SecurityFault(String),

    /// The rasterizer failed for any other reason.
    #[error("Rasterisation failed: {0}")]
    RasterFailed(String),

    /// The image produced by the rasterizer could not be decoded or encoded.
    #[error("Image encoding failed: {0}")]
    Encoding(String),

    /// Could not write the exported image.
    #[error("Failed to write '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExportError {
    /// Short message suitable for showing to an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            ExportError::SecurityFault(_) => {
                "Export was blocked by a cross-origin security restriction. Use \"copy code\" and render the card in your own browser instead."
            }
            _ => "Image export failed. Please try again.",
        }
    }

    pub fn is_security_fault(&self) -> bool {
        matches!(self, ExportError::SecurityFault(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_429_is_rate_limited() {
        let e = GenerationError::from_status(429, None, "slow down");
        assert!(e.is_rate_limited());
    }

    #[test]
    fn quota_code_is_rate_limited() {
        let e = GenerationError::from_status(400, Some("RESOURCE_EXHAUSTED".into()), "quota");
        assert!(e.is_rate_limited());

        let e = GenerationError::from_status(400, Some("429".into()), "quota");
        assert!(e.is_rate_limited());
    }

    #[test]
    fn other_status_is_service_error() {
        let e = GenerationError::from_status(500, Some("INTERNAL".into()), "boom");
        assert!(!e.is_rate_limited());
        assert!(matches!(e, GenerationError::Service { status: 500, .. }));
    }

    #[test]
    fn rate_limit_message_asks_to_wait() {
        let e = CardsError::from(GenerationError::from_status(429, None, "x"));
        assert!(e.is_rate_limited());
        assert!(e.user_message().contains("wait"), "got: {}", e.user_message());
    }

    #[test]
    fn security_fault_message_differs_from_generic() {
        let sec = ExportError::SecurityFault("cssRules".into());
        let gen = ExportError::ContainerNotFound;
        assert!(sec.is_security_fault());
        assert!(sec.user_message().contains("copy code"));
        assert_ne!(sec.user_message(), gen.user_message());
    }

    #[test]
    fn out_of_range_display() {
        let e = WorkflowError::CardIndexOutOfRange { index: 7, total: 3 };
        let msg = e.to_string();
        assert!(msg.contains('7') && msg.contains('3'), "got: {msg}");
    }
}
