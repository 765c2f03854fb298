//! The generation capability seam.
//!
//! The blueprint generator and the card renderer talk to the model through
//! [`GenerationBackend`] only. The default implementation is
//! [`crate::pipeline::gemini::GeminiBackend`]; tests inject scripted doubles
//! via [`crate::config::StudioConfigBuilder::backend`].

use crate::error::GenerationError;
use futures::future::BoxFuture;
use serde_json::Value;

/// Shape of the text the model must return.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    /// Free text (the card renderer's HTML, possibly fenced).
    Text,
    /// JSON conforming to `schema`, enforced by the service.
    Json { schema: Value },
}

/// One request to the generation capability.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub system_instruction: Option<String>,
    pub prompt: String,
    pub response_format: ResponseFormat,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn text(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_instruction: None,
            prompt: prompt.into(),
            response_format: ResponseFormat::Text,
            temperature: None,
            max_output_tokens: None,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_json_schema(mut self, schema: Value) -> Self {
        self.response_format = ResponseFormat::Json { schema };
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, max: Option<u32>) -> Self {
        self.max_output_tokens = max;
        self
    }
}

/// Raw text answer plus token usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationResponse {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl GenerationResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// An opaque text-generation capability.
///
/// Object-safe so it can be shared as `Arc<dyn GenerationBackend>` between
/// the generator and the renderer.
pub trait GenerationBackend: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Send one request. Implementations must classify failures through
    /// [`GenerationError::from_status`] so rate limits are retried.
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> BoxFuture<'a, Result<GenerationResponse, GenerationError>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_methods_compose() {
        let req = GenerationRequest::text("m", "p")
            .with_system_instruction("sys")
            .with_json_schema(json!({"type": "OBJECT"}))
            .with_temperature(0.2)
            .with_max_output_tokens(Some(512));
        assert_eq!(req.system_instruction.as_deref(), Some("sys"));
        assert!(matches!(req.response_format, ResponseFormat::Json { .. }));
        assert_eq!(req.temperature, Some(0.2));
        assert_eq!(req.max_output_tokens, Some(512));
    }
}
