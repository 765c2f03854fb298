//! Configuration types for card generation.
//!
//! All generation behaviour is controlled through [`StudioConfig`], built via
//! its [`StudioConfigBuilder`]. The config is passed explicitly to the
//! blueprint generator and card renderer at construction time; nothing reads
//! the environment behind the caller's back except
//! [`StudioConfig::default`], which picks up the API key once.
//!
//! # Design choice: builder over constructor
//! Most callers only set a model name or a retry budget. The builder lets
//! them set only what they care about and rely on documented defaults for
//! the rest.

use crate::error::CardsError;
use crate::pipeline::backend::GenerationBackend;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Default Gemini REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model for both phases.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Environment variables consulted for the API key, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// Configuration for blueprint analysis and card rendering.
///
/// # Example
/// ```rust
/// use edgequake_cards::StudioConfig;
///
/// let config = StudioConfig::builder()
///     .render_model("gemini-2.5-pro")
///     .max_retries(5)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_retries, 5);
/// ```
#[derive(Clone)]
pub struct StudioConfig {
    /// API key for the generation service. `None` is accepted here; the first
    /// call then fails with [`crate::GenerationError::MissingCredential`].
    pub api_key: Option<String>,

    /// Base URL of the `generateContent` REST API.
    pub base_url: String,

    /// Model used for document analysis (structured JSON output).
    pub analysis_model: String,

    /// Model used to synthesise card HTML.
    pub render_model: String,

    /// Sampling temperature. Default: 0.7.
    ///
    /// Card design benefits from some variety; analysis is constrained by the
    /// response schema anyway.
    pub temperature: f32,

    /// Maximum output tokens per call. `None` leaves the service default.
    pub max_output_tokens: Option<u32>,

    /// Retries after a rate-limited call. Default: 3.
    ///
    /// Only rate-limit failures (HTTP 429, exhausted quota) are retried. Every
    /// other failure surfaces after the first attempt.
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds. Default: 3000.
    ///
    /// Doubles after each retry with no jitter and no cap: 3 s → 6 s → 12 s.
    pub retry_backoff_ms: u64,

    /// Per-request HTTP timeout in seconds. Default: 120.
    ///
    /// A rich card can take well over a minute to synthesise.
    pub request_timeout_secs: u64,

    /// Pre-constructed generation backend. Takes precedence over the built-in
    /// Gemini client; used for test doubles and custom middleware.
    pub backend: Option<Arc<dyn GenerationBackend>>,

    /// Optional observer for workflow events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            api_key: api_key_from_env(),
            base_url: DEFAULT_BASE_URL.to_string(),
            analysis_model: DEFAULT_MODEL.to_string(),
            render_model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_output_tokens: None,
            max_retries: 3,
            retry_backoff_ms: 3000,
            request_timeout_secs: 120,
            backend: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for StudioConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StudioConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("analysis_model", &self.analysis_model)
            .field("render_model", &self.render_model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn StudioProgressCallback>"),
            )
            .finish()
    }
}

impl StudioConfig {
    /// Create a new builder for `StudioConfig`.
    pub fn builder() -> StudioConfigBuilder {
        StudioConfigBuilder {
            config: Self::default(),
        }
    }

    /// Initial backoff as a `Duration`.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Read the API key from the first non-empty variable in [`API_KEY_ENV_VARS`].
pub fn api_key_from_env() -> Option<String> {
    API_KEY_ENV_VARS
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|v| !v.trim().is_empty())
}

/// Builder for [`StudioConfig`].
#[derive(Debug)]
pub struct StudioConfigBuilder {
    config: StudioConfig,
}

impl StudioConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    /// Drop any key picked up from the environment.
    pub fn no_api_key(mut self) -> Self {
        self.config.api_key = None;
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn analysis_model(mut self, model: impl Into<String>) -> Self {
        self.config.analysis_model = model.into();
        self
    }

    pub fn render_model(mut self, model: impl Into<String>) -> Self {
        self.config.render_model = model.into();
        self
    }

    /// Set both models at once.
    pub fn model(self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.analysis_model(model.clone()).render_model(model)
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.config.max_output_tokens = Some(n);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn GenerationBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<StudioConfig, CardsError> {
        let c = &self.config;
        if c.analysis_model.trim().is_empty() || c.render_model.trim().is_empty() {
            return Err(CardsError::InvalidConfig(
                "Model names must not be empty".into(),
            ));
        }
        if c.backend.is_none() && !c.base_url.starts_with("http") {
            return Err(CardsError::InvalidConfig(format!(
                "Base URL must be an http(s) URL, got '{}'",
                c.base_url
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// The closed set of visual styles a blueprint may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CardStyle {
    Minimalist,
    Corporate,
    Vibrant,
    Retro,
    Cyberpunk,
    Nature,
    Elegant,
    HandDrawn,
}

impl CardStyle {
    pub const ALL: [CardStyle; 8] = [
        CardStyle::Minimalist,
        CardStyle::Corporate,
        CardStyle::Vibrant,
        CardStyle::Retro,
        CardStyle::Cyberpunk,
        CardStyle::Nature,
        CardStyle::Elegant,
        CardStyle::HandDrawn,
    ];

    /// Wire identifier, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStyle::Minimalist => "minimalist",
            CardStyle::Corporate => "corporate",
            CardStyle::Vibrant => "vibrant",
            CardStyle::Retro => "retro",
            CardStyle::Cyberpunk => "cyberpunk",
            CardStyle::Nature => "nature",
            CardStyle::Elegant => "elegant",
            CardStyle::HandDrawn => "hand-drawn",
        }
    }

    /// Short visual brief used in prompts.
    pub fn brief(&self) -> &'static str {
        match self {
            CardStyle::Minimalist => "generous whitespace, thin rules, restrained palette, Swiss grid",
            CardStyle::Corporate => "structured layout, clear hierarchy, icons, business-report polish",
            CardStyle::Vibrant => "bold gradients, saturated colour blocks, playful shapes",
            CardStyle::Retro => "vintage print texture, muted warm tones, badge-like headings",
            CardStyle::Cyberpunk => "dark background, neon accents, glitch and grid motifs",
            CardStyle::Nature => "organic shapes, earthy greens and browns, soft textures",
            CardStyle::Elegant => "serif typography, gold or jewel accents, editorial layout",
            CardStyle::HandDrawn => "sketchy borders, marker highlights, notebook paper feel",
        }
    }
}

impl fmt::Display for CardStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardStyle {
    type Err = CardsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        CardStyle::ALL
            .iter()
            .copied()
            .find(|style| style.as_str() == needle || (needle == "handdrawn" && *style == CardStyle::HandDrawn))
            .ok_or_else(|| CardsError::InvalidConfig(format!("Unknown card style '{s}'")))
    }
}

/// The user's style preference for analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StylePreference {
    /// Let the model choose the style that best fits the content. (default)
    #[default]
    Auto,
    /// Force a specific style.
    Fixed(CardStyle),
}

impl fmt::Display for StylePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StylePreference::Auto => f.write_str("auto"),
            StylePreference::Fixed(style) => write!(f, "{style}"),
        }
    }
}

impl FromStr for StylePreference {
    type Err = CardsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            Ok(StylePreference::Auto)
        } else {
            s.parse().map(StylePreference::Fixed)
        }
    }
}
