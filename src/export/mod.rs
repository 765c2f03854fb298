//! Export pipeline: rendering surface → PNG image.
//!
//! ## Steps
//!
//! ```text
//! surface ──▶ read document ──▶ collect stylesheet links ──▶ probe (RuleAccess)
//!                                                               │
//!    ExportedImage ◀── encode ◀── rasterize ◀── prepare DOM ◀───┘
//!                                    ▲          (filter links, mark container,
//!                         font wait ─┘           layout-neutral overrides)
//! ```
//!
//! 1. [`surface`]: read the isolated document
//! 2. [`filter`]: exclude stylesheets whose rules cannot be read
//! 3. [`dom`]: locate `#card-container` (fallback: body, root) and
//!    neutralise transform/margin/padding on it
//! 4. [`raster`]: 700×1160 at 2× through a [`Rasterizer`]
//! 5. [`encode`]: validate, crop, `data:image/png;base64,…`
//!
//! Every failure is an [`ExportError`]; nothing here panics on bad input.

pub mod dom;
pub mod encode;
pub mod filter;
pub mod raster;
pub mod surface;

pub use filter::{CorsProbe, RuleAccess, StylesheetFilter};
pub use raster::{HeadlessBrowser, RasterJob, Rasterizer};
pub use surface::{RenderSurface, SandboxedSurface};

use crate::error::ExportError;
use crate::model::{GeneratedCard, CARD_HEIGHT, CARD_WIDTH};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Rasterization settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    /// Logical width in CSS pixels. Default: 700.
    pub width: u32,
    /// Logical height in CSS pixels. Default: 1160.
    pub height: u32,
    /// Supersampling factor. Default: 2.
    pub pixel_ratio: f32,
    /// Use `pixel_ratio` as-is instead of letting the rasterizer pick a
    /// device scale. Default: true.
    pub skip_auto_scale: bool,
    /// Give every export a unique resource URL. Default: true.
    pub cache_bust: bool,
    /// Upper bound on the best-effort font wait. Default: 3 s.
    pub font_wait_timeout: Duration,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            width: CARD_WIDTH,
            height: CARD_HEIGHT,
            pixel_ratio: 2.0,
            skip_auto_scale: true,
            cache_bust: true,
            font_wait_timeout: Duration::from_secs(3),
        }
    }
}

impl ExportOptions {
    /// Expected output size in device pixels.
    pub fn output_size(&self) -> (u32, u32) {
        let scale = self.pixel_ratio.max(0.1);
        (
            (self.width as f32 * scale).round() as u32,
            (self.height as f32 * scale).round() as u32,
        )
    }
}

/// A finished export, ready to save or hand to a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedImage {
    /// `<sanitized-title>.png`
    pub file_name: String,
    /// `data:image/png;base64,…`
    pub data_url: String,
    pub width: u32,
    pub height: u32,
}

impl ExportedImage {
    pub fn png_bytes(&self) -> Result<Vec<u8>, ExportError> {
        encode::decode_data_url(&self.data_url)
    }

    /// Write `dir/<file_name>` atomically (temp file in `dir`, then rename).
    pub fn save(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let bytes = self.png_bytes()?;
        let path = dir.join(&self.file_name);
        let write_err = |source: std::io::Error| ExportError::WriteFailed {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(dir).map_err(write_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        std::io::Write::write_all(&mut tmp, &bytes).map_err(write_err)?;
        tmp.persist(&path).map_err(|e| write_err(e.error))?;

        info!("Saved {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }
}

/// File-system-safe stem for a card title.
///
/// Keeps letters, digits, `-` and `_`; every other run of characters becomes
/// one `_`. Falls back to `card` when nothing usable remains.
pub fn sanitize_file_name(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for c in title.trim().chars() {
        if c.is_alphanumeric() || c == '-' || c == '_' {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let out: String = out.trim_matches('_').chars().take(100).collect();
    if out.is_empty() {
        "card".to_string()
    } else {
        out
    }
}

static EXPORT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn cache_key(options: &ExportOptions) -> String {
    if !options.cache_bust {
        return "0".to_string();
    }
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("{millis}-{}", EXPORT_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Filter, mark and serialize the surface document for capture.
fn prepare_document(html: &str, filter: &StylesheetFilter) -> Result<String, ExportError> {
    let dom = dom::parse_markup(html)?;
    let removed = dom::retain(&dom.document, &|node| filter.accepts(node));
    let target = dom::prepare_capture_target(&dom)?;
    debug!("Prepared capture: target {:?}, {} stylesheet(s) removed", target, removed);
    dom::serialize_document(&dom)
}

/// Runs the export steps against an injected rasterizer and rule probe.
#[derive(Clone)]
pub struct ExportPipeline {
    rasterizer: Arc<dyn Rasterizer>,
    rules: Arc<dyn RuleAccess>,
    options: ExportOptions,
}

impl ExportPipeline {
    pub fn new(rasterizer: Arc<dyn Rasterizer>, rules: Arc<dyn RuleAccess>) -> Self {
        Self {
            rasterizer,
            rules,
            options: ExportOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Export a generated card through a [`SandboxedSurface`].
    pub async fn export_card(&self, card: &GeneratedCard) -> Result<ExportedImage, ExportError> {
        self.export(&SandboxedSurface::from_card(card), &card.title)
            .await
    }

    /// Export whatever `surface` currently shows, naming the file after
    /// `title`.
    pub async fn export(
        &self,
        surface: &dyn RenderSurface,
        title: &str,
    ) -> Result<ExportedImage, ExportError> {
        let html = surface.read_document()?;

        let links = {
            let dom = dom::parse_markup(&html)?;
            filter::collect_stylesheet_links(&dom.document, surface.origin())
        };
        let filter = StylesheetFilter::build(&links, self.rules.as_ref()).await;

        match tokio::time::timeout(self.options.font_wait_timeout, surface.fonts_ready()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Font wait failed, continuing: {}", e),
            Err(_) => debug!(
                "Font wait timed out after {:?}, continuing",
                self.options.font_wait_timeout
            ),
        }

        let job = RasterJob {
            html: prepare_document(&html, &filter)?,
            options: self.options.clone(),
            cache_key: cache_key(&self.options),
        };
        info!("Rasterizing \"{}\" with {}", title, self.rasterizer.name());
        let bytes = self.rasterizer.rasterize(&job).await?;

        let (width, height) = self.options.output_size();
        let capture = encode::normalize_capture(&bytes, width, height)?;

        Ok(ExportedImage {
            file_name: format!("{}.png", sanitize_file_name(title)),
            data_url: encode::png_data_url(&capture.png),
            width: capture.width,
            height: capture.height,
        })
    }
}
