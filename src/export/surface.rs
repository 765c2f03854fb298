//! Rendering surfaces: the isolated document a card is displayed in and
//! exported from.

use crate::error::ExportError;
use crate::model::GeneratedCard;
use futures::future::BoxFuture;
use futures::FutureExt;

/// Read access to an isolated rendering surface.
///
/// Nothing beyond reading the document (and waiting for its fonts) is
/// exposed: the surface does not share scripting context with the host.
pub trait RenderSurface: Send + Sync {
    /// The surface's current document as markup.
    fn read_document(&self) -> Result<String, ExportError>;

    /// Serialized origin of the document, `None` when opaque (sandboxed).
    fn origin(&self) -> Option<&str> {
        None
    }

    /// Resolves when the document's fonts have loaded. The export pipeline
    /// bounds this with a timeout and ignores failures.
    fn fonts_ready(&self) -> BoxFuture<'_, Result<(), ExportError>> {
        async { Ok(()) }.boxed()
    }
}

/// A sandboxed surface holding the card's markup verbatim.
///
/// Fonts are loaded by the rasterizer itself, so `fonts_ready` resolves
/// immediately.
#[derive(Debug, Clone)]
pub struct SandboxedSurface {
    markup: String,
}

impl SandboxedSurface {
    pub fn new(markup: impl Into<String>) -> Self {
        Self {
            markup: markup.into(),
        }
    }

    pub fn from_card(card: &GeneratedCard) -> Self {
        Self::new(card.html.clone())
    }
}

impl RenderSurface for SandboxedSurface {
    fn read_document(&self) -> Result<String, ExportError> {
        if self.markup.trim().is_empty() {
            return Err(ExportError::DocumentUnreadable("surface is empty".into()));
        }
        Ok(self.markup.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_surface_is_unreadable() {
        let err = SandboxedSurface::new("  ").read_document().unwrap_err();
        assert!(matches!(err, ExportError::DocumentUnreadable(_)));
    }

    #[tokio::test]
    async fn sandboxed_surface_is_opaque_and_ready() {
        let s = SandboxedSurface::new("<p>x</p>");
        assert_eq!(s.read_document().unwrap(), "<p>x</p>");
        assert!(s.origin().is_none());
        assert!(s.fonts_ready().await.is_ok());
    }
}
