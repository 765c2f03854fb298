//! Stylesheet filter: keep cross-origin stylesheets whose rules cannot be
//! read away from the rasterizer.
//!
//! A rasterizer that inlines CSS has to read every stylesheet's rules. For a
//! cross-origin sheet loaded without a CORS grant that read is a security
//! fault, which aborts the whole capture. The filter decides up front which
//! `<link rel="stylesheet">` nodes are safe:
//!
//! | link                                            | decision          |
//! |-------------------------------------------------|-------------------|
//! | relative, `data:` or same origin as the surface | keep, no probe    |
//! | cross-origin without `crossorigin`              | exclude, no probe |
//! | cross-origin with `crossorigin`                 | ask [`RuleAccess`]; exclude if it fails |
//!
//! Every other node passes unchanged.

use crate::error::ExportError;
use crate::export::dom::{attr, local_name, walk};
use futures::future::BoxFuture;
use futures::FutureExt;
use markup5ever_rcdom::Handle;
use reqwest::header::{ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN};
use reqwest::Url;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

/// How a stylesheet link relates to the rendering surface's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOrigin {
    SameOrigin,
    /// Cross-origin, requested with a `crossorigin` attribute.
    CorsRequested,
    /// Cross-origin without `crossorigin`: rules are never readable.
    Opaque,
}

/// A `<link rel="stylesheet">` found in the surface document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylesheetLink {
    pub href: String,
    pub origin: LinkOrigin,
}

impl StylesheetLink {
    /// Absolute URL for fetching; scheme-relative links resolve to https.
    pub fn absolute_url(&self) -> Option<Url> {
        if let Some(rest) = self.href.strip_prefix("//") {
            return Url::parse(&format!("https://{rest}")).ok();
        }
        Url::parse(&self.href).ok()
    }
}

fn is_stylesheet_link(node: &Handle) -> bool {
    local_name(node) == Some("link")
        && attr(node, "rel").is_some_and(|rel| {
            rel.split_ascii_whitespace()
                .any(|t| t.eq_ignore_ascii_case("stylesheet"))
        })
}

fn classify(href: &str, crossorigin: bool, surface_origin: Option<&str>) -> LinkOrigin {
    let absolute = if let Some(rest) = href.strip_prefix("//") {
        Url::parse(&format!("https://{rest}")).ok()
    } else {
        Url::parse(href).ok()
    };

    let url = match absolute {
        // Relative to the surface document.
        None => return LinkOrigin::SameOrigin,
        Some(url) => url,
    };
    if url.scheme() == "data" {
        return LinkOrigin::SameOrigin;
    }
    if let Some(origin) = surface_origin {
        if url.origin().ascii_serialization() == origin.trim_end_matches('/') {
            return LinkOrigin::SameOrigin;
        }
    }
    if crossorigin {
        LinkOrigin::CorsRequested
    } else {
        LinkOrigin::Opaque
    }
}

/// All stylesheet links under `root`, in document order.
///
/// `surface_origin` is the serialized origin of the rendering surface
/// (`None` for a sandboxed surface, whose origin is opaque).
pub fn collect_stylesheet_links(root: &Handle, surface_origin: Option<&str>) -> Vec<StylesheetLink> {
    let mut links = Vec::new();
    walk(root, &mut |node| {
        if !is_stylesheet_link(node) {
            return;
        }
        if let Some(href) = attr(node, "href") {
            let crossorigin = attr(node, "crossorigin").is_some();
            let origin = classify(href.trim(), crossorigin, surface_origin);
            links.push(StylesheetLink {
                href: href.trim().to_string(),
                origin,
            });
        }
    });
    links
}

/// Capability query: can the rules of this stylesheet be read?
///
/// `Err` means no; the link is then excluded from the capture.
pub trait RuleAccess: Send + Sync {
    fn check<'a>(&'a self, link: &'a StylesheetLink) -> BoxFuture<'a, Result<(), ExportError>>;
}

/// Node filter applied to the surface document before rasterizing.
#[derive(Debug, Clone, Default)]
pub struct StylesheetFilter {
    rejected: HashSet<String>,
}

impl StylesheetFilter {
    /// Decide every link, probing only the ones that need it.
    pub async fn build(links: &[StylesheetLink], access: &dyn RuleAccess) -> Self {
        let mut rejected = HashSet::new();
        for link in links {
            match link.origin {
                LinkOrigin::SameOrigin => {}
                LinkOrigin::Opaque => {
                    debug!("Excluding opaque cross-origin stylesheet {}", link.href);
                    rejected.insert(link.href.clone());
                }
                LinkOrigin::CorsRequested => {
                    if let Err(e) = access.check(link).await {
                        warn!("Excluding stylesheet {}: {}", link.href, e);
                        rejected.insert(link.href.clone());
                    }
                }
            }
        }
        Self { rejected }
    }

    /// `false` only for a stylesheet link whose rules are unreadable.
    pub fn accepts(&self, node: &Handle) -> bool {
        if !is_stylesheet_link(node) {
            return true;
        }
        match attr(node, "href") {
            Some(href) => !self.rejected.contains(href.trim()),
            None => true,
        }
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }
}

/// Serialized origin of a sandboxed document.
pub const OPAQUE_ORIGIN: &str = "null";

/// [`RuleAccess`] over HTTP: fetch the sheet as a CORS request and check
/// `Access-Control-Allow-Origin`.
#[derive(Debug, Clone)]
pub struct CorsProbe {
    client: reqwest::Client,
    origin: String,
}

impl CorsProbe {
    pub fn new(timeout: Duration) -> Result<Self, ExportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExportError::RasterFailed(format!("http client: {e}")))?;
        Ok(Self {
            client,
            origin: OPAQUE_ORIGIN.to_string(),
        })
    }

    /// Probe on behalf of a surface with a real origin.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    async fn probe(&self, link: &StylesheetLink) -> Result<(), ExportError> {
        let url = link
            .absolute_url()
            .ok_or_else(|| ExportError::SecurityFault(format!("unresolvable href {}", link.href)))?;

        let resp = self
            .client
            .get(url)
            .header(ORIGIN, &self.origin)
            .send()
            .await
            .map_err(|e| ExportError::SecurityFault(format!("{}: {e}", link.href)))?;

        if !resp.status().is_success() {
            return Err(ExportError::SecurityFault(format!(
                "{}: HTTP {}",
                link.href,
                resp.status()
            )));
        }
        let grant = resp
            .headers()
            .get(ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::trim);
        match grant {
            Some("*") => Ok(()),
            Some(origin) if origin == self.origin => Ok(()),
            _ => Err(ExportError::SecurityFault(format!(
                "{}: no CORS grant for origin {}",
                link.href, self.origin
            ))),
        }
    }
}

impl RuleAccess for CorsProbe {
    fn check<'a>(&'a self, link: &'a StylesheetLink) -> BoxFuture<'a, Result<(), ExportError>> {
        self.probe(link).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::dom::parse_markup;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DOC: &str = r#"<!DOCTYPE html><html><head>
        <link rel="stylesheet" href="https://cdn.example/cors.css" crossorigin="anonymous">
        <link rel="stylesheet" href="https://cdn.example/opaque.css">
        <link rel="stylesheet" href="local.css">
        <link rel="icon" href="https://cdn.example/favicon.ico">
        <style>body { color: red }</style>
        </head><body><div id="card-container"><p>hi</p></div></body></html>"#;

    struct Throws {
        calls: AtomicUsize,
    }

    impl RuleAccess for Throws {
        fn check<'a>(&'a self, link: &'a StylesheetLink) -> BoxFuture<'a, Result<(), ExportError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let href = link.href.clone();
            async move { Err(ExportError::SecurityFault(href)) }.boxed()
        }
    }

    struct Grants;

    impl RuleAccess for Grants {
        fn check<'a>(&'a self, _link: &'a StylesheetLink) -> BoxFuture<'a, Result<(), ExportError>> {
            async { Ok(()) }.boxed()
        }
    }

    fn href_of(node: &Handle) -> Option<String> {
        attr(node, "href")
    }

    #[test]
    fn classification() {
        let dom = parse_markup(DOC).unwrap();
        let links = collect_stylesheet_links(&dom.document, None);
        let origins: Vec<_> = links.iter().map(|l| l.origin).collect();
        assert_eq!(
            origins,
            vec![LinkOrigin::CorsRequested, LinkOrigin::Opaque, LinkOrigin::SameOrigin]
        );
    }

    #[test]
    fn matching_surface_origin_is_same_origin() {
        assert_eq!(
            classify("https://cdn.example/a.css", false, Some("https://cdn.example")),
            LinkOrigin::SameOrigin
        );
        assert_eq!(
            classify("//cdn.example/a.css", true, None),
            LinkOrigin::CorsRequested
        );
        assert_eq!(classify("data:text/css,p{}", false, None), LinkOrigin::SameOrigin);
    }

    #[tokio::test]
    async fn throwing_probe_rejects_only_that_link() {
        let dom = parse_markup(DOC).unwrap();
        let links = collect_stylesheet_links(&dom.document, None);
        let access = Throws {
            calls: AtomicUsize::new(0),
        };
        let filter = StylesheetFilter::build(&links, &access).await;
        assert_eq!(access.calls.load(Ordering::SeqCst), 1, "only the CORS link is probed");

        let dom = parse_markup(DOC).unwrap();
        let mut rejected = Vec::new();
        let mut accepted = 0;
        walk(&dom.document, &mut |node| {
            if filter.accepts(node) {
                accepted += 1;
            } else {
                rejected.push(href_of(node).unwrap_or_default());
            }
        });
        rejected.sort();
        assert_eq!(
            rejected,
            vec!["https://cdn.example/cors.css", "https://cdn.example/opaque.css"]
        );
        assert!(accepted > 5);
    }

    #[tokio::test]
    async fn granted_probe_keeps_cors_link() {
        let dom = parse_markup(DOC).unwrap();
        let links = collect_stylesheet_links(&dom.document, None);
        let filter = StylesheetFilter::build(&links, &Grants).await;
        assert_eq!(filter.rejected_count(), 1);
    }
}
