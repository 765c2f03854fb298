//! Small DOM helpers over `markup5ever_rcdom`.
//!
//! `RcDom` handles are `Rc`-based, so everything here is synchronous and the
//! export pipeline never keeps a parsed document alive across an `.await`.

use crate::error::ExportError;
use crate::model::CARD_CONTAINER_ID;
use html5ever::parse_document;
use html5ever::serialize::{serialize, SerializeOpts};
use html5ever::tendril::TendrilSink;
use html5ever::{Attribute, LocalName, Namespace, QualName};
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};

/// Style forced onto the captured node so the rasterizer sees it at its
/// natural size and position.
pub const CAPTURE_OVERRIDES: &str = "transform:none!important;margin:0!important;padding:0!important";

/// Attribute marking the node that was prepared for capture.
pub const EXPORT_TARGET_ATTR: &str = "data-export-target";

/// Which node ended up being captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTarget {
    /// The element with `id="card-container"`.
    Container,
    /// No container; fell back to `<body>`.
    Body,
    /// No body either; fell back to the root element.
    Root,
}

pub fn parse_markup(html: &str) -> Result<RcDom, ExportError> {
    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
        .map_err(|e| ExportError::DocumentUnreadable(e.to_string()))
}

pub fn serialize_document(dom: &RcDom) -> Result<String, ExportError> {
    let mut bytes = Vec::new();
    let handle: SerializableHandle = dom.document.clone().into();
    serialize(&mut bytes, &handle, SerializeOpts::default())
        .map_err(|e| ExportError::Encoding(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ExportError::Encoding(e.to_string()))
}

/// Local name of an element, `None` for other node kinds.
pub fn local_name(node: &Handle) -> Option<&str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(&*name.local),
        _ => None,
    }
}

pub fn attr(node: &Handle, name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| &*a.name.local == name)
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

pub fn set_attr(node: &Handle, name: &str, value: &str) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let mut attrs = attrs.borrow_mut();
        match attrs.iter_mut().find(|a| &*a.name.local == name) {
            Some(existing) => existing.value = value.into(),
            None => attrs.push(Attribute {
                name: QualName::new(None, Namespace::from(""), LocalName::from(name)),
                value: value.into(),
            }),
        }
    }
}

/// Depth-first pre-order visit of `node` and its descendants.
pub fn walk(node: &Handle, visit: &mut impl FnMut(&Handle)) {
    visit(node);
    for child in node.children.borrow().iter() {
        walk(child, visit);
    }
}

/// First node (pre-order) matching `pred`.
pub fn find(node: &Handle, pred: &impl Fn(&Handle) -> bool) -> Option<Handle> {
    if pred(node) {
        return Some(node.clone());
    }
    node.children.borrow().iter().find_map(|c| find(c, pred))
}

/// Drop every descendant for which `keep` is false. Returns how many
/// subtrees were removed.
pub fn retain(node: &Handle, keep: &impl Fn(&Handle) -> bool) -> usize {
    let mut removed = 0;
    node.children.borrow_mut().retain(|child| {
        let kept = keep(child);
        if !kept {
            removed += 1;
        }
        kept
    });
    for child in node.children.borrow().iter() {
        removed += retain(child, keep);
    }
    removed
}

/// Locate the capture target and apply the layout-neutral overrides.
pub fn prepare_capture_target(dom: &RcDom) -> Result<CaptureTarget, ExportError> {
    let root = &dom.document;
    let by_id = |n: &Handle| attr(n, "id").as_deref() == Some(CARD_CONTAINER_ID);
    let named = |tag: &'static str| move |n: &Handle| local_name(n) == Some(tag);

    let (target, kind) = if let Some(node) = find(root, &by_id) {
        (node, CaptureTarget::Container)
    } else if let Some(node) = find(root, &named("body")) {
        (node, CaptureTarget::Body)
    } else if let Some(node) = find(root, &named("html")) {
        (node, CaptureTarget::Root)
    } else {
        return Err(ExportError::ContainerNotFound);
    };

    let style = match attr(&target, "style") {
        Some(existing) if !existing.trim().is_empty() => {
            format!("{};{}", existing.trim().trim_end_matches(';'), CAPTURE_OVERRIDES)
        }
        _ => CAPTURE_OVERRIDES.to_string(),
    };
    set_attr(&target, "style", &style);
    set_attr(&target, EXPORT_TARGET_ATTR, "true");

    // Pin the container to the viewport origin.
    if kind == CaptureTarget::Container {
        if let Some(body) = find(root, &named("body")) {
            let reset = match attr(&body, "style") {
                Some(existing) if !existing.trim().is_empty() => {
                    format!("{};margin:0!important;padding:0!important", existing.trim().trim_end_matches(';'))
                }
                _ => "margin:0!important;padding:0!important".to_string(),
            };
            set_attr(&body, "style", &reset);
        }
    }
    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_gets_overrides_and_marker() {
        let dom = parse_markup(
            r#"<html><body><div id="card-container" style="transform: scale(0.5);">x</div></body></html>"#,
        )
        .unwrap();
        assert_eq!(prepare_capture_target(&dom).unwrap(), CaptureTarget::Container);

        let out = serialize_document(&dom).unwrap();
        assert!(out.contains("transform: scale(0.5);transform:none!important"));
        assert!(out.contains(r#"data-export-target="true""#));
        assert!(out.contains(r#"<body style="margin:0!important;padding:0!important">"#));
    }

    #[test]
    fn falls_back_to_body() {
        let dom = parse_markup("<p>no container</p>").unwrap();
        assert_eq!(prepare_capture_target(&dom).unwrap(), CaptureTarget::Body);
        let out = serialize_document(&dom).unwrap();
        assert!(out.contains(r#"<body style="transform:none!important"#));
    }

    #[test]
    fn retain_removes_matching_subtrees() {
        let dom = parse_markup("<div><span>a</span><b>b</b><span>c</span></div>").unwrap();
        let removed = retain(&dom.document, &|n| local_name(n) != Some("span"));
        assert_eq!(removed, 2);
        let out = serialize_document(&dom).unwrap();
        assert!(out.contains("<div><b>b</b></div>"));
    }

    #[test]
    fn set_attr_replaces_existing_value() {
        let dom = parse_markup(r#"<a href="x">y</a>"#).unwrap();
        let link = find(&dom.document, &|n| local_name(n) == Some("a")).unwrap();
        set_attr(&link, "href", "z");
        assert_eq!(attr(&link, "href").as_deref(), Some("z"));
    }
}
