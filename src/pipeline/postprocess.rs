//! Post-processing: pull the payload out of a model's raw text answer.
//!
//! Even when told to answer with a bare document, models often wrap it in a
//! fenced code block (```` ```html … ``` ````), and occasionally prefix it with
//! a sentence of commentary. The rules here are deterministic and only ever
//! remove the wrapper, never touch the content.

use once_cell::sync::Lazy;
use regex::Regex;

/// Opening fence (labelled `html` in any case, or unlabelled) up to the
/// last closing fence. Greedy so a fence *inside* the document does not end
/// the match early. The newline after the label is optional.
static RE_FENCED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\A```(?i:html)?[ \t]*\r?\n?(.*)```").unwrap());

/// Opening fence with no closing fence (answer cut off by the token limit).
static RE_OPEN_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\A```(?i:html)?[ \t]*\r?\n?(.*)\z").unwrap());

/// Same idea for the analysis call's JSON answer.
static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\A```(?i:json)?[ \t]*\r?\n?(.*)```\s*\z").unwrap());

/// Where the wrapper fence starts: at the top of the answer, or after a line
/// of plain commentary. A fence that follows markup belongs to the document.
fn fence_start(text: &str) -> Option<usize> {
    let pos = text.find("```")?;
    (!text[..pos].contains('<')).then_some(pos)
}

/// Extract the markup document from a raw render response.
///
/// Rules, in order:
/// 1. A fenced block opens the answer (optionally after plain commentary)
///    → everything up to its last closing fence.
/// 2. The opening fence was never closed → everything after it.
/// 3. No wrapper fence → the answer as-is.
///
/// The result is always trimmed.
pub fn extract_markup(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(start) = fence_start(trimmed) else {
        return trimmed.to_string();
    };
    let fenced = &trimmed[start..];

    if let Some(caps) = RE_FENCED.captures(fenced) {
        return caps[1].trim().to_string();
    }
    if let Some(caps) = RE_OPEN_FENCE.captures(fenced) {
        return caps[1].trim().to_string();
    }
    trimmed.to_string()
}

/// Strip an optional ```` ```json ```` fence around a structured answer.
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    match RE_JSON_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_fence_is_stripped() {
        let input = "```html\n<!DOCTYPE html>\n<html><body>x</body></html>\n```";
        assert_eq!(
            extract_markup(input),
            "<!DOCTYPE html>\n<html><body>x</body></html>"
        );
    }

    #[test]
    fn unlabelled_fence_is_stripped() {
        let input = "```\n<div>card</div>\n```";
        assert_eq!(extract_markup(input), "<div>card</div>");
    }

    #[test]
    fn uppercase_label_and_surrounding_whitespace() {
        let input = "\n\n  ```HTML\n  <p>hi</p>  \n```\n\n";
        assert_eq!(extract_markup(input), "<p>hi</p>");
    }

    #[test]
    fn no_fence_passthrough_trimmed() {
        assert_eq!(extract_markup("  <html></html>\n"), "<html></html>");
    }

    #[test]
    fn crlf_fences() {
        let input = "```html\r\n<p>x</p>\r\n```";
        assert_eq!(extract_markup(input), "<p>x</p>");
    }

    #[test]
    fn inner_fence_does_not_truncate_document() {
        let input = "```html\n<pre>\n```\nnested\n```\n</pre>\n```";
        assert_eq!(extract_markup(input), "<pre>\n```\nnested\n```\n</pre>");
    }

    #[test]
    fn commentary_around_fence() {
        let input = "Here is your card:\n```html\n<p>x</p>\n```\nEnjoy!";
        assert_eq!(extract_markup(input), "<p>x</p>");
    }

    #[test]
    fn closing_fence_on_last_content_line() {
        assert_eq!(extract_markup("```html\n<p>x</p>```"), "<p>x</p>");
    }

    #[test]
    fn unterminated_fence() {
        let input = "```html\n<html><body>cut off";
        assert_eq!(extract_markup(input), "<html><body>cut off");
    }

    #[test]
    fn json_fence_is_stripped() {
        assert_eq!(extract_json("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json(" {\"a\":1} "), "{\"a\":1}");
        assert_eq!(extract_json("```json{\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn single_line_fence_is_stripped() {
        assert_eq!(
            extract_markup("```html<html><body>x</body></html>```"),
            "<html><body>x</body></html>"
        );
        assert_eq!(extract_markup("```<p>x</p>```"), "<p>x</p>");
    }

    #[test]
    fn unfenced_document_with_code_sample_is_kept_whole() {
        let input = "<!DOCTYPE html><html><body><pre>```\nlet x = 1;\n```</pre></body></html>";
        assert_eq!(extract_markup(input), input);
    }

    #[test]
    fn commentary_mentioning_markup_is_not_a_wrapper() {
        let input = "<p>See:</p>\n```html\n<b>x</b>\n```";
        assert_eq!(extract_markup(input), input);
    }
}
