//! Data model: the design blueprint produced by analysis and the cards
//! rendered from it.
//!
//! Field names serialise in camelCase because the blueprint is exchanged
//! verbatim with the generation service as structured JSON (see
//! [`blueprint_response_schema`]).

use crate::config::CardStyle;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Logical card width in CSS pixels.
pub const CARD_WIDTH: u32 = 700;

/// Logical card height in CSS pixels.
pub const CARD_HEIGHT: u32 = 1160;

/// `id` of the element wrapping the whole card in rendered markup.
pub const CARD_CONTAINER_ID: &str = "card-container";

/// The structured design plan produced once per document analysis.
///
/// Immutable once produced. The workflow shares it behind an `Arc` with every
/// card-render call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignBlueprint {
    pub style: CardStyle,
    pub theme_color: String,
    pub secondary_color: String,
    pub font_pairing: FontPairing,
    /// Ordered card plan. Index 0 is the cover card by convention.
    pub card_outlines: Vec<CardOutline>,
    pub description: String,
}

impl DesignBlueprint {
    pub fn card_count(&self) -> usize {
        self.card_outlines.len()
    }

    pub fn outline(&self, index: usize) -> Option<&CardOutline> {
        self.card_outlines.get(index)
    }

    /// Index of the last card, `None` for an (invalid) empty blueprint.
    pub fn last_index(&self) -> Option<usize> {
        self.card_outlines.len().checked_sub(1)
    }
}

/// Heading / body typeface recommendation. Free text; not checked against
/// installed fonts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontPairing {
    pub heading: String,
    pub body: String,
}

/// One planned card: a title plus ordered textual points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardOutline {
    pub title: String,
    #[serde(default)]
    pub points: Vec<String>,
}

/// A rendered card. Replaced, never accumulated, on each successful render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCard {
    /// 0-based position within the blueprint's outlines.
    pub index: usize,
    /// Complete, self-contained HTML document.
    pub html: String,
    /// Copy of the outline title at generation time.
    pub title: String,
}

/// Token usage reported by the generation service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub requests: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl UsageStats {
    pub fn record(&mut self, input_tokens: u32, output_tokens: u32) {
        self.requests += 1;
        self.input_tokens += u64::from(input_tokens);
        self.output_tokens += u64::from(output_tokens);
    }
}

/// Response schema sent with the analysis request.
///
/// Uses the OpenAPI subset understood by Gemini's `responseSchema`. The
/// service enforces it server-side; the client still validates by
/// deserialising into [`DesignBlueprint`].
pub fn blueprint_response_schema() -> Value {
    let styles: Vec<&str> = CardStyle::ALL.iter().map(|s| s.as_str()).collect();
    json!({
        "type": "OBJECT",
        "properties": {
            "style": { "type": "STRING", "enum": styles },
            "themeColor": { "type": "STRING", "description": "Primary colour as a hex code" },
            "secondaryColor": { "type": "STRING", "description": "Accent colour as a hex code" },
            "fontPairing": {
                "type": "OBJECT",
                "properties": {
                    "heading": { "type": "STRING" },
                    "body": { "type": "STRING" }
                },
                "required": ["heading", "body"]
            },
            "cardOutlines": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "title": { "type": "STRING" },
                        "points": { "type": "ARRAY", "items": { "type": "STRING" } }
                    },
                    "required": ["title", "points"]
                }
            },
            "description": { "type": "STRING" }
        },
        "required": [
            "style",
            "themeColor",
            "secondaryColor",
            "fontPairing",
            "cardOutlines",
            "description"
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blueprint_deserialises_from_camel_case() {
        let raw = r##"{
            "style": "minimalist",
            "themeColor": "#1f2937",
            "secondaryColor": "#f59e0b",
            "fontPairing": {"heading": "Playfair Display", "body": "Inter"},
            "cardOutlines": [
                {"title": "Overview", "points": ["a", "b"]},
                {"title": "Details", "points": []}
            ],
            "description": "Calm and clean"
        }"##;
        let bp: DesignBlueprint = serde_json::from_str(raw).expect("valid blueprint");
        assert_eq!(bp.style, CardStyle::Minimalist);
        assert_eq!(bp.card_count(), 2);
        assert_eq!(bp.last_index(), Some(1));
        assert_eq!(bp.outline(0).map(|o| o.title.as_str()), Some("Overview"));
        assert!(bp.outline(2).is_none());
    }

    #[test]
    fn schema_lists_every_style() {
        let schema = blueprint_response_schema();
        let styles = schema["properties"]["style"]["enum"]
            .as_array()
            .expect("enum array");
        assert_eq!(styles.len(), CardStyle::ALL.len());
        assert_eq!(schema["required"].as_array().map(|r| r.len()), Some(6));
    }

    #[test]
    fn usage_accumulates() {
        let mut usage = UsageStats::default();
        usage.record(100, 20);
        usage.record(50, 5);
        assert_eq!(usage.requests, 2);
        assert_eq!(usage.input_tokens, 150);
        assert_eq!(usage.output_tokens, 25);
    }
}
