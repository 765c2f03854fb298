//! Instructions sent to the generation service.
//!
//! Every prompt lives here so the wording can change without touching retry,
//! parsing or workflow logic, and so tests can inspect prompts directly.
//!
//! The exact wording is not part of the crate's contract. What *is* part of
//! the contract, and covered by tests, is what each prompt must mention:
//! the cover-card rule for analysis, and the fixed canvas size, container id,
//! cross-origin annotations and attribution line for rendering.

use crate::config::{CardStyle, StylePreference};
use crate::model::{DesignBlueprint, CARD_CONTAINER_ID, CARD_HEIGHT, CARD_WIDTH};
use std::fmt::Write as _;

/// Attribution line every rendered card must carry.
pub const ATTRIBUTION: &str = "Made with EdgeQuake Cards";

/// System instruction for the analysis (blueprint) call.
pub const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are an information designer who turns long documents into a short series of visual knowledge cards.

Rules:
1. Read the whole document and split it into 3-8 cards, ordered as a reader should see them.
2. The FIRST card is always the cover: a title for the whole document plus 2-4 points summarising it.
3. Every other card covers one idea: a short title and 2-6 concise points taken from the document.
4. Keep the document's language. Do not invent facts.
5. Recommend a primary colour and an accent colour as hex codes, and a heading/body font pairing available on Google Fonts.
6. Write a one-paragraph description explaining the visual choices.
7. Answer with JSON only, matching the provided schema."#;

/// System instruction for the card render call.
pub const RENDER_SYSTEM_PROMPT: &str = r#"You are a senior front-end designer. You produce one complete, self-contained HTML document per request, with inline CSS, that looks like a polished printed knowledge card.

Output ONLY the HTML document, starting with <!DOCTYPE html>. No commentary."#;

/// Build the user prompt for the analysis call.
pub fn analysis_prompt(text: &str, style: StylePreference) -> String {
    let style_line = match style {
        StylePreference::Auto => {
            let options: Vec<&str> = CardStyle::ALL.iter().map(|s| s.as_str()).collect();
            format!(
                "Choose the visual style that best fits the content, one of: {}.",
                options.join(", ")
            )
        }
        StylePreference::Fixed(style) => format!(
            "The visual style MUST be \"{}\" ({}).",
            style.as_str(),
            style.brief()
        ),
    };

    format!("{style_line}\n\nDocument:\n\"\"\"\n{text}\n\"\"\"")
}

/// Build the user prompt for rendering card `index` of `blueprint`.
///
/// The caller guarantees `index` is in range.
pub fn render_prompt(blueprint: &DesignBlueprint, index: usize) -> String {
    let total = blueprint.card_count();
    let outline = &blueprint.card_outlines[index];
    let is_cover = index == 0;

    let mut prompt = String::with_capacity(2048);
    let _ = writeln!(prompt, "Design card {} of {}.", index + 1, total);
    if is_cover {
        let _ = writeln!(
            prompt,
            "This is the COVER card: make the title dominant and treat the points as a summary of the whole series."
        );
    }
    let _ = writeln!(prompt, "\nTitle: {}", outline.title);
    let _ = writeln!(prompt, "Points:");
    for point in &outline.points {
        let _ = writeln!(prompt, "- {point}");
    }

    let _ = writeln!(
        prompt,
        "\nStyle: {} ({}).\nPrimary colour: {}. Accent colour: {}.\nFonts: \"{}\" for headings, \"{}\" for body text.",
        blueprint.style.as_str(),
        blueprint.style.brief(),
        blueprint.theme_color,
        blueprint.secondary_color,
        blueprint.font_pairing.heading,
        blueprint.font_pairing.body,
    );

    let _ = write!(
        prompt,
        "\nHard requirements:\n\
1. The page body has no margin. All content sits inside <div id=\"{CARD_CONTAINER_ID}\"> sized exactly {CARD_WIDTH}px x {CARD_HEIGHT}px with overflow hidden.\n\
2. Every external <link> and <script> carries crossorigin=\"anonymous\"; load fonts from fonts.googleapis.com only. No other external images.\n\
3. Show a small \"{current} / {total}\" page indicator.\n\
4. Place the text \"{ATTRIBUTION}\" in small type at the bottom-right corner of the card.\n\
5. Use all the points above; do not add facts.",
        current = index + 1,
    );

    prompt
}
