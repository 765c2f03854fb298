//! "Copy code": put a card's raw markup on the system clipboard.

use crate::error::CardsError;
use crate::model::GeneratedCard;
use tracing::info;

/// Copy `markup` verbatim to the system clipboard.
pub fn copy_markup(markup: &str) -> Result<(), CardsError> {
    let mut clipboard = arboard::Clipboard::new()
        .map_err(|e| CardsError::Internal(format!("clipboard unavailable: {e}")))?;
    clipboard
        .set_text(markup.to_owned())
        .map_err(|e| CardsError::Internal(format!("clipboard write failed: {e}")))?;
    info!("Copied {} bytes of markup to the clipboard", markup.len());
    Ok(())
}

pub fn copy_card(card: &GeneratedCard) -> Result<(), CardsError> {
    copy_markup(&card.html)
}
