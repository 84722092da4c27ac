//! Input validation applied before a request is published.
//!
//! Text length is measured in Unicode scalar values (`char`s), not bytes, so
//! the bound means the same thing for ASCII and non-ASCII input.

/// Maximum text length in Unicode scalar values.
pub const MAX_TEXT_CHARS: usize = 5000;

/// Reasons a request is rejected before it reaches the bus.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("text must not be empty")]
    EmptyText,
    #[error("text is {length} characters long, maximum is {max}")]
    TextTooLong { length: usize, max: usize },
    #[error("request_id must not be blank")]
    BlankRequestId,
}

/// Checks that `text` holds between 1 and [`MAX_TEXT_CHARS`] characters.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyText`] or [`ValidationError::TextTooLong`].
pub fn validate_text(text: &str) -> Result<(), ValidationError> {
    if text.is_empty() {
        return Err(ValidationError::EmptyText);
    }
    // Stop counting once past the bound; oversized input need not be walked fully.
    let length = text.chars().take(MAX_TEXT_CHARS + 1).count();
    if length > MAX_TEXT_CHARS {
        return Err(ValidationError::TextTooLong {
            length: text.chars().count(),
            max: MAX_TEXT_CHARS,
        });
    }
    Ok(())
}

/// Checks a caller-supplied request identifier.
///
/// The identifier becomes the partition key, so it must contain at least one
/// non-whitespace character.
///
/// # Errors
///
/// Returns [`ValidationError::BlankRequestId`].
pub fn validate_request_id(request_id: &str) -> Result<(), ValidationError> {
    if request_id.trim().is_empty() {
        Err(ValidationError::BlankRequestId)
    } else {
        Ok(())
    }
}
