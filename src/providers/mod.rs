mod error;
mod openai_compatible;

pub use error::{ProviderError, ProviderErrorKind};
pub use openai_compatible::OpenAiCompatibleProvider;

/// Truncate for logs and error messages, respecting UTF-8 char boundaries.
pub(crate) fn truncate_utf8(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
