//! Message content validation
//!
//! Shared by the send pipeline (checked before any network call) and the
//! store (checked again before persisting).

use crate::core::error::{MessagingError, MessagingResult};

/// Default upper bound on message length, in characters
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 2000;

/// Validate message content and return it trimmed
///
/// Rejects empty and whitespace-only content, and content longer than
/// `max_len` characters after trimming.
pub fn validate_content(content: &str, max_len: usize) -> MessagingResult<&str> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(MessagingError::EmptyContent);
    }

    let len = trimmed.chars().count();
    if len > max_len {
        return Err(MessagingError::ContentTooLong { len, max: max_len });
    }

    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_blank_content() {
        assert_eq!(validate_content("", 10), Err(MessagingError::EmptyContent));
        assert_eq!(
            validate_content(" \n\t ", 10),
            Err(MessagingError::EmptyContent)
        );
    }

    #[test]
    fn test_trims_content() {
        assert_eq!(validate_content("  hello \n", 10), Ok("hello"));
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        assert_eq!(validate_content("नमस्ते", 6), Ok("नमस्ते"));
        assert_eq!(
            validate_content("abcdefg", 6),
            Err(MessagingError::ContentTooLong { len: 7, max: 6 })
        );
    }
}
