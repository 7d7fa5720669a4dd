use crate::error::{ChatError, ChatResult};

/// Trim message content and check it is non-empty and at most `max_chars`
/// characters long. Returns the trimmed content.
pub fn validate_content(content: &str, max_chars: usize) -> ChatResult<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ChatError::Invalid("Content is required".to_string()));
    }
    if trimmed.chars().count() > max_chars {
        return Err(ChatError::Invalid(format!(
            "Content must be at most {max_chars} characters"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_is_trimmed() {
        assert_eq!(validate_content("  hi there \n", 100).unwrap(), "hi there");
    }

    #[test]
    fn test_blank_content_is_rejected() {
        assert!(validate_content("", 100).is_err());
        assert!(validate_content(" \t\n", 100).is_err());
    }

    #[test]
    fn test_length_counts_characters() {
        assert!(validate_content("héllo", 5).is_ok());
        assert!(validate_content("héllo!", 5).is_err());
    }
}
