//! Mailing list name validation

use super::ValidationError;

/// Maximum length for list names
const MAX_LIST_NAME_LEN: usize = 255;

/// Validated mailing list name (trimmed, non-empty)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListName(String);

impl ListName {
    /// Create a list name.
    ///
    /// # Rules
    /// - Surrounding whitespace is trimmed
    /// - Must not be empty after trimming
    /// - Max 255 characters
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::Empty { field: "list name" });
        }

        if trimmed.chars().count() > MAX_LIST_NAME_LEN {
            return Err(ValidationError::TooLong {
                field: "list name",
                max: MAX_LIST_NAME_LEN,
            });
        }

        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ListName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_name() {
        let name = ListName::new("  Newsletter Octubre ").unwrap();
        assert_eq!(name.as_str(), "Newsletter Octubre");
    }

    #[test]
    fn rejects_blank() {
        let err = ListName::new(" \t ").unwrap_err();
        assert!(matches!(err, ValidationError::Empty { .. }));
    }

    #[test]
    fn max_length_counts_chars() {
        // multi-byte characters count once
        assert!(ListName::new(&"ñ".repeat(255)).is_ok());

        let err = ListName::new(&"a".repeat(256)).unwrap_err();
        assert!(matches!(err, ValidationError::TooLong { max: 255, .. }));
    }
}
