//! Input validation errors

/// Rejected user input; every variant maps to a 400
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Empty { field: &'static str },

    #[error("{field} exceeds maximum length of {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{field}: {reason}")]
    InvalidFormat {
        field: &'static str,
        reason: &'static str,
    },

    /// Path or body id that is not a positive integer
    #[error("{field} must be a positive integer, got '{value}'")]
    InvalidId { field: &'static str, value: String },
}
