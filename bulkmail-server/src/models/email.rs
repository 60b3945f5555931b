//! Email address validation and bulk-import screening

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use super::ValidationError;

/// Loose shape check: something@something.something, no whitespace
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("invalid email regex"));

/// Validated, normalized (trimmed + lowercase) email address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Normalize and validate an address.
    ///
    /// # Example
    /// ```
    /// use bulkmail_server::models::EmailAddress;
    ///
    /// let email = EmailAddress::parse("  Ana@Example.COM ").unwrap();
    /// assert_eq!(email.as_str(), "ana@example.com");
    /// assert!(EmailAddress::parse("not-an-email").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let normalized = raw.trim().to_lowercase();

        if normalized.is_empty() {
            return Err(ValidationError::Empty { field: "email" });
        }

        if !EMAIL_RE.is_match(&normalized) {
            return Err(ValidationError::InvalidFormat {
                field: "email",
                reason: "must look like name@domain.tld",
            });
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Domain part of the address.
    pub fn domain(&self) -> &str {
        domain_of(&self.0).unwrap_or_default()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Domain of a stored address: the text after the first `@`.
///
/// Stored rows predate validation, so this tolerates junk and returns
/// `None` when there is no usable domain.
pub fn domain_of(email: &str) -> Option<&str> {
    email
        .split('@')
        .nth(1)
        .filter(|domain| !domain.is_empty())
}

/// Result of screening a raw import payload before it touches the database.
#[derive(Debug, Default)]
pub struct ImportBatch {
    /// Unique, valid addresses in first-seen order
    pub accepted: Vec<EmailAddress>,
    /// Entries that failed validation
    pub malformed: usize,
    /// Valid entries repeated within the payload
    pub duplicates: usize,
}

impl ImportBatch {
    /// Screen raw entries: normalize, drop malformed, drop in-payload repeats.
    pub fn screen<S: AsRef<str>>(raw: &[S]) -> Self {
        let mut seen = HashSet::new();
        let mut batch = Self::default();

        for entry in raw {
            let Ok(email) = EmailAddress::parse(entry.as_ref()) else {
                batch.malformed += 1;
                continue;
            };

            if !seen.insert(email.clone()) {
                batch.duplicates += 1;
                continue;
            }

            batch.accepted.push(email);
        }

        batch
    }
}
