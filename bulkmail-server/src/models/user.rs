//! Username and SMTP port validation

use super::ValidationError;

const MAX_USERNAME_LEN: usize = 64;

/// Validated login name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username(String);

impl Username {
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::Empty { field: "username" });
        }

        if trimmed.chars().count() > MAX_USERNAME_LEN {
            return Err(ValidationError::TooLong {
                field: "username",
                max: MAX_USERNAME_LEN,
            });
        }

        if trimmed.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidFormat {
                field: "username",
                reason: "must not contain whitespace",
            });
        }

        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// TCP port of a sender's SMTP server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmtpPort(i32);

impl SmtpPort {
    pub fn new(port: i32) -> Result<Self, ValidationError> {
        if !(1..=i32::from(u16::MAX)).contains(&port) {
            return Err(ValidationError::InvalidFormat {
                field: "smtp_port",
                reason: "must be between 1 and 65535",
            });
        }
        Ok(Self(port))
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smtp_port_range() {
        assert_eq!(SmtpPort::new(465).unwrap().get(), 465);
        assert!(SmtpPort::new(65535).is_ok());
        for bad in [0, -25, 65536, 70000] {
            assert!(
                matches!(
                    SmtpPort::new(bad),
                    Err(ValidationError::InvalidFormat { field: "smtp_port", .. })
                ),
                "accepted {bad}"
            );
        }
    }

    #[test]
    fn accepts_plain_names() {
        assert_eq!(Username::new(" admin ").unwrap().as_str(), "admin");
        assert!(Username::new("laura.diaz").is_ok());
    }

    #[test]
    fn rejects_inner_whitespace() {
        let err = Username::new("laura diaz").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { .. }));
    }

    #[test]
    fn rejects_empty_and_long() {
        assert!(matches!(
            Username::new("").unwrap_err(),
            ValidationError::Empty { .. }
        ));
        assert!(matches!(
            Username::new(&"u".repeat(65)).unwrap_err(),
            ValidationError::TooLong { max: 64, .. }
        ));
    }
}
