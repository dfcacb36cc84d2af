//! Validated customer input.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{CrmError, Result};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email validation regex must compile")
});

/// A customer to mirror into the CRM, keyed by email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerRecord {
    name: String,
    email: String,
    phone: String,
}

impl CustomerRecord {
    /// Validate and build a record. Surrounding whitespace is trimmed.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into().trim().to_string();
        let email = email.into().trim().to_string();
        let phone = phone.into().trim().to_string();

        if name.is_empty() {
            return Err(CrmError::InvalidArgument("name must not be empty".to_string()));
        }
        if !EMAIL_RE.is_match(&email) {
            return Err(CrmError::InvalidArgument(format!(
                "'{email}' is not a valid email address"
            )));
        }
        if phone.is_empty() {
            return Err(CrmError::InvalidArgument("phone must not be empty".to_string()));
        }
        Ok(Self { name, email, phone })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_and_trims_valid_input() {
        let record = CustomerRecord::new(" Ann ", "ann@example.com ", "+7 999 000").unwrap();
        assert_eq!(record.name(), "Ann");
        assert_eq!(record.email(), "ann@example.com");
        assert_eq!(record.phone(), "+7 999 000");
    }

    #[test]
    fn rejects_empty_name_and_phone() {
        assert!(matches!(
            CustomerRecord::new("", "a@b.co", "1"),
            Err(CrmError::InvalidArgument(_))
        ));
        assert!(matches!(
            CustomerRecord::new("Ann", "a@b.co", "   "),
            Err(CrmError::InvalidArgument(_))
        ));
    }

    #[test]
    fn rejects_malformed_email() {
        for email in ["", "ann", "ann@", "@example.com", "ann@example", "a b@c.d"] {
            assert!(
                CustomerRecord::new("Ann", email, "1").is_err(),
                "{email} should be rejected"
            );
        }
    }
}
