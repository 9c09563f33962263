use crate::error::{MailflowError, Result};

/// Basic email validation
pub fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() {
        return Err(MailflowError::Validation("Email is empty".to_string()));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(MailflowError::Validation(format!(
            "Email <{}> must contain @",
            email
        )));
    };

    if domain.contains('@') {
        return Err(MailflowError::Validation(format!(
            "Invalid email format <{}>",
            email
        )));
    }

    if local.is_empty() || domain.is_empty() {
        return Err(MailflowError::Validation(format!(
            "Email parts cannot be empty in <{}>",
            email
        )));
    }

    if email.chars().any(char::is_whitespace) {
        return Err(MailflowError::Validation(format!(
            "Email <{}> cannot contain whitespace",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(MailflowError::Validation(format!(
            "Domain of <{}> must contain a dot",
            email
        )));
    }

    Ok(())
}

/// A probe needs at least one recipient and every one must be valid
pub fn validate_recipients<S: AsRef<str>>(recipients: &[S]) -> Result<()> {
    if recipients.is_empty() {
        return Err(MailflowError::Validation(
            "At least one recipient is required".to_string(),
        ));
    }

    recipients
        .iter()
        .try_for_each(|recipient| validate_email(recipient.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(validate_email("test@example.com").is_ok());
        assert!(validate_email("user.name@example.co.uk").is_ok());
    }

    #[test]
    fn test_invalid_email() {
        assert!(validate_email("").is_err());
        assert!(validate_email("test").is_err());
        assert!(validate_email("test@").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("test@domain").is_err());
        assert!(validate_email("a@b@example.com").is_err());
        assert!(validate_email("john doe@example.com").is_err());
    }

    #[test]
    fn test_recipients() {
        assert!(validate_recipients(&["a@example.com", "b@example.org"]).is_ok());
        assert!(validate_recipients::<&str>(&[]).is_err());
        assert!(validate_recipients(&["a@example.com", "broken"]).is_err());
    }
}
