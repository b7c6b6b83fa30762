use super::error::DomainError;

pub const MAX_USERNAME_LEN: usize = 150;

/// Usernames appear verbatim in `/profile/<username>/` paths.
pub fn validate_username(username: &str) -> Result<(), DomainError> {
    if username.is_empty() {
        return Err(DomainError::validation("username", "must not be empty"));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(DomainError::validation(
            "username",
            format!("must be at most {MAX_USERNAME_LEN} characters"),
        ));
    }
    if !username
        .chars()
        .all(|ch| ch.is_alphanumeric() || matches!(ch, '@' | '.' | '+' | '-' | '_'))
    {
        return Err(DomainError::validation(
            "username",
            "may only contain letters, digits and @/./+/-/_",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_unicode_letters_and_punctuation() {
        assert!(validate_username("testuser").is_ok());
        assert!(validate_username("лев.толстой+1@home").is_ok());
    }

    #[test]
    fn rejects_slashes_spaces_and_blank() {
        assert!(validate_username("").is_err());
        assert!(validate_username("a b").is_err());
        assert!(validate_username("a/b").is_err());
        assert!(validate_username(&"x".repeat(151)).is_err());
    }
}
