//! Group slug derivation and validation.
//!
//! Slugs identify groups in URLs (`/group/<slug>/`), so they are restricted
//! to ASCII letters, digits, hyphens and underscores and capped at
//! [`MAX_SLUG_LEN`] characters.

use slug::slugify;
use thiserror::Error;

pub const MAX_SLUG_LEN: usize = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
    #[error("slug must be at most {MAX_SLUG_LEN} characters")]
    TooLong,
    #[error("slug may only contain letters, digits, hyphens and underscores")]
    InvalidCharacters,
}

/// Derive a slug from a human-readable title.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let mut candidate = slugify(input);
    if candidate.len() > MAX_SLUG_LEN {
        candidate.truncate(MAX_SLUG_LEN);
        while candidate.ends_with('-') {
            candidate.pop();
        }
    }

    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// Check an operator-supplied slug.
pub fn validate_slug(slug: &str) -> Result<(), SlugError> {
    if slug.is_empty() {
        return Err(SlugError::EmptyInput);
    }
    if slug.chars().count() > MAX_SLUG_LEN {
        return Err(SlugError::TooLong);
    }
    if !slug
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(SlugError::InvalidCharacters);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_slug_lowercases_and_hyphenates() {
        assert_eq!(derive_slug("Cats & Dogs").expect("slug"), "cats-dogs");
    }

    #[test]
    fn derive_slug_caps_length_without_trailing_hyphen() {
        let slug = derive_slug("an extremely long group title about many things").expect("slug");
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn derive_slug_rejects_blank_input() {
        assert_eq!(derive_slug("   "), Err(SlugError::EmptyInput));
    }

    #[test]
    fn validate_slug_enforces_charset_and_length() {
        assert!(validate_slug("test-slug_2").is_ok());
        assert_eq!(validate_slug("with space"), Err(SlugError::InvalidCharacters));
        assert_eq!(validate_slug(&"a".repeat(31)), Err(SlugError::TooLong));
        assert_eq!(validate_slug(""), Err(SlugError::EmptyInput));
    }
}
