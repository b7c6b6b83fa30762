//! Submitted form payloads and their validation.

use bytes::Bytes;
use serde::Deserialize;

use crate::domain::entities::GroupRecord;
use crate::domain::posts::normalize_text;

pub const INVALID_CHOICE_MESSAGE: &str = "Select a valid choice. That choice is not one of the available choices.";
pub const INVALID_IMAGE_MESSAGE: &str = "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";
pub const EMPTY_FILE_MESSAGE: &str = "The submitted file is empty.";

/// A file part of a multipart submission, fully buffered.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub data: Bytes,
}

/// Raw post form values as submitted by the browser.
#[derive(Debug, Clone, Default)]
pub struct PostSubmission {
    pub text: String,
    /// Group id as sent by the `<select>`; empty means no group.
    pub group: Option<String>,
    pub image: Option<UploadedImage>,
    /// The `image-clear` checkbox of the edit form.
    pub clear_image: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommentSubmission {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFormErrors {
    pub text: Option<&'static str>,
    pub group: Option<&'static str>,
    pub image: Option<&'static str>,
}

impl PostFormErrors {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.group.is_none() && self.image.is_none()
    }
}

#[derive(Debug, Clone)]
pub enum ImageChange {
    Keep,
    Clear,
    Replace(UploadedImage),
}

/// A post submission that passed validation.
#[derive(Debug, Clone)]
pub struct ValidPost {
    pub text: String,
    pub group_id: Option<i64>,
    pub image: ImageChange,
}

/// The values a rejected form is re-rendered with.
#[derive(Debug, Clone)]
pub struct PostFormState {
    pub text: String,
    pub group: Option<String>,
    pub errors: PostFormErrors,
}

impl PostSubmission {
    pub fn validate(&self, groups: &[GroupRecord]) -> Result<ValidPost, PostFormErrors> {
        let mut errors = PostFormErrors::default();

        let text = match normalize_text(&self.text) {
            Ok(text) => Some(text),
            Err(message) => {
                errors.text = Some(message);
                None
            }
        };

        let group_id = match self.group.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                let found = raw
                    .parse::<i64>()
                    .ok()
                    .filter(|id| groups.iter().any(|group| group.id == *id));
                if found.is_none() {
                    errors.group = Some(INVALID_CHOICE_MESSAGE);
                }
                found
            }
        };

        let image = match &self.image {
            Some(upload) => match check_image(&upload.data) {
                Ok(()) => ImageChange::Replace(upload.clone()),
                Err(message) => {
                    errors.image = Some(message);
                    ImageChange::Keep
                }
            },
            None if self.clear_image => ImageChange::Clear,
            None => ImageChange::Keep,
        };

        match text {
            Some(text) if errors.is_empty() => Ok(ValidPost {
                text,
                group_id,
                image,
            }),
            _ => Err(errors),
        }
    }

    pub fn into_state(self, errors: PostFormErrors) -> PostFormState {
        PostFormState {
            text: self.text,
            group: self.group.filter(|value| !value.trim().is_empty()),
            errors,
        }
    }
}

impl CommentSubmission {
    pub fn validate(&self) -> Result<String, &'static str> {
        normalize_text(&self.text)
    }
}

/// The payload must decode as a raster image header.
fn check_image(data: &[u8]) -> Result<(), &'static str> {
    if data.is_empty() {
        return Err(EMPTY_FILE_MESSAGE);
    }
    match imagesize::blob_size(data) {
        Ok(size) if size.width > 0 && size.height > 0 => Ok(()),
        _ => Err(INVALID_IMAGE_MESSAGE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_GIF: &[u8] = &[
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
        0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
        0x00, 0x00, 0x02, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x0C, 0x0A, 0x00, 0x3B,
    ];

    fn group(id: i64) -> GroupRecord {
        GroupRecord {
            id,
            title: format!("Group {id}"),
            slug: format!("group-{id}"),
            description: String::new(),
        }
    }

    fn gif(name: &str, data: &'static [u8]) -> UploadedImage {
        UploadedImage {
            filename: name.to_string(),
            data: Bytes::from_static(data),
        }
    }

    #[test]
    fn valid_submission_trims_text_and_resolves_group() {
        let submission = PostSubmission {
            text: "  Hello  ".to_string(),
            group: Some("2".to_string()),
            image: Some(gif("small.gif", SMALL_GIF)),
            clear_image: false,
        };

        let valid = submission.validate(&[group(1), group(2)]).expect("valid form");
        assert_eq!(valid.text, "Hello");
        assert_eq!(valid.group_id, Some(2));
        assert!(matches!(valid.image, ImageChange::Replace(_)));
    }

    #[test]
    fn empty_group_means_no_group() {
        let submission = PostSubmission {
            text: "Hello".to_string(),
            group: Some(String::new()),
            ..Default::default()
        };
        let valid = submission.validate(&[group(1)]).expect("valid form");
        assert_eq!(valid.group_id, None);
        assert!(matches!(valid.image, ImageChange::Keep));
    }

    #[test]
    fn collects_every_field_error() {
        let submission = PostSubmission {
            text: "   ".to_string(),
            group: Some("42".to_string()),
            image: Some(gif("notes.gif", b"plain text, not an image")),
            clear_image: false,
        };

        let errors = submission.validate(&[group(1)]).expect_err("invalid form");
        assert!(errors.text.is_some());
        assert_eq!(errors.group, Some(INVALID_CHOICE_MESSAGE));
        assert_eq!(errors.image, Some(INVALID_IMAGE_MESSAGE));
    }

    #[test]
    fn empty_upload_is_rejected() {
        let submission = PostSubmission {
            text: "Hello".to_string(),
            image: Some(gif("empty.gif", b"")),
            ..Default::default()
        };
        let errors = submission.validate(&[]).expect_err("invalid form");
        assert_eq!(errors.image, Some(EMPTY_FILE_MESSAGE));
    }

    #[test]
    fn clear_checkbox_requests_image_removal() {
        let submission = PostSubmission {
            text: "Hello".to_string(),
            clear_image: true,
            ..Default::default()
        };
        let valid = submission.validate(&[]).expect("valid form");
        assert!(matches!(valid.image, ImageChange::Clear));
    }

    #[test]
    fn comment_requires_text() {
        assert!(CommentSubmission { text: " ".into() }.validate().is_err());
        assert_eq!(
            CommentSubmission { text: " hi ".into() }.validate().as_deref(),
            Ok("hi")
        );
    }
}
