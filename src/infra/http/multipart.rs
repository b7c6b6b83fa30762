//! Decoding of the multipart post form.

use axum::http::StatusCode;
use axum_extra::extract::Multipart;
use axum_extra::extract::multipart::{MultipartError, MultipartRejection};
use thiserror::Error;
use tracing::warn;

use crate::application::error::HttpError;
use crate::application::forms::{PostSubmission, UploadedImage};

const SOURCE: &str = "infra::http::multipart";

#[derive(Debug, Error)]
pub(super) enum PostFormError {
    #[error("request body exceeds the configured upload limit")]
    PayloadTooLarge(#[source] MultipartError),
    #[error("multipart form data could not be decoded")]
    Malformed(#[source] MultipartError),
}

impl From<PostFormError> for HttpError {
    fn from(err: PostFormError) -> Self {
        match &err {
            PostFormError::PayloadTooLarge(_) => HttpError::from_error(
                SOURCE,
                StatusCode::PAYLOAD_TOO_LARGE,
                "Uploaded file is too large",
                &err,
            ),
            PostFormError::Malformed(_) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Form data was invalid",
                &err,
            ),
        }
    }
}

/// Decode the post form for a handler.
///
/// A body that is not usable multipart data becomes an empty submission, so
/// the form is shown again with its field errors. Only an oversized body is
/// an error.
pub(super) async fn read_post_form(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<PostSubmission, PostFormError> {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            warn!(
                target = SOURCE,
                status = rejection.status().as_u16(),
                error = %rejection,
                "post form was not multipart"
            );
            return Ok(PostSubmission::default());
        }
    };

    match read_post_submission(&mut multipart).await {
        Err(PostFormError::Malformed(_)) => Ok(PostSubmission::default()),
        other => other,
    }
}

/// Read every field of the post form. Unknown fields are ignored.
async fn read_post_submission(
    multipart: &mut Multipart,
) -> Result<PostSubmission, PostFormError> {
    let mut submission = PostSubmission::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return Err(classify(err)),
        };

        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("text") => {
                submission.text = field.text().await.map_err(classify)?;
            }
            Some("group") => {
                submission.group = Some(field.text().await.map_err(classify)?);
            }
            Some("image-clear") => {
                let value = field.text().await.map_err(classify)?;
                submission.clear_image =
                    matches!(value.trim().to_ascii_lowercase().as_str(), "on" | "true" | "1");
            }
            Some("image") => {
                let filename = field
                    .file_name()
                    .map(|value| value.trim().to_string())
                    .unwrap_or_default();
                let data = field.bytes().await.map_err(classify)?;

                // Browsers send an empty, unnamed part when no file was chosen.
                if filename.is_empty() && data.is_empty() {
                    continue;
                }

                submission.image = Some(UploadedImage {
                    filename: if filename.is_empty() {
                        "upload".to_string()
                    } else {
                        filename
                    },
                    data,
                });
            }
            _ => continue,
        }
    }

    Ok(submission)
}

fn classify(err: MultipartError) -> PostFormError {
    let status = err.status();
    warn!(
        target = SOURCE,
        status = status.as_u16(),
        error = %err,
        "failed to read multipart payload"
    );
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        PostFormError::PayloadTooLarge(err)
    } else {
        PostFormError::Malformed(err)
    }
}
