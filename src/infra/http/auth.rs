//! Request identity extractors and the login redirect.

use std::convert::Infallible;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderValue, StatusCode, Uri, header::LOCATION, request::Parts},
    response::{IntoResponse, Response},
};
use url::form_urlencoded;

use crate::application::error::HttpError;
use crate::domain::entities::UserRecord;

use super::middleware::RequestContext;
use super::public::HttpState;

/// The signed-in user. Anonymous requests are redirected to the login page.
pub struct CurrentUser(pub UserRecord);

/// The signed-in user, if any.
pub struct Viewer(pub Option<UserRecord>);

fn viewer_from_parts(parts: &Parts) -> Option<UserRecord> {
    parts
        .extensions
        .get::<RequestContext>()
        .and_then(|ctx| ctx.viewer.clone())
}

impl<S> FromRequestParts<S> for CurrentUser
where
    HttpState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match viewer_from_parts(parts) {
            Some(user) => Ok(CurrentUser(user)),
            None => {
                let state = HttpState::from_ref(state);
                Err(login_redirect(&state.auth.login_url, &parts.uri))
            }
        }
    }
}

impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Viewer(viewer_from_parts(parts)))
    }
}

/// Redirect to `login_url` carrying the original path and query as `next`.
pub fn login_redirect(login_url: &str, uri: &Uri) -> Response {
    found(&login_location(login_url, uri))
}

fn login_location(login_url: &str, uri: &Uri) -> String {
    let next = uri
        .path_and_query()
        .map(|value| value.as_str())
        .unwrap_or("/");
    // Slashes stay readable: `?next=/create/`.
    let encoded = form_urlencoded::byte_serialize(next.as_bytes())
        .collect::<String>()
        .replace("%2F", "/");
    let separator = if login_url.contains('?') { '&' } else { '?' };
    format!("{login_url}{separator}next={encoded}")
}

/// `302 Found` pointing at `location`.
pub fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(LOCATION, value)]).into_response(),
        Err(err) => HttpError::internal("infra::http::auth::found", &err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_parameter_keeps_slashes() {
        let uri: Uri = "/create/".parse().expect("uri");
        assert_eq!(
            login_location("/auth/login/", &uri),
            "/auth/login/?next=/create/"
        );
    }

    #[test]
    fn next_parameter_escapes_query() {
        let uri: Uri = "/follow/?page=2".parse().expect("uri");
        assert_eq!(
            login_location("/auth/login/", &uri),
            "/auth/login/?next=/follow/%3Fpage%3D2"
        );
    }

    #[test]
    fn found_sets_location() {
        let response = found("/posts/3/");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(LOCATION).and_then(|v| v.to_str().ok()),
            Some("/posts/3/")
        );
    }
}
