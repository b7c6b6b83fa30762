use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::counter;
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::{ErrorReport, HttpError};
use crate::domain::entities::UserRecord;

use super::public::HttpState;

/// Per-request data shared with handlers and the response logger.
#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
    /// `None` for anonymous requests and for header values naming an unknown user.
    pub viewer: Option<UserRecord>,
}

impl RequestContext {
    pub fn viewer_name(&self) -> &str {
        self.viewer
            .as_ref()
            .map(|user| user.username.as_str())
            .unwrap_or("")
    }
}

pub async fn set_request_context(
    State(state): State<HttpState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    const SOURCE: &str = "infra::http::middleware::set_request_context";

    let request_id = Uuid::new_v4().to_string();
    let viewer = match claimed_username(request.headers(), &state) {
        Some(username) => match state.users.find_by_username(&username).await {
            Ok(user) => user,
            Err(err) => {
                error!(
                    target = "folio::http::identity",
                    request_id = %request_id,
                    username = %username,
                    error = %err,
                    "failed to resolve request user"
                );
                return HttpError::internal(SOURCE, &err).into_response();
            }
        },
        None => None,
    };

    let ctx = RequestContext { request_id, viewer };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

fn claimed_username(headers: &HeaderMap, state: &HttpState) -> Option<String> {
    let value = headers.get(&state.auth.user_header)?.to_str().ok()?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let (request_id, viewer) = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| (ctx.request_id.clone(), ctx.viewer_name().to_string()))
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();
    counter!("folio_http_responses_total", "class" => status_class(status)).increment(1);

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "folio::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                viewer = viewer,
                "request failed",
            );
        } else {
            warn!(
                target = "folio::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                viewer = viewer,
                "client request error",
            );
        }
    }

    response
}

fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes_group_by_hundreds() {
        assert_eq!(status_class(StatusCode::OK), "2xx");
        assert_eq!(status_class(StatusCode::FOUND), "3xx");
        assert_eq!(status_class(StatusCode::NOT_FOUND), "4xx");
        assert_eq!(status_class(StatusCode::SERVICE_UNAVAILABLE), "5xx");
    }
}
