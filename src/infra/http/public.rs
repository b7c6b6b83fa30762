use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, Path, RawQuery, State},
    http::{
        HeaderValue, StatusCode, Uri,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use tracing::error;

use crate::{
    application::{
        error::{ErrorReport, HttpError},
        feed::{FeedError, FeedService},
        follows::FollowService,
        pagination::PageQuery,
        posts::{PostError, PostService},
        repos::{HealthRepo, UsersRepo},
    },
    cache::PageCache,
    config::AuthSettings,
    domain::entities::UserRecord,
    infra::uploads::UploadStorage,
    presentation::views::{
        FeedFragment, FeedView, FollowTemplate, FollowView, GroupTemplate, GroupView,
        IndexTemplate, IndexView, LayoutChrome, LayoutContext, PostDetailTemplate,
        PostDetailView, ProfileTemplate, ProfileView, profile_href, render_not_found_response,
        render_template_response,
    },
};

use super::{
    auth::{CurrentUser, Viewer},
    db_health_response,
    middleware::{log_responses, set_request_context},
    writes,
};

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub posts: Arc<PostService>,
    pub follows: Arc<FollowService>,
    pub users: Arc<dyn UsersRepo>,
    pub health: Arc<dyn HealthRepo>,
    pub cache: Arc<dyn PageCache>,
    pub upload_storage: Arc<UploadStorage>,
    pub auth: Arc<AuthSettings>,
    /// Characters of post text used as the detail page title.
    pub preview_length: usize,
}

impl HttpState {
    pub(super) fn chrome(&self, viewer: Option<&UserRecord>) -> LayoutChrome {
        LayoutChrome::new(viewer, &self.auth.login_url)
    }
}

pub fn build_router(state: HttpState, upload_limit: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/group/{slug}/", get(group_posts))
        .route("/profile/{username}/", get(profile))
        .route("/posts/{id}/", get(post_detail))
        .route("/follow/", get(follow_index))
        .route("/media/{*path}", get(serve_media))
        .route("/_health/db", get(public_health))
        .merge(writes::routes())
        .fallback(fallback)
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            set_request_context,
        ))
        .with_state(state)
}

/// Post ids in paths are positive integers; anything else names no post.
pub(super) fn parse_post_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().filter(|id| *id > 0)
}

fn cache_key(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|value| value.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

async fn index(
    State(state): State<HttpState>,
    Viewer(viewer): Viewer,
    uri: Uri,
    RawQuery(raw_query): RawQuery,
) -> Response {
    let query = PageQuery::from_query(raw_query.as_deref());
    let chrome = state.chrome(viewer.as_ref()).with_active("index");
    let key = cache_key(&uri);

    let feed_html = match state.cache.get(&key) {
        Some(html) => html,
        None => {
            let page = match state.feed.index(query.as_deref()).await {
                Ok(page) => page,
                Err(err) => return feed_error_to_response(err, chrome),
            };
            // Shared by every viewer: rendered without edit links.
            match FeedFragment::render_html(FeedView::new(&page, None)) {
                Ok(html) => {
                    state.cache.set(key, html.clone());
                    html
                }
                Err(err) => return err.into_response(),
            }
        }
    };

    let view = LayoutContext::new(chrome, "Latest posts", IndexView { feed_html });
    render_template_response(IndexTemplate { view }, StatusCode::OK)
}

async fn group_posts(
    State(state): State<HttpState>,
    Viewer(viewer): Viewer,
    Path(slug): Path<String>,
    RawQuery(raw_query): RawQuery,
) -> Response {
    let query = PageQuery::from_query(raw_query.as_deref());
    let chrome = state.chrome(viewer.as_ref());

    match state.feed.group(&slug, query.as_deref()).await {
        Ok(feed) => {
            let fragment = FeedView::new(&feed.page, viewer.as_ref()).without_group_links();
            let feed_html = match FeedFragment::render_html(fragment) {
                Ok(html) => html,
                Err(err) => return err.into_response(),
            };
            let title = feed.group.title.clone();
            let view = LayoutContext::new(chrome, title, GroupView::new(&feed.group, feed_html));
            render_template_response(GroupTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, chrome),
    }
}

async fn profile(
    State(state): State<HttpState>,
    Viewer(viewer): Viewer,
    Path(username): Path<String>,
    RawQuery(raw_query): RawQuery,
) -> Response {
    let query = PageQuery::from_query(raw_query.as_deref());
    let chrome = state.chrome(viewer.as_ref());

    match state
        .feed
        .profile(&username, viewer.as_ref(), query.as_deref())
        .await
    {
        Ok(feed) => {
            let feed_html = match FeedFragment::render_html(FeedView::new(
                &feed.page,
                viewer.as_ref(),
            )) {
                Ok(html) => html,
                Err(err) => return err.into_response(),
            };
            let author = feed.author.username.clone();
            let base = profile_href(&author);
            let content = ProfileView {
                post_count: feed.post_count(),
                following: feed.following,
                show_follow_controls: viewer
                    .as_ref()
                    .is_some_and(|viewer| viewer.id != feed.author.id),
                follow_href: format!("{base}follow/"),
                unfollow_href: format!("{base}unfollow/"),
                author: author.clone(),
                feed_html,
            };
            let view = LayoutContext::new(chrome, format!("Profile of {author}"), content);
            render_template_response(ProfileTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, chrome),
    }
}

async fn post_detail(
    State(state): State<HttpState>,
    Viewer(viewer): Viewer,
    Path(raw_id): Path<String>,
) -> Response {
    let chrome = state.chrome(viewer.as_ref());
    let Some(id) = parse_post_id(&raw_id) else {
        return render_not_found_response(chrome);
    };

    match state.posts.detail(id).await {
        Ok(detail) => {
            let content = PostDetailView::new(
                &detail.post,
                &detail.comments,
                detail.author_post_count,
                viewer.as_ref(),
                state.preview_length,
            );
            let title = content.title.clone();
            let view = LayoutContext::new(chrome, title, content);
            render_template_response(PostDetailTemplate { view }, StatusCode::OK)
        }
        Err(err) => post_error_to_response(err, chrome),
    }
}

async fn follow_index(
    State(state): State<HttpState>,
    CurrentUser(viewer): CurrentUser,
    RawQuery(raw_query): RawQuery,
) -> Response {
    let query = PageQuery::from_query(raw_query.as_deref());
    let chrome = state.chrome(Some(&viewer)).with_active("follow");

    match state.feed.follow(&viewer, query.as_deref()).await {
        Ok(page) => {
            let feed_html = match FeedFragment::render_html(FeedView::new(&page, Some(&viewer))) {
                Ok(html) => html,
                Err(err) => return err.into_response(),
            };
            let view = LayoutContext::new(chrome, "Following", FollowView { feed_html });
            render_template_response(FollowTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, chrome),
    }
}

async fn serve_media(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_media";

    match state.upload_storage.read(&path).await {
        Ok(bytes) => build_media_response(&path, bytes),
        Err(err) if err.is_not_found() => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Media not found",
            format!("no stored file at `{path}`"),
        )
        .into_response(),
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored media"
            );
            HttpError::internal(SOURCE, &err).into_response()
        }
    }
}

fn build_media_response(path: &str, bytes: Bytes) -> Response {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("public, max-age=86400"));

    response
}

async fn public_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.health_check().await)
}

async fn fallback(State(state): State<HttpState>, Viewer(viewer): Viewer) -> Response {
    render_not_found_response(state.chrome(viewer.as_ref()))
}

pub(super) fn feed_error_to_response(err: FeedError, chrome: LayoutChrome) -> Response {
    match err {
        FeedError::UnknownGroup(_) | FeedError::UnknownAuthor(_) => {
            not_found_with_report(chrome, &err)
        }
        err => HttpError::from(err).into_response(),
    }
}

pub(super) fn post_error_to_response(err: PostError, chrome: LayoutChrome) -> Response {
    match err {
        PostError::NotFound(_) => not_found_with_report(chrome, &err),
        err => HttpError::from(err).into_response(),
    }
}

pub(super) fn not_found_with_report(
    chrome: LayoutChrome,
    err: &dyn std::error::Error,
) -> Response {
    let mut response = render_not_found_response(chrome);
    ErrorReport::from_error(
        "infra::http::public::not_found",
        StatusCode::NOT_FOUND,
        err,
    )
    .attach(&mut response);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_ids_must_be_positive_integers() {
        assert_eq!(parse_post_id("12"), Some(12));
        assert_eq!(parse_post_id("0"), None);
        assert_eq!(parse_post_id("-3"), None);
        assert_eq!(parse_post_id("abc"), None);
    }

    #[test]
    fn cache_key_includes_query() {
        let uri: Uri = "/?page=2".parse().expect("uri");
        assert_eq!(cache_key(&uri), "/?page=2");
        let uri: Uri = "/".parse().expect("uri");
        assert_eq!(cache_key(&uri), "/");
    }
}
