//! Routes that change state. All of them require a signed-in user.

use axum::{
    Form, Router,
    extract::{Path, State, rejection::FormRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::{Multipart, multipart::MultipartRejection};
use tracing::warn;

use crate::{
    application::{
        error::HttpError,
        follows::{FollowError, FollowOutcome},
        forms::{CommentSubmission, PostFormState},
        posts::{CommentOutcome, EditAccess, EditOutcome, PostError},
    },
    domain::entities::{PostRecord, UserRecord},
    presentation::views::{
        LayoutChrome, LayoutContext, PostFormTemplate, PostFormView, post_href, profile_href,
        render_not_found_response, render_template_response,
    },
};

use super::{
    auth::{CurrentUser, found},
    multipart::read_post_form,
    public::{HttpState, not_found_with_report, parse_post_id, post_error_to_response},
};

pub(super) fn routes() -> Router<HttpState> {
    Router::new()
        .route("/create/", get(create_form).post(create_submit))
        .route("/posts/{id}/edit/", get(edit_form).post(edit_submit))
        .route("/posts/{id}/comment/", post(add_comment))
        .route("/profile/{username}/follow/", get(follow).post(follow))
        .route("/profile/{username}/unfollow/", get(unfollow).post(unfollow))
}

async fn create_form(State(state): State<HttpState>, CurrentUser(author): CurrentUser) -> Response {
    let chrome = state.chrome(Some(&author)).with_active("create");
    match state.posts.group_choices().await {
        Ok(groups) => render_form(chrome, PostFormView::blank(&groups)),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn create_submit(
    State(state): State<HttpState>,
    CurrentUser(author): CurrentUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let chrome = state.chrome(Some(&author)).with_active("create");
    let submission = match read_post_form(multipart).await {
        Ok(submission) => submission,
        Err(err) => return HttpError::from(err).into_response(),
    };

    match state.posts.create(&author, &submission).await {
        Ok(_) => found(&profile_href(&author.username)),
        Err(PostError::Invalid(errors)) => {
            rerender_form(&state, chrome, submission.into_state(errors), None).await
        }
        Err(err) => post_error_to_response(err, chrome),
    }
}

async fn edit_form(
    State(state): State<HttpState>,
    CurrentUser(viewer): CurrentUser,
    Path(raw_id): Path<String>,
) -> Response {
    let chrome = state.chrome(Some(&viewer));
    let post = match open_for_edit(&state, &viewer, &raw_id, chrome.clone()).await {
        Ok(post) => post,
        Err(response) => return response,
    };

    match state.posts.group_choices().await {
        Ok(groups) => render_form(chrome, PostFormView::for_post(&post, &groups)),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn edit_submit(
    State(state): State<HttpState>,
    CurrentUser(viewer): CurrentUser,
    Path(raw_id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let chrome = state.chrome(Some(&viewer));
    let post = match open_for_edit(&state, &viewer, &raw_id, chrome.clone()).await {
        Ok(post) => post,
        Err(response) => return response,
    };

    let submission = match read_post_form(multipart).await {
        Ok(submission) => submission,
        Err(err) => return HttpError::from(err).into_response(),
    };

    match state.posts.edit(&viewer, post.id, &submission).await {
        Ok(EditOutcome::Saved(saved)) => found(&post_href(saved.id)),
        Ok(EditOutcome::NotAuthor) => found(&post_href(post.id)),
        Err(PostError::Invalid(errors)) => {
            rerender_form(&state, chrome, submission.into_state(errors), Some(&post)).await
        }
        Err(err) => post_error_to_response(err, chrome),
    }
}

/// Load a post the viewer may edit. Non-authors are sent to the post page.
async fn open_for_edit(
    state: &HttpState,
    viewer: &UserRecord,
    raw_id: &str,
    chrome: LayoutChrome,
) -> Result<PostRecord, Response> {
    let Some(id) = parse_post_id(raw_id) else {
        return Err(render_not_found_response(chrome));
    };

    match state.posts.edit_access(viewer, id).await {
        Ok(EditAccess::Allowed(post)) => Ok(post),
        Ok(EditAccess::NotAuthor) => Err(found(&post_href(id))),
        Err(err) => Err(post_error_to_response(err, chrome)),
    }
}

async fn rerender_form(
    state: &HttpState,
    chrome: LayoutChrome,
    form: PostFormState,
    existing: Option<&PostRecord>,
) -> Response {
    match state.posts.group_choices().await {
        Ok(groups) => render_form(chrome, PostFormView::rejected(form, &groups, existing)),
        Err(err) => HttpError::from(err).into_response(),
    }
}

fn render_form(chrome: LayoutChrome, content: PostFormView) -> Response {
    let title = if content.is_edit { "Edit post" } else { "New post" };
    let view = LayoutContext::new(chrome, title, content);
    render_template_response(PostFormTemplate { view }, StatusCode::OK)
}

async fn add_comment(
    State(state): State<HttpState>,
    CurrentUser(author): CurrentUser,
    Path(raw_id): Path<String>,
    submission: Result<Form<CommentSubmission>, FormRejection>,
) -> Response {
    let chrome = state.chrome(Some(&author));
    let Some(id) = parse_post_id(&raw_id) else {
        return render_not_found_response(chrome);
    };

    // An undecodable body is treated like a blank comment.
    let submission = match submission {
        Ok(Form(submission)) => submission,
        Err(rejection) => {
            warn!(
                target = "folio::infra::http::writes",
                post_id = id,
                status = rejection.status().as_u16(),
                error = %rejection,
                "comment form could not be decoded"
            );
            CommentSubmission::default()
        }
    };

    match state.posts.add_comment(&author, id, &submission).await {
        Ok(CommentOutcome::Created(_)) | Ok(CommentOutcome::Rejected(_)) => found(&post_href(id)),
        Err(err) => post_error_to_response(err, chrome),
    }
}

async fn follow(
    State(state): State<HttpState>,
    CurrentUser(viewer): CurrentUser,
    Path(username): Path<String>,
) -> Response {
    match state.follows.follow(&viewer, &username).await {
        Ok(FollowOutcome::Created | FollowOutcome::AlreadyFollowing | FollowOutcome::SelfFollow) => {
            found(&profile_href(&username))
        }
        Err(err) => follow_error_to_response(&state, &viewer, err),
    }
}

async fn unfollow(
    State(state): State<HttpState>,
    CurrentUser(viewer): CurrentUser,
    Path(username): Path<String>,
) -> Response {
    match state.follows.unfollow(&viewer, &username).await {
        Ok(_) => found(&profile_href(&username)),
        Err(err) => follow_error_to_response(&state, &viewer, err),
    }
}

fn follow_error_to_response(state: &HttpState, viewer: &UserRecord, err: FollowError) -> Response {
    match err {
        FollowError::UnknownAuthor(_) => not_found_with_report(state.chrome(Some(viewer)), &err),
        err => HttpError::from(err).into_response(),
    }
}
