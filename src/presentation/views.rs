use crate::application::error::{ErrorReport, HttpError};
use crate::application::forms::{PostFormErrors, PostFormState};
use crate::application::pagination::Page;
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord};
use crate::domain::posts::{self, format_human_date, format_iso_date};
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use url::form_urlencoded;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    render_fragment(template).map(Html)
}

/// Render a template to a string, e.g. for storage in the page cache.
pub fn render_fragment<T: Template>(template: T) -> Result<String, HttpError> {
    template.render().map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(chrome: LayoutChrome) -> Response {
    let view = LayoutContext::new(chrome, "Page not found", ErrorPageView::not_found());
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

/// Percent-encode one path segment so it is always a valid header value.
fn path_segment(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

pub fn media_url(stored_path: &str) -> String {
    let encoded: Vec<String> = stored_path.split('/').map(path_segment).collect();
    format!("/media/{}", encoded.join("/"))
}

pub fn profile_href(username: &str) -> String {
    format!("/profile/{}/", path_segment(username))
}

pub fn post_href(id: i64) -> String {
    format!("/posts/{id}/")
}

pub fn group_href(slug: &str) -> String {
    format!("/group/{}/", path_segment(slug))
}

/// The signed-in user as shown in the navigation bar.
#[derive(Clone)]
pub struct NavViewer {
    pub username: String,
    pub href: String,
}

/// Navigation state shared by every page.
#[derive(Clone)]
pub struct LayoutChrome {
    pub viewer: Option<NavViewer>,
    pub login_url: String,
    pub active: &'static str,
}

impl LayoutChrome {
    pub fn new(viewer: Option<&UserRecord>, login_url: &str) -> Self {
        Self {
            viewer: viewer.map(|user| NavViewer {
                username: user.username.clone(),
                href: profile_href(&user.username),
            }),
            login_url: login_url.to_string(),
            active: "",
        }
    }

    pub fn with_active(self, active: &'static str) -> Self {
        Self { active, ..self }
    }
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub viewer: Option<NavViewer>,
    pub login_url: String,
    pub active: &'static str,
    pub title: String,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, title: impl Into<String>, content: T) -> Self {
        Self {
            viewer: chrome.viewer,
            login_url: chrome.login_url,
            active: chrome.active,
            title: title.into(),
            content,
        }
    }
}

#[derive(Clone)]
pub struct GroupLink {
    pub title: String,
    pub href: String,
}

#[derive(Clone)]
pub struct PostCard {
    pub id: i64,
    pub href: String,
    pub text: String,
    pub author: String,
    pub author_href: String,
    pub group: Option<GroupLink>,
    pub image_url: Option<String>,
    pub published: String,
    pub iso_date: String,
    pub can_edit: bool,
}

impl PostCard {
    pub fn new(post: &PostRecord, viewer: Option<&UserRecord>) -> Self {
        Self {
            id: post.id,
            href: post_href(post.id),
            text: post.text.clone(),
            author: post.author.username.clone(),
            author_href: profile_href(&post.author.username),
            group: post.group.as_ref().map(|group| GroupLink {
                title: group.title.clone(),
                href: group_href(&group.slug),
            }),
            image_url: post.image.as_deref().map(media_url),
            published: format_human_date(post.created_at),
            iso_date: format_iso_date(post.created_at),
            can_edit: viewer.is_some_and(|viewer| post.is_authored_by(viewer)),
        }
    }
}

#[derive(Clone)]
pub struct PageLink {
    pub number: u32,
    pub href: String,
    pub is_current: bool,
}

#[derive(Clone)]
pub struct PaginatorView {
    pub number: u32,
    pub num_pages: u32,
    pub has_other_pages: bool,
    pub previous_href: Option<String>,
    pub next_href: Option<String>,
    pub first_href: String,
    pub last_href: String,
    pub pages: Vec<PageLink>,
}

impl PaginatorView {
    pub fn new<T>(page: &Page<T>) -> Self {
        Self {
            number: page.number,
            num_pages: page.num_pages,
            has_other_pages: page.has_other_pages(),
            previous_href: page.previous_page_number().map(page_query),
            next_href: page.next_page_number().map(page_query),
            first_href: page_query(1),
            last_href: page_query(page.num_pages),
            pages: (1..=page.num_pages)
                .map(|number| PageLink {
                    number,
                    href: page_query(number),
                    is_current: number == page.number,
                })
                .collect(),
        }
    }
}

fn page_query(number: u32) -> String {
    format!("?page={number}")
}

#[derive(Clone)]
pub struct FeedView {
    pub posts: Vec<PostCard>,
    pub paginator: PaginatorView,
    pub show_groups: bool,
}

impl FeedView {
    pub fn new(page: &Page<PostRecord>, viewer: Option<&UserRecord>) -> Self {
        Self {
            posts: page
                .items
                .iter()
                .map(|post| PostCard::new(post, viewer))
                .collect(),
            paginator: PaginatorView::new(page),
            show_groups: true,
        }
    }

    /// Group pages already name the group; the per-post link is redundant there.
    pub fn without_group_links(self) -> Self {
        Self {
            show_groups: false,
            ..self
        }
    }
}

/// The post list with its paginator. Rendered on its own so the index can cache it.
#[derive(Template)]
#[template(path = "partials/feed.html")]
pub struct FeedFragment {
    pub feed: FeedView,
}

impl FeedFragment {
    pub fn render_html(feed: FeedView) -> Result<String, HttpError> {
        render_fragment(Self { feed })
    }
}

pub struct IndexView {
    pub feed_html: String,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<IndexView>,
}

pub struct GroupView {
    pub title: String,
    pub description: String,
    pub feed_html: String,
}

impl GroupView {
    pub fn new(group: &GroupRecord, feed_html: String) -> Self {
        Self {
            title: group.title.clone(),
            description: group.description.clone(),
            feed_html,
        }
    }
}

#[derive(Template)]
#[template(path = "group.html")]
pub struct GroupTemplate {
    pub view: LayoutContext<GroupView>,
}

pub struct ProfileView {
    pub author: String,
    pub post_count: u64,
    pub following: bool,
    /// Signed-in viewers looking at someone else's profile get follow controls.
    pub show_follow_controls: bool,
    pub follow_href: String,
    pub unfollow_href: String,
    pub feed_html: String,
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfileView>,
}

pub struct FollowView {
    pub feed_html: String,
}

#[derive(Template)]
#[template(path = "follow.html")]
pub struct FollowTemplate {
    pub view: LayoutContext<FollowView>,
}

#[derive(Clone)]
pub struct CommentView {
    pub author: String,
    pub author_href: String,
    pub text: String,
    pub published: String,
}

impl From<&CommentRecord> for CommentView {
    fn from(comment: &CommentRecord) -> Self {
        Self {
            author: comment.author.username.clone(),
            author_href: profile_href(&comment.author.username),
            text: comment.text.clone(),
            published: format_human_date(comment.created_at),
        }
    }
}

pub struct PostDetailView {
    pub post: PostCard,
    pub title: String,
    pub author_post_count: u64,
    pub comments: Vec<CommentView>,
    pub comment_action: String,
    pub edit_href: String,
    pub can_comment: bool,
}

impl PostDetailView {
    pub fn new(
        post: &PostRecord,
        comments: &[CommentRecord],
        author_post_count: u64,
        viewer: Option<&UserRecord>,
        preview_length: usize,
    ) -> Self {
        Self {
            post: PostCard::new(post, viewer),
            title: posts::preview(&post.text, preview_length),
            author_post_count,
            comments: comments.iter().map(CommentView::from).collect(),
            comment_action: format!("/posts/{}/comment/", post.id),
            edit_href: format!("/posts/{}/edit/", post.id),
            can_comment: viewer.is_some(),
        }
    }
}

#[derive(Template)]
#[template(path = "post_detail.html")]
pub struct PostDetailTemplate {
    pub view: LayoutContext<PostDetailView>,
}

#[derive(Clone)]
pub struct GroupOption {
    pub id: i64,
    pub title: String,
    pub selected: bool,
}

pub struct PostFormView {
    pub is_edit: bool,
    pub action: String,
    pub text: String,
    pub groups: Vec<GroupOption>,
    pub no_group_selected: bool,
    pub current_image: Option<String>,
    pub text_error: Option<&'static str>,
    pub group_error: Option<&'static str>,
    pub image_error: Option<&'static str>,
}

impl PostFormView {
    pub fn blank(groups: &[GroupRecord]) -> Self {
        Self::build(false, "/create/".to_string(), String::new(), None, groups, None)
    }

    pub fn for_post(post: &PostRecord, groups: &[GroupRecord]) -> Self {
        Self::build(
            true,
            format!("/posts/{}/edit/", post.id),
            post.text.clone(),
            post.group.as_ref().map(|group| group.id.to_string()),
            groups,
            post.image.as_deref().map(media_url),
        )
    }

    /// Re-render a rejected submission with its field errors.
    pub fn rejected(
        state: PostFormState,
        groups: &[GroupRecord],
        existing: Option<&PostRecord>,
    ) -> Self {
        let (is_edit, action, current_image) = match existing {
            Some(post) => (
                true,
                format!("/posts/{}/edit/", post.id),
                post.image.as_deref().map(media_url),
            ),
            None => (false, "/create/".to_string(), None),
        };
        Self::build(
            is_edit,
            action,
            state.text,
            state.group,
            groups,
            current_image,
        )
        .with_errors(&state.errors)
    }

    fn build(
        is_edit: bool,
        action: String,
        text: String,
        selected: Option<String>,
        groups: &[GroupRecord],
        current_image: Option<String>,
    ) -> Self {
        let selected = selected.as_deref().map(str::trim);
        let groups: Vec<GroupOption> = groups
            .iter()
            .map(|group| GroupOption {
                id: group.id,
                title: group.title.clone(),
                selected: selected == Some(group.id.to_string().as_str()),
            })
            .collect();
        let no_group_selected = !groups.iter().any(|option| option.selected);

        Self {
            is_edit,
            action,
            text,
            groups,
            no_group_selected,
            current_image,
            text_error: None,
            group_error: None,
            image_error: None,
        }
    }

    fn with_errors(self, errors: &PostFormErrors) -> Self {
        Self {
            text_error: errors.text,
            group_error: errors.group,
            image_error: errors.image,
            ..self
        }
    }
}

#[derive(Template)]
#[template(path = "post_form.html")]
pub struct PostFormTemplate {
    pub view: LayoutContext<PostFormView>,
}

pub struct ErrorPageView {
    pub title: String,
    pub message: String,
    pub path_hint: Option<String>,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            title: "Page not found".to_string(),
            message: "The page you are looking for does not exist or has been removed."
                .to_string(),
            path_hint: Some("/".to_string()),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pagination::Paginator;
    use crate::domain::entities::{AuthorRef, GroupRef};
    use std::num::NonZeroU32;
    use time::macros::datetime;

    fn post(id: i64, author_id: i64) -> PostRecord {
        PostRecord {
            id,
            text: format!("Post body {id}"),
            author: AuthorRef {
                id: author_id,
                username: "leo".to_string(),
            },
            group: Some(GroupRef {
                id: 1,
                title: "Cats".to_string(),
                slug: "cats".to_string(),
            }),
            image: Some("posts/cat.png".to_string()),
            created_at: datetime!(2024-03-05 10:00 UTC),
        }
    }

    fn user(id: i64) -> UserRecord {
        UserRecord {
            id,
            username: "leo".to_string(),
            created_at: datetime!(2024-01-01 00:00 UTC),
        }
    }

    #[test]
    fn post_card_links_author_group_and_media() {
        let card = PostCard::new(&post(7, 1), Some(&user(1)));
        assert_eq!(card.href, "/posts/7/");
        assert_eq!(card.author_href, "/profile/leo/");
        assert_eq!(card.group.as_ref().map(|g| g.href.as_str()), Some("/group/cats/"));
        assert_eq!(card.image_url.as_deref(), Some("/media/posts/cat.png"));
        assert_eq!(card.published, "5 March 2024");
        assert!(card.can_edit);

        assert!(!PostCard::new(&post(7, 1), Some(&user(2))).can_edit);
        assert!(!PostCard::new(&post(7, 1), None).can_edit);
    }

    #[test]
    fn hrefs_percent_encode_path_segments() {
        assert_eq!(profile_href("лев"), "/profile/%D0%BB%D0%B5%D0%B2/");
        assert_eq!(profile_href("leo+1@home.org"), "/profile/leo%2B1%40home.org/");
        assert_eq!(profile_href("leo_k-2"), "/profile/leo_k-2/");
        assert_eq!(
            media_url("posts/котик 1.gif"),
            "/media/posts/%D0%BA%D0%BE%D1%82%D0%B8%D0%BA%201.gif"
        );
        assert!(profile_href("лев").is_ascii());

        let lev = UserRecord {
            username: "лев".to_string(),
            ..user(1)
        };
        let chrome = LayoutChrome::new(Some(&lev), "/auth/login/");
        let viewer = chrome.viewer.expect("signed-in viewer");
        assert_eq!(viewer.username, "лев");
        assert_eq!(viewer.href, "/profile/%D0%BB%D0%B5%D0%B2/");
    }

    #[test]
    fn paginator_view_lists_every_page() {
        let paginator = Paginator::new(NonZeroU32::new(10).expect("page size"));
        let page = Page::from_window(paginator.window(25, Some("2")), vec![0u8; 10]);
        let view = PaginatorView::new(&page);

        assert_eq!(view.pages.len(), 3);
        assert!(view.pages[1].is_current);
        assert_eq!(view.previous_href.as_deref(), Some("?page=1"));
        assert_eq!(view.next_href.as_deref(), Some("?page=3"));
    }

    #[test]
    fn feed_fragment_renders_posts_and_paginator() {
        let paginator = Paginator::new(NonZeroU32::new(1).expect("page size"));
        let page = Page::from_window(paginator.window(2, None), vec![post(1, 1)]);
        let html = render_fragment(FeedFragment {
            feed: FeedView::new(&page, None),
        })
        .expect("rendered fragment");

        assert!(html.contains("Post body 1"));
        assert!(html.contains("/posts/1/"));
        assert!(html.contains("?page=2"));
    }

    #[test]
    fn rejected_form_keeps_values_and_errors() {
        let groups = vec![GroupRecord {
            id: 3,
            title: "Dogs".to_string(),
            slug: "dogs".to_string(),
            description: String::new(),
        }];
        let state = PostFormState {
            text: "draft".to_string(),
            group: Some("3".to_string()),
            errors: PostFormErrors {
                image: Some("Upload a valid image."),
                ..Default::default()
            },
        };

        let view = PostFormView::rejected(state, &groups, None);
        assert!(!view.is_edit);
        assert_eq!(view.text, "draft");
        assert!(view.groups[0].selected);
        assert!(!view.no_group_selected);
        assert_eq!(view.image_error, Some("Upload a valid image."));
    }

    #[test]
    fn not_found_page_carries_report() {
        let response = render_not_found_response(LayoutChrome::new(None, "/auth/login/"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.extensions().get::<ErrorReport>().is_some());
    }
}
