//! In-memory repositories and router helpers shared by the integration tests.

#![allow(dead_code)]

use std::num::{NonZeroU32, NonZeroUsize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use time::OffsetDateTime;
use time::macros::datetime;
use tokio::sync::Mutex;
use tower::ServiceExt;

use folio::application::feed::FeedService;
use folio::application::follows::FollowService;
use folio::application::pagination::{PageWindow, Paginator};
use folio::application::posts::PostService;
use folio::application::repos::{
    CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams, FollowsRepo,
    GroupsRepo, HealthRepo, PostListScope, PostsRepo, PostsWriteRepo, RepoError,
    UpdatePostParams, UsersRepo,
};
use folio::cache::{PageCache, TtlPageCache};
use folio::config::AuthSettings;
use folio::domain::entities::{
    AuthorRef, CommentRecord, FollowRecord, GroupRecord, GroupRef, PostRecord, UserRecord,
};
use folio::infra::http::{HttpState, build_router};
use folio::infra::uploads::UploadStorage;

pub const USER_HEADER: &str = "x-remote-user";
pub const UPLOAD_LIMIT: usize = 2 * 1024 * 1024;

/// A 2x1 GIF.
pub const SMALL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
    0x00, 0x00, 0x02, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x0C, 0x0A, 0x00, 0x3B,
];

#[derive(Default)]
struct State {
    next_id: i64,
    users: Vec<UserRecord>,
    groups: Vec<GroupRecord>,
    posts: Vec<StoredPost>,
    comments: Vec<StoredComment>,
    follows: Vec<FollowRecord>,
}

#[derive(Clone)]
struct StoredPost {
    id: i64,
    text: String,
    author_id: i64,
    group_id: Option<i64>,
    image: Option<String>,
    created_at: OffsetDateTime,
}

#[derive(Clone)]
struct StoredComment {
    id: i64,
    post_id: i64,
    author_id: i64,
    text: String,
    created_at: OffsetDateTime,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Every row gets a distinct, increasing timestamp so ordering is stable.
    fn tick(&self) -> OffsetDateTime {
        datetime!(2024-01-01 00:00 UTC) + time::Duration::minutes(self.next_id)
    }

    fn author(&self, id: i64) -> Result<AuthorRef, RepoError> {
        self.users
            .iter()
            .find(|user| user.id == id)
            .map(|user| AuthorRef {
                id: user.id,
                username: user.username.clone(),
            })
            .ok_or_else(|| RepoError::InvalidInput {
                message: format!("user {id} does not exist"),
            })
    }

    fn hydrate(&self, post: &StoredPost) -> Result<PostRecord, RepoError> {
        let group = post.group_id.and_then(|group_id| {
            self.groups
                .iter()
                .find(|group| group.id == group_id)
                .map(|group| GroupRef {
                    id: group.id,
                    title: group.title.clone(),
                    slug: group.slug.clone(),
                })
        });
        Ok(PostRecord {
            id: post.id,
            text: post.text.clone(),
            author: self.author(post.author_id)?,
            group,
            image: post.image.clone(),
            created_at: post.created_at,
        })
    }

    fn in_scope(&self, post: &StoredPost, scope: PostListScope) -> bool {
        match scope {
            PostListScope::All => true,
            PostListScope::Group { group_id } => post.group_id == Some(group_id),
            PostListScope::Author { author_id } => post.author_id == author_id,
            PostListScope::FollowedBy { user_id } => self
                .follows
                .iter()
                .any(|edge| edge.user_id == user_id && edge.author_id == post.author_id),
        }
    }

    fn check_group(&self, group_id: Option<i64>) -> Result<(), RepoError> {
        match group_id {
            Some(id) if !self.groups.iter().any(|group| group.id == id) => {
                Err(RepoError::InvalidInput {
                    message: format!("group {id} does not exist"),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Repository double with the same cascade rules as the Postgres schema.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn seed_user(&self, username: &str) -> UserRecord {
        self.create_user(username).await.expect("seed user")
    }

    pub async fn seed_group(&self, title: &str, slug: &str) -> GroupRecord {
        self.create_group(CreateGroupParams {
            title: title.to_string(),
            slug: slug.to_string(),
            description: format!("About {title}"),
        })
        .await
        .expect("seed group")
    }

    pub async fn seed_post(
        &self,
        author: &UserRecord,
        text: &str,
        group: Option<&GroupRecord>,
    ) -> PostRecord {
        self.create_post(CreatePostParams {
            author_id: author.id,
            text: text.to_string(),
            group_id: group.map(|group| group.id),
            image: None,
        })
        .await
        .expect("seed post")
    }

    pub async fn seed_follow(&self, user: &UserRecord, author: &UserRecord) {
        FollowsRepo::follow(self, user.id, author.id)
            .await
            .expect("seed follow");
    }

    pub async fn post_count(&self) -> usize {
        self.state.lock().await.posts.len()
    }

    pub async fn comment_count(&self) -> usize {
        self.state.lock().await.comments.len()
    }

    pub async fn follow_count(&self) -> usize {
        self.state.lock().await.follows.len()
    }

    pub async fn latest_post(&self) -> Option<PostRecord> {
        let state = self.state.lock().await;
        state
            .posts
            .iter()
            .max_by_key(|post| post.id)
            .and_then(|post| state.hydrate(post).ok())
    }
}

#[async_trait]
impl UsersRepo for MemoryStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn create_user(&self, username: &str) -> Result<UserRecord, RepoError> {
        let mut state = self.state.lock().await;
        if state.users.iter().any(|user| user.username == username) {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".to_string(),
            });
        }
        let id = state.next_id();
        let user = UserRecord {
            id,
            username: username.to_string(),
            created_at: state.tick(),
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn delete_user(&self, id: i64) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        let before = state.users.len();
        state.users.retain(|user| user.id != id);
        if state.users.len() == before {
            return Err(RepoError::NotFound);
        }

        let removed_posts: Vec<i64> = state
            .posts
            .iter()
            .filter(|post| post.author_id == id)
            .map(|post| post.id)
            .collect();
        state.posts.retain(|post| post.author_id != id);
        state.comments.retain(|comment| {
            comment.author_id != id && !removed_posts.contains(&comment.post_id)
        });
        state
            .follows
            .retain(|edge| edge.user_id != id && edge.author_id != id);
        Ok(())
    }
}

#[async_trait]
impl GroupsRepo for MemoryStore {
    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let state = self.state.lock().await;
        let mut groups = state.groups.clone();
        groups.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(groups)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state.groups.iter().find(|group| group.slug == slug).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<GroupRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state.groups.iter().find(|group| group.id == id).cloned())
    }

    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let mut state = self.state.lock().await;
        if state.groups.iter().any(|group| group.slug == params.slug) {
            return Err(RepoError::Duplicate {
                constraint: "groups_slug_key".to_string(),
            });
        }
        let group = GroupRecord {
            id: state.next_id(),
            title: params.title,
            slug: params.slug,
            description: params.description,
        };
        state.groups.push(group.clone());
        Ok(group)
    }

    async fn delete_group(&self, id: i64) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        let before = state.groups.len();
        state.groups.retain(|group| group.id != id);
        if state.groups.len() == before {
            return Err(RepoError::NotFound);
        }
        for post in state.posts.iter_mut() {
            if post.group_id == Some(id) {
                post.group_id = None;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PostsRepo for MemoryStore {
    async fn count_posts(&self, scope: PostListScope) -> Result<u64, RepoError> {
        let state = self.state.lock().await;
        Ok(state
            .posts
            .iter()
            .filter(|post| state.in_scope(post, scope))
            .count() as u64)
    }

    async fn list_posts(
        &self,
        scope: PostListScope,
        window: PageWindow,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let state = self.state.lock().await;
        let mut posts: Vec<&StoredPost> = state
            .posts
            .iter()
            .filter(|post| state.in_scope(post, scope))
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        posts
            .into_iter()
            .skip(window.offset as usize)
            .take(window.limit as usize)
            .map(|post| state.hydrate(post))
            .collect()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        let state = self.state.lock().await;
        state
            .posts
            .iter()
            .find(|post| post.id == id)
            .map(|post| state.hydrate(post))
            .transpose()
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryStore {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut state = self.state.lock().await;
        state.author(params.author_id)?;
        state.check_group(params.group_id)?;
        let id = state.next_id();
        let post = StoredPost {
            id,
            text: params.text,
            author_id: params.author_id,
            group_id: params.group_id,
            image: params.image,
            created_at: state.tick(),
        };
        state.posts.push(post.clone());
        state.hydrate(&post)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut state = self.state.lock().await;
        state.check_group(params.group_id)?;
        let post = state
            .posts
            .iter_mut()
            .find(|post| post.id == params.id)
            .ok_or(RepoError::NotFound)?;
        post.text = params.text;
        post.group_id = params.group_id;
        post.image = params.image;
        let post = post.clone();
        state.hydrate(&post)
    }

    async fn delete_post(&self, id: i64) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        let before = state.posts.len();
        state.posts.retain(|post| post.id != id);
        if state.posts.len() == before {
            return Err(RepoError::NotFound);
        }
        state.comments.retain(|comment| comment.post_id != id);
        Ok(())
    }
}

#[async_trait]
impl CommentsRepo for MemoryStore {
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentRecord>, RepoError> {
        let state = self.state.lock().await;
        let mut comments: Vec<&StoredComment> = state
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        comments
            .into_iter()
            .map(|comment| {
                Ok(CommentRecord {
                    id: comment.id,
                    post_id: comment.post_id,
                    author: state.author(comment.author_id)?,
                    text: comment.text.clone(),
                    created_at: comment.created_at,
                })
            })
            .collect()
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut state = self.state.lock().await;
        let author = state.author(params.author_id)?;
        if !state.posts.iter().any(|post| post.id == params.post_id) {
            return Err(RepoError::InvalidInput {
                message: format!("post {} does not exist", params.post_id),
            });
        }
        let id = state.next_id();
        let comment = StoredComment {
            id,
            post_id: params.post_id,
            author_id: params.author_id,
            text: params.text,
            created_at: state.tick(),
        };
        state.comments.push(comment.clone());
        Ok(CommentRecord {
            id,
            post_id: comment.post_id,
            author,
            text: comment.text,
            created_at: comment.created_at,
        })
    }
}

#[async_trait]
impl FollowsRepo for MemoryStore {
    async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let state = self.state.lock().await;
        Ok(state
            .follows
            .iter()
            .any(|edge| edge.user_id == user_id && edge.author_id == author_id))
    }

    async fn follow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let mut state = self.state.lock().await;
        if user_id == author_id {
            return Err(RepoError::Integrity {
                message: "follows_no_self_follow".to_string(),
            });
        }
        if state
            .follows
            .iter()
            .any(|edge| edge.user_id == user_id && edge.author_id == author_id)
        {
            return Ok(false);
        }
        let id = state.next_id();
        state.follows.push(FollowRecord {
            id,
            user_id,
            author_id,
        });
        Ok(true)
    }

    async fn unfollow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let mut state = self.state.lock().await;
        let before = state.follows.len();
        state
            .follows
            .retain(|edge| !(edge.user_id == user_id && edge.author_id == author_id));
        Ok(state.follows.len() != before)
    }
}

#[async_trait]
impl HealthRepo for MemoryStore {
    async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

/// A router wired to a [`MemoryStore`] with a 10-post page size.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub cache: Arc<TtlPageCache>,
    pub uploads: Arc<UploadStorage>,
    pub router: Router,
}

impl TestApp {
    pub fn new(store: Arc<MemoryStore>, upload_root: &Path) -> Self {
        Self::with_cache_ttl(store, upload_root, Duration::from_secs(20))
    }

    pub fn with_cache_ttl(store: Arc<MemoryStore>, upload_root: &Path, ttl: Duration) -> Self {
        let uploads =
            Arc::new(UploadStorage::new(upload_root.to_path_buf()).expect("upload storage"));
        let cache = Arc::new(TtlPageCache::new(
            NonZeroUsize::new(16).expect("capacity"),
            ttl,
        ));
        let paginator = Paginator::new(NonZeroU32::new(10).expect("page size"));

        let feed = Arc::new(FeedService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            paginator,
        ));
        let posts = Arc::new(PostService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            uploads.clone(),
        ));
        let follows = Arc::new(FollowService::new(store.clone(), store.clone()));
        let page_cache: Arc<dyn PageCache> = cache.clone();

        let state = HttpState {
            feed,
            posts,
            follows,
            users: store.clone(),
            health: store.clone(),
            cache: page_cache,
            upload_storage: uploads.clone(),
            auth: Arc::new(AuthSettings::default()),
            preview_length: 15,
        };

        Self {
            router: build_router(state, UPLOAD_LIMIT),
            store,
            cache,
            uploads,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    pub async fn get(&self, uri: &str, user: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user);
        }
        self.send(builder.body(Body::empty()).expect("request"))
            .await
    }

    pub async fn post_form(&self, uri: &str, user: Option<&str>, body: &str) -> Response<Body> {
        self.post_raw(uri, user, Some("application/x-www-form-urlencoded"), body)
            .await
    }

    /// POST an arbitrary body, optionally without any content type.
    pub async fn post_raw(
        &self,
        uri: &str,
        user: Option<&str>,
        content_type: Option<&str>,
        body: &str,
    ) -> Response<Body> {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user);
        }
        self.send(builder.body(Body::from(body.to_string())).expect("request"))
            .await
    }

    pub async fn post_multipart(
        &self,
        uri: &str,
        user: Option<&str>,
        form: MultipartBody,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", form.content_type());
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user);
        }
        self.send(builder.body(Body::from(form.finish())).expect("request"))
            .await
    }
}

/// Hand-built `multipart/form-data` payload.
pub struct MultipartBody {
    boundary: &'static str,
    bytes: Vec<u8>,
}

impl Default for MultipartBody {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartBody {
    pub fn new() -> Self {
        Self {
            boundary: "folio-test-boundary",
            bytes: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, data: &[u8]) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self.bytes.extend_from_slice(data);
        self.bytes.extend_from_slice(b"\r\n");
        self
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.bytes
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        self.bytes
    }
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

pub fn location(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get("location")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
