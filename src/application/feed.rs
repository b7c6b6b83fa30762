//! Read-side feeds: the index, group pages, profiles and the follow feed.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::application::pagination::{Page, Paginator};
use crate::application::repos::{
    FollowsRepo, GroupsRepo, PostListScope, PostsRepo, RepoError, UsersRepo,
};
use crate::domain::entities::{GroupRecord, PostRecord, UserRecord};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("group `{0}` not found")]
    UnknownGroup(String),
    #[error("user `{0}` not found")]
    UnknownAuthor(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct GroupFeed {
    pub group: GroupRecord,
    pub page: Page<PostRecord>,
}

#[derive(Debug, Clone)]
pub struct ProfileFeed {
    pub author: UserRecord,
    pub page: Page<PostRecord>,
    /// Whether the viewer currently follows `author`. Always false for anonymous viewers.
    pub following: bool,
}

impl ProfileFeed {
    pub fn post_count(&self) -> u64 {
        self.page.total_count
    }
}

#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    groups: Arc<dyn GroupsRepo>,
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
    paginator: Paginator,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        groups: Arc<dyn GroupsRepo>,
        users: Arc<dyn UsersRepo>,
        follows: Arc<dyn FollowsRepo>,
        paginator: Paginator,
    ) -> Self {
        Self {
            posts,
            groups,
            users,
            follows,
            paginator,
        }
    }

    /// All posts, newest first.
    pub async fn index(&self, requested: Option<&str>) -> Result<Page<PostRecord>, FeedError> {
        Ok(self.page(PostListScope::All, requested).await?)
    }

    pub async fn group(
        &self,
        slug: &str,
        requested: Option<&str>,
    ) -> Result<GroupFeed, FeedError> {
        let group = self
            .groups
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| FeedError::UnknownGroup(slug.to_string()))?;

        let page = self
            .page(PostListScope::Group { group_id: group.id }, requested)
            .await?;
        Ok(GroupFeed { group, page })
    }

    pub async fn profile(
        &self,
        username: &str,
        viewer: Option<&UserRecord>,
        requested: Option<&str>,
    ) -> Result<ProfileFeed, FeedError> {
        let author = self
            .users
            .find_by_username(username)
            .await?
            .ok_or_else(|| FeedError::UnknownAuthor(username.to_string()))?;

        let page = self
            .page(
                PostListScope::Author {
                    author_id: author.id,
                },
                requested,
            )
            .await?;

        let following = match viewer {
            Some(viewer) => self.follows.is_following(viewer.id, author.id).await?,
            None => false,
        };

        Ok(ProfileFeed {
            author,
            page,
            following,
        })
    }

    /// Posts by authors the viewer follows.
    pub async fn follow(
        &self,
        viewer: &UserRecord,
        requested: Option<&str>,
    ) -> Result<Page<PostRecord>, FeedError> {
        Ok(self
            .page(PostListScope::FollowedBy { user_id: viewer.id }, requested)
            .await?)
    }

    async fn page(
        &self,
        scope: PostListScope,
        requested: Option<&str>,
    ) -> Result<Page<PostRecord>, RepoError> {
        let total = self.posts.count_posts(scope).await?;
        let window = self.paginator.window(total, requested);
        let items = if total == 0 {
            Vec::new()
        } else {
            self.posts.list_posts(scope, window).await?
        };

        debug!(
            target = "folio::application::feed",
            ?scope,
            page = window.number,
            num_pages = window.num_pages,
            rows = items.len(),
            "loaded feed page"
        );

        Ok(Page::from_window(window, items))
    }
}
