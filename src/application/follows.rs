use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{FollowsRepo, RepoError, UsersRepo};
use crate::domain::entities::UserRecord;

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("user `{0}` not found")]
    UnknownAuthor(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Created,
    AlreadyFollowing,
    /// Users cannot follow themselves; nothing is stored.
    SelfFollow,
}

#[derive(Clone)]
pub struct FollowService {
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
}

impl FollowService {
    pub fn new(users: Arc<dyn UsersRepo>, follows: Arc<dyn FollowsRepo>) -> Self {
        Self { users, follows }
    }

    pub async fn follow(
        &self,
        viewer: &UserRecord,
        username: &str,
    ) -> Result<FollowOutcome, FollowError> {
        let author = self.author(username).await?;
        if author.id == viewer.id {
            return Ok(FollowOutcome::SelfFollow);
        }

        if self.follows.follow(viewer.id, author.id).await? {
            info!(
                target = "folio::application::follows",
                user = %viewer.username,
                author = %author.username,
                "follow created"
            );
            Ok(FollowOutcome::Created)
        } else {
            Ok(FollowOutcome::AlreadyFollowing)
        }
    }

    /// Returns whether an edge existed. Unfollowing someone not followed is a no-op.
    pub async fn unfollow(&self, viewer: &UserRecord, username: &str) -> Result<bool, FollowError> {
        let author = self.author(username).await?;
        let removed = self.follows.unfollow(viewer.id, author.id).await?;
        if removed {
            info!(
                target = "folio::application::follows",
                user = %viewer.username,
                author = %author.username,
                "follow removed"
            );
        }
        Ok(removed)
    }

    async fn author(&self, username: &str) -> Result<UserRecord, FollowError> {
        self.users
            .find_by_username(username)
            .await?
            .ok_or_else(|| FollowError::UnknownAuthor(username.to_string()))
    }
}
