//! Operator commands run from the CLI against the store.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{
    CreateGroupParams, GroupsRepo, PostsRepo, PostsWriteRepo, RepoError, UsersRepo,
};
use crate::domain::entities::{GroupRecord, UserRecord};
use crate::domain::error::DomainError;
use crate::domain::slug::{SlugError, derive_slug, validate_slug};
use crate::domain::users::validate_username;

pub const MAX_GROUP_TITLE_LEN: usize = 200;

#[derive(Debug, Error)]
pub enum ManagementError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("invalid slug: {0}")]
    Slug(#[from] SlugError),
    #[error("{entity} `{key}` not found")]
    NotFound { entity: &'static str, key: String },
    #[error("{entity} `{key}` already exists")]
    Duplicate { entity: &'static str, key: String },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct CreateGroupCommand {
    pub title: String,
    pub slug: Option<String>,
    pub description: String,
}

#[derive(Clone)]
pub struct ManagementService {
    users: Arc<dyn UsersRepo>,
    groups: Arc<dyn GroupsRepo>,
    posts: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
}

impl ManagementService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        groups: Arc<dyn GroupsRepo>,
        posts: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
    ) -> Self {
        Self {
            users,
            groups,
            posts,
            writer,
        }
    }

    pub async fn create_user(&self, username: &str) -> Result<UserRecord, ManagementError> {
        let username = username.trim();
        validate_username(username)?;

        let user = self
            .users
            .create_user(username)
            .await
            .map_err(|err| duplicate_as("user", username, err))?;

        info!(
            target = "folio::application::management",
            user_id = user.id,
            username = %user.username,
            "user created"
        );
        Ok(user)
    }

    /// Deletes the user along with their posts, comments and follow edges.
    pub async fn delete_user(&self, username: &str) -> Result<(), ManagementError> {
        let user = self
            .users
            .find_by_username(username)
            .await?
            .ok_or_else(|| ManagementError::NotFound {
                entity: "user",
                key: username.to_string(),
            })?;

        self.users.delete_user(user.id).await?;
        info!(
            target = "folio::application::management",
            user_id = user.id,
            username = %user.username,
            "user deleted"
        );
        Ok(())
    }

    pub async fn create_group(
        &self,
        command: CreateGroupCommand,
    ) -> Result<GroupRecord, ManagementError> {
        let title = command.title.trim().to_string();
        if title.is_empty() {
            return Err(DomainError::validation("title", "title is required").into());
        }
        if title.chars().count() > MAX_GROUP_TITLE_LEN {
            return Err(DomainError::validation(
                "title",
                format!("title must be at most {MAX_GROUP_TITLE_LEN} characters"),
            )
            .into());
        }

        let slug = match command.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => {
                validate_slug(slug)?;
                slug.to_string()
            }
            _ => derive_slug(&title)?,
        };

        let group = self
            .groups
            .create_group(CreateGroupParams {
                title,
                slug: slug.clone(),
                description: command.description.trim().to_string(),
            })
            .await
            .map_err(|err| duplicate_as("group", &slug, err))?;

        info!(
            target = "folio::application::management",
            group_id = group.id,
            slug = %group.slug,
            "group created"
        );
        Ok(group)
    }

    /// Deletes the group. Its posts stay, without a group.
    pub async fn delete_group(&self, slug: &str) -> Result<(), ManagementError> {
        let group = self
            .groups
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| ManagementError::NotFound {
                entity: "group",
                key: slug.to_string(),
            })?;

        self.groups.delete_group(group.id).await?;
        info!(
            target = "folio::application::management",
            group_id = group.id,
            slug = %group.slug,
            "group deleted"
        );
        Ok(())
    }

    pub async fn delete_post(&self, id: i64) -> Result<(), ManagementError> {
        if self.posts.find_by_id(id).await?.is_none() {
            return Err(ManagementError::NotFound {
                entity: "post",
                key: id.to_string(),
            });
        }

        self.writer.delete_post(id).await?;
        info!(
            target = "folio::application::management",
            post_id = id,
            "post deleted"
        );
        Ok(())
    }
}

fn duplicate_as(entity: &'static str, key: &str, err: RepoError) -> ManagementError {
    match err {
        RepoError::Duplicate { .. } => ManagementError::Duplicate {
            entity,
            key: key.to_string(),
        },
        other => ManagementError::Repo(other),
    }
}
