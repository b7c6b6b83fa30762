//! Post detail, authoring and commenting.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::application::forms::{
    CommentSubmission, ImageChange, PostFormErrors, PostSubmission, UploadedImage, ValidPost,
};
use crate::application::repos::{
    CommentsRepo, CreateCommentParams, CreatePostParams, GroupsRepo, PostListScope, PostsRepo,
    PostsWriteRepo, RepoError, UpdatePostParams,
};
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord};
use crate::infra::uploads::{UploadStorage, UploadStorageError};

#[derive(Debug, Error)]
pub enum PostError {
    #[error("post {0} not found")]
    NotFound(i64),
    #[error("submitted post form is invalid")]
    Invalid(PostFormErrors),
    #[error("failed to store post image")]
    Storage(#[source] UploadStorageError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct PostDetail {
    pub post: PostRecord,
    pub comments: Vec<CommentRecord>,
    pub author_post_count: u64,
}

/// Result of opening a post for editing.
#[derive(Debug, Clone)]
pub enum EditAccess {
    Allowed(PostRecord),
    /// The viewer did not write the post; they are sent back to its detail page.
    NotAuthor,
}

#[derive(Debug, Clone)]
pub enum EditOutcome {
    Saved(PostRecord),
    NotAuthor,
}

#[derive(Debug, Clone)]
pub enum CommentOutcome {
    Created(CommentRecord),
    Rejected(&'static str),
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    comments: Arc<dyn CommentsRepo>,
    groups: Arc<dyn GroupsRepo>,
    storage: Arc<UploadStorage>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        comments: Arc<dyn CommentsRepo>,
        groups: Arc<dyn GroupsRepo>,
        storage: Arc<UploadStorage>,
    ) -> Self {
        Self {
            posts,
            writer,
            comments,
            groups,
            storage,
        }
    }

    pub async fn detail(&self, id: i64) -> Result<PostDetail, PostError> {
        let post = self.load(id).await?;
        let comments = self.comments.list_for_post(post.id).await?;
        let author_post_count = self
            .posts
            .count_posts(PostListScope::Author {
                author_id: post.author.id,
            })
            .await?;

        Ok(PostDetail {
            post,
            comments,
            author_post_count,
        })
    }

    /// Groups offered by the post form's select box.
    pub async fn group_choices(&self) -> Result<Vec<GroupRecord>, PostError> {
        Ok(self.groups.list_groups().await?)
    }

    pub async fn create(
        &self,
        author: &UserRecord,
        submission: &PostSubmission,
    ) -> Result<PostRecord, PostError> {
        let valid = self.validate(submission).await?;
        let image = match &valid.image {
            ImageChange::Replace(upload) => Some(self.store_image(upload).await?),
            ImageChange::Keep | ImageChange::Clear => None,
        };

        let params = CreatePostParams {
            author_id: author.id,
            text: valid.text,
            group_id: valid.group_id,
            image: image.clone(),
        };

        let post = match self.writer.create_post(params).await {
            Ok(post) => post,
            Err(err) => {
                self.discard_image(image.as_deref()).await;
                return Err(err.into());
            }
        };

        info!(
            target = "folio::application::posts",
            post_id = post.id,
            author = %author.username,
            "post created"
        );
        Ok(post)
    }

    pub async fn edit_access(
        &self,
        viewer: &UserRecord,
        id: i64,
    ) -> Result<EditAccess, PostError> {
        let post = self.load(id).await?;
        if post.is_authored_by(viewer) {
            Ok(EditAccess::Allowed(post))
        } else {
            Ok(EditAccess::NotAuthor)
        }
    }

    pub async fn edit(
        &self,
        viewer: &UserRecord,
        id: i64,
        submission: &PostSubmission,
    ) -> Result<EditOutcome, PostError> {
        let post = match self.edit_access(viewer, id).await? {
            EditAccess::Allowed(post) => post,
            EditAccess::NotAuthor => return Ok(EditOutcome::NotAuthor),
        };

        let valid = self.validate(submission).await?;
        let (image, stored) = match &valid.image {
            ImageChange::Keep => (post.image.clone(), None),
            ImageChange::Clear => (None, None),
            ImageChange::Replace(upload) => {
                let stored = self.store_image(upload).await?;
                (Some(stored.clone()), Some(stored))
            }
        };

        let params = UpdatePostParams {
            id: post.id,
            text: valid.text,
            group_id: valid.group_id,
            image,
        };

        let updated = match self.writer.update_post(params).await {
            Ok(updated) => updated,
            Err(err) => {
                self.discard_image(stored.as_deref()).await;
                return Err(err.into());
            }
        };

        info!(
            target = "folio::application::posts",
            post_id = updated.id,
            author = %viewer.username,
            "post updated"
        );
        Ok(EditOutcome::Saved(updated))
    }

    /// Attach a comment to an existing post. Invalid text is reported, not stored.
    pub async fn add_comment(
        &self,
        author: &UserRecord,
        post_id: i64,
        submission: &CommentSubmission,
    ) -> Result<CommentOutcome, PostError> {
        let post = self.load(post_id).await?;

        let text = match submission.validate() {
            Ok(text) => text,
            Err(message) => {
                warn!(
                    target = "folio::application::posts",
                    post_id = post.id,
                    author = %author.username,
                    reason = message,
                    "rejected comment"
                );
                return Ok(CommentOutcome::Rejected(message));
            }
        };

        let comment = self
            .comments
            .create_comment(CreateCommentParams {
                post_id: post.id,
                author_id: author.id,
                text,
            })
            .await?;
        Ok(CommentOutcome::Created(comment))
    }

    async fn load(&self, id: i64) -> Result<PostRecord, PostError> {
        self.posts
            .find_by_id(id)
            .await?
            .ok_or(PostError::NotFound(id))
    }

    async fn validate(&self, submission: &PostSubmission) -> Result<ValidPost, PostError> {
        let groups = self.groups.list_groups().await?;
        submission.validate(&groups).map_err(PostError::Invalid)
    }

    async fn store_image(&self, upload: &UploadedImage) -> Result<String, PostError> {
        self.storage
            .store_post_image(&upload.filename, &upload.data)
            .await
            .map_err(PostError::Storage)
    }

    async fn discard_image(&self, stored: Option<&str>) {
        let Some(path) = stored else {
            return;
        };
        if let Err(err) = self.storage.delete(path).await {
            warn!(
                target = "folio::application::posts",
                path,
                error = %err,
                "failed to remove orphaned post image"
            );
        }
    }
}
