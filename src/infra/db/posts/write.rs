use async_trait::async_trait;

use crate::application::repos::{CreatePostParams, PostsWriteRepo, RepoError, UpdatePostParams};
use crate::domain::entities::PostRecord;
use crate::infra::db::map_sqlx_error;

use super::PostgresRepositories;
use super::types::PostRow;

#[async_trait]
impl PostsWriteRepo for PostgresRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let sql = format!(
            "WITH inserted AS (\
                 INSERT INTO posts (author_id, text, group_id, image) \
                 VALUES ($1, $2, $3, $4) RETURNING *\
             ) {}",
            Self::post_select("inserted")
        );

        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(params.author_id)
            .bind(&params.text)
            .bind(params.group_id)
            .bind(params.image.as_deref())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let sql = format!(
            "WITH updated AS (\
                 UPDATE posts SET text = $2, group_id = $3, image = $4 \
                 WHERE id = $1 RETURNING *\
             ) {}",
            Self::post_select("updated")
        );

        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(params.id)
            .bind(&params.text)
            .bind(params.group_id)
            .bind(params.image.as_deref())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;

        Ok(row.into())
    }

    async fn delete_post(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
