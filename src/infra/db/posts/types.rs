use time::OffsetDateTime;

use crate::domain::entities::{AuthorRef, GroupRef, PostRecord};

#[derive(sqlx::FromRow)]
pub(crate) struct PostRow {
    pub(crate) id: i64,
    pub(crate) text: String,
    pub(crate) image: Option<String>,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) author_id: i64,
    pub(crate) author_username: String,
    pub(crate) group_id: Option<i64>,
    pub(crate) group_title: Option<String>,
    pub(crate) group_slug: Option<String>,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        let group = match (row.group_id, row.group_title, row.group_slug) {
            (Some(id), Some(title), Some(slug)) => Some(GroupRef { id, title, slug }),
            _ => None,
        };

        Self {
            id: row.id,
            text: row.text,
            author: AuthorRef {
                id: row.author_id,
                username: row.author_username,
            },
            group,
            image: row.image.filter(|path| !path.is_empty()),
            created_at: row.created_at,
        }
    }
}
