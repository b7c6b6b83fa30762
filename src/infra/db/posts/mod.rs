mod read;
mod types;
mod write;

use super::PostgresRepositories;

/// Joined column list shared by every post query. Expects `p`, `u` and `g` aliases.
const POST_COLUMNS: &str = "p.id, p.text, p.image, p.created_at, \
     u.id AS author_id, u.username AS author_username, \
     g.id AS group_id, g.title AS group_title, g.slug AS group_slug";

const POST_JOINS: &str =
    " INNER JOIN users u ON u.id = p.author_id LEFT JOIN groups g ON g.id = p.group_id ";

/// Newest first; id breaks ties between posts created in the same instant.
const POST_ORDER: &str = " ORDER BY p.created_at DESC, p.id DESC ";

impl PostgresRepositories {
    fn post_select(source: &str) -> String {
        format!("SELECT {POST_COLUMNS} FROM {source} p{POST_JOINS}")
    }
}
