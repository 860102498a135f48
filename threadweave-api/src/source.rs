use async_trait::async_trait;

use crate::{Comment, CommentId, Connection, Cursor, PostId};

/// The remote side that comment pages are fetched from
#[async_trait]
pub trait ThreadSource {
    /// Root comments of `post`, each with a bounded number of levels of
    /// replies embedded
    async fn fetch_comments(
        &mut self,
        post: &PostId,
        first: usize,
        after: Option<Cursor>,
    ) -> anyhow::Result<Connection<Comment>>;

    /// Next page of direct replies of `comment`
    async fn fetch_replies(
        &mut self,
        comment: &CommentId,
        first: usize,
        after: Option<Cursor>,
    ) -> anyhow::Result<Connection<Comment>>;
}
