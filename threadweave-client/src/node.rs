use std::sync::Arc;

use crate::api::{
    self, Author, CommentAdded, CommentId, Connection, Cursor, PageInfo, Time, VoteType,
};

/// Pagination cursor over the direct replies of one comment (or over the root
/// comments, for the forest itself)
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RepliesPageState {
    /// Number of replies received so far, from pages or from push events.
    /// Never decreases.
    pub loaded_count: usize,

    /// Number of replies the server last said exist
    pub total_count: usize,

    pub next_cursor: Option<Cursor>,

    /// Once true, stays true
    pub exhausted: bool,
}

impl RepliesPageState {
    /// State of a comment that is known to have no replies yet
    pub fn empty() -> RepliesPageState {
        RepliesPageState {
            loaded_count: 0,
            total_count: 0,
            next_cursor: None,
            exhausted: true,
        }
    }

    /// State of a comment whose replies were not embedded in the response,
    /// and thus need to be paginated explicitly
    pub fn unfetched() -> RepliesPageState {
        RepliesPageState {
            loaded_count: 0,
            total_count: 0,
            next_cursor: None,
            exhausted: false,
        }
    }

    pub(crate) fn merge_page(
        &mut self,
        info: &PageInfo,
        appended: usize,
        total: Option<usize>,
        num_children: usize,
    ) {
        self.loaded_count += appended;
        if let Some(c) = &info.end_cursor {
            self.next_cursor = Some(c.clone());
        }
        self.exhausted = self.exhausted || !info.has_next_page;
        self.total_count = total.unwrap_or(self.total_count).max(num_children);
    }
}

/// One comment of the tree, along with all the replies loaded so far
///
/// Nodes held by a [`crate::CommentTree`] are shared with every snapshot taken
/// from it, and are copied-on-write when the tree changes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommentNode {
    pub id: CommentId,
    pub content: String,
    pub author: Author,
    pub parent_id: Option<CommentId>,

    /// 0 for roots, parent's depth + 1 otherwise. Recomputed whenever the node
    /// enters a tree.
    pub depth: u32,

    pub vote_count: i64,

    /// Vote of the viewing user
    pub user_vote: Option<VoteType>,

    pub is_edited: bool,
    pub created_at: Time,
    pub updated_at: Option<Time>,

    /// Replies, in the order they were received
    pub children: Vec<Arc<CommentNode>>,
    pub replies: RepliesPageState,
}

impl CommentNode {
    /// A fresh comment with no replies and no votes, eg. the response to a
    /// local submission
    pub fn new(
        id: CommentId,
        parent_id: Option<CommentId>,
        author: Author,
        content: String,
        created_at: Time,
    ) -> CommentNode {
        CommentNode {
            id,
            content,
            author,
            parent_id,
            depth: 0,
            vote_count: 0,
            user_vote: None,
            is_edited: false,
            created_at,
            updated_at: None,
            children: Vec::new(),
            replies: RepliesPageState::empty(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

// Embedded replies are bounded by the query's embedding depth, so recursing here
// is fine (serde_json also refuses to nest more than 128 levels anyway)
impl From<api::Comment> for CommentNode {
    fn from(c: api::Comment) -> CommentNode {
        let parent_id = c.parent_id().cloned();
        let (children, replies) = match c.replies {
            None => (Vec::new(), RepliesPageState::unfetched()),
            Some(conn) => replies_from(conn),
        };
        CommentNode {
            id: c.id,
            content: c.content,
            author: c.author,
            parent_id,
            depth: c.depth.unwrap_or(0),
            vote_count: c.vote_count,
            user_vote: c.user_vote,
            is_edited: c.is_edited,
            created_at: c.created_at,
            updated_at: c.updated_at,
            children,
            replies,
        }
    }
}

fn replies_from(conn: Connection<api::Comment>) -> (Vec<Arc<CommentNode>>, RepliesPageState) {
    let Connection {
        edges,
        page_info,
        total_count,
    } = conn;
    let children = edges
        .into_iter()
        .map(|e| Arc::new(CommentNode::from(e.node)))
        .collect::<Vec<_>>();
    let mut state = RepliesPageState::unfetched();
    state.merge_page(&page_info, children.len(), total_count, children.len());
    (children, state)
}

impl From<CommentAdded> for CommentNode {
    fn from(c: CommentAdded) -> CommentNode {
        let author = Author {
            id: c.author.id,
            username: c.author.username,
            is_verified: false,
            avatar_url: c.author.avatar_url,
        };
        let mut node = CommentNode::new(c.id, c.parent_id, author, c.content, c.created_at);
        node.depth = c.depth.unwrap_or(0);
        node
    }
}

// Dropping a deep chain of nodes would otherwise recurse once per level
impl Drop for CommentNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(child) = pending.pop() {
            if let Ok(mut child) = Arc::try_unwrap(child) {
                pending.append(&mut child.children);
            }
        }
    }
}
