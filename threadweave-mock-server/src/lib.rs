use std::collections::{btree_map, BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use threadweave_api::{
    Author, Comment, CommentAdded, CommentDeleted, CommentId, Connection, Cursor, Edge, Error,
    EventAuthor, PageInfo, ParentRef, PostId, PushEvent, TargetType, ThreadSource, Time, UserId,
    VotePayload, VoteType, VoteUpdated,
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// In-memory canonical copy of one thread, answering the same queries as the
/// real API and broadcasting the same push events
pub struct MockServer {
    post: PostId,
    viewer: Option<UserId>,
    epoch: Time,
    next_seq: i64,
    embed_depth: usize,
    embed_first: usize,
    comments: BTreeMap<CommentId, DbComment>,
    feeds: Vec<mpsc::UnboundedSender<PushEvent>>,
}

#[derive(Debug)]
struct DbComment {
    seq: i64,
    content: String,
    author: UserId,
    parent: Option<CommentId>,
    depth: u32,
    votes: HashMap<UserId, VoteType>,
    is_edited: bool,
    updated_at: Option<Time>,
}

impl DbComment {
    fn vote_count(&self) -> i64 {
        self.votes.values().map(|v| v.weight()).sum()
    }
}

/// Where a comment sits in the canonical thread
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Shape {
    pub parent: Option<CommentId>,
    pub depth: u32,
    pub vote_count: i64,
}

impl MockServer {
    pub fn new(post: PostId) -> MockServer {
        MockServer {
            post,
            viewer: None,
            epoch: Utc::now(),
            next_seq: 0,
            embed_depth: 3,
            embed_first: 3,
            comments: BTreeMap::new(),
            feeds: Vec::new(),
        }
    }

    /// Embed `depth` levels of replies in every returned comment, `first`
    /// replies per level
    pub fn with_embedding(mut self, depth: usize, first: usize) -> MockServer {
        self.embed_depth = depth;
        self.embed_first = first;
        self
    }

    /// User whose votes are reported as `userVote`
    pub fn with_viewer(mut self, viewer: UserId) -> MockServer {
        self.viewer = Some(viewer);
        self
    }

    pub fn post(&self) -> &PostId {
        &self.post
    }

    pub fn new_comment_id() -> CommentId {
        CommentId::new(Uuid::new_v4().to_string())
    }

    /// Return the current number of comments
    pub fn test_num_comments(&self) -> usize {
        self.comments.len()
    }

    /// Return the id of comment number `idx`, in id order
    pub fn test_get_comment_id(&self, idx: usize) -> Option<&CommentId> {
        self.comments.keys().nth(idx)
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<PushEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        // receiver is alive, so this cannot fail
        let _ = sender.send(PushEvent::Connected {
            post_id: Some(self.post.clone()),
        });
        self.feeds.push(sender);
        receiver
    }

    fn relay_event(&mut self, e: PushEvent) {
        self.feeds.retain_mut(|f| matches!(f.send(e.clone()), Ok(())));
    }

    pub fn add_comment(
        &mut self,
        id: CommentId,
        author: UserId,
        parent: Option<CommentId>,
        content: String,
    ) -> Result<Comment, Error> {
        threadweave_api::validate_string(&content)?;
        let depth = match &parent {
            None => 0,
            Some(p) => {
                self.comments
                    .get(p)
                    .ok_or_else(|| Error::CommentNotFound(p.clone()))?
                    .depth
                    + 1
            }
        };
        let seq = self.next_seq;
        match self.comments.entry(id.clone()) {
            btree_map::Entry::Occupied(_) => return Err(Error::IdAlreadyUsed(id)),
            btree_map::Entry::Vacant(entry) => {
                entry.insert(DbComment {
                    seq,
                    content: content.clone(),
                    author: author.clone(),
                    parent: parent.clone(),
                    depth,
                    votes: HashMap::new(),
                    is_edited: false,
                    updated_at: None,
                });
            }
        }
        self.next_seq += 1;
        self.relay_event(PushEvent::CommentAdded(CommentAdded {
            id: id.clone(),
            content,
            author: EventAuthor {
                username: author.0.clone(),
                id: author,
                avatar_url: None,
            },
            post_id: self.post.clone(),
            parent_id: parent,
            depth: Some(depth),
            created_at: self.created_at(seq),
        }));
        self.to_api(&id, 1)
    }

    /// Removes comment `id`, its replies moving up to its own parent
    pub fn delete_comment(&mut self, id: &CommentId) -> Result<(), Error> {
        let removed = self
            .comments
            .remove(id)
            .ok_or_else(|| Error::CommentNotFound(id.clone()))?;
        let mut pending = Vec::new();
        for (cid, c) in self.comments.iter_mut() {
            if c.parent.as_ref() == Some(id) {
                c.parent = removed.parent.clone();
                c.depth = removed.depth;
                pending.push(cid.clone());
            }
        }
        while let Some(p) = pending.pop() {
            let Some(depth) = self.comments.get(&p).map(|c| c.depth + 1) else {
                continue;
            };
            for (cid, c) in self.comments.iter_mut() {
                if c.parent.as_ref() == Some(&p) {
                    c.depth = depth;
                    pending.push(cid.clone());
                }
            }
        }
        self.relay_event(PushEvent::CommentDeleted(CommentDeleted {
            id: id.clone(),
            post_id: self.post.clone(),
            parent_id: removed.parent,
        }));
        Ok(())
    }

    /// Sets `user`'s vote on comment `id`, `None` removing it
    pub fn vote(
        &mut self,
        user: UserId,
        id: &CommentId,
        vote: Option<VoteType>,
    ) -> Result<VotePayload, Error> {
        let c = self
            .comments
            .get_mut(id)
            .ok_or_else(|| Error::CommentNotFound(id.clone()))?;
        match vote {
            Some(v) => c.votes.insert(user, v),
            None => c.votes.remove(&user),
        };
        let vote_count = c.vote_count();
        self.relay_event(PushEvent::VoteUpdated(VoteUpdated {
            target_id: id.0.clone(),
            target_type: TargetType::Comment,
            vote_count,
            user_vote: vote,
        }));
        Ok(VotePayload {
            success: true,
            vote_count,
            user_vote: vote,
        })
    }

    pub fn edit_comment(&mut self, id: &CommentId, content: String) -> Result<Comment, Error> {
        threadweave_api::validate_string(&content)?;
        let c = self
            .comments
            .get_mut(id)
            .ok_or_else(|| Error::CommentNotFound(id.clone()))?;
        c.content = content;
        c.is_edited = true;
        c.updated_at = Some(Utc::now());
        self.to_api(id, 1)
    }

    pub fn shape(&self) -> BTreeMap<CommentId, Shape> {
        self.comments
            .iter()
            .map(|(id, c)| {
                (
                    id.clone(),
                    Shape {
                        parent: c.parent.clone(),
                        depth: c.depth,
                        vote_count: c.vote_count(),
                    },
                )
            })
            .collect()
    }

    /// Votes of the viewer, by comment
    pub fn viewer_votes(&self) -> BTreeMap<CommentId, VoteType> {
        let Some(viewer) = &self.viewer else {
            return BTreeMap::new();
        };
        self.comments
            .iter()
            .filter_map(|(id, c)| c.votes.get(viewer).map(|v| (id.clone(), *v)))
            .collect()
    }

    pub fn page_of_roots(
        &self,
        post: &PostId,
        first: usize,
        after: Option<&Cursor>,
    ) -> Result<Connection<Comment>, Error> {
        if *post != self.post {
            return Ok(Connection::empty());
        }
        let after = after.map(parse_cursor).transpose()?;
        // newest first
        let mut roots = self
            .comments
            .iter()
            .filter(|(_, c)| c.parent.is_none())
            .filter(|(_, c)| after.map_or(true, |a| c.seq < a))
            .map(|(id, c)| (c.seq, id))
            .collect::<Vec<_>>();
        roots.sort_unstable_by_key(|(seq, _)| std::cmp::Reverse(*seq));
        let total = self.comments.values().filter(|c| c.parent.is_none()).count();
        self.page(roots, first, total, self.embed_depth)
    }

    pub fn page_of_replies(
        &self,
        id: &CommentId,
        first: usize,
        after: Option<&Cursor>,
    ) -> Result<Connection<Comment>, Error> {
        if !self.comments.contains_key(id) {
            return Err(Error::CommentNotFound(id.clone()));
        }
        let after = after.map(parse_cursor).transpose()?;
        self.replies_page(id, first, after, self.embed_depth)
    }

    fn replies_page(
        &self,
        id: &CommentId,
        first: usize,
        after: Option<i64>,
        embed: usize,
    ) -> Result<Connection<Comment>, Error> {
        let children = self
            .comments
            .iter()
            .filter(|(_, c)| c.parent.as_ref() == Some(id));
        let total = children.clone().count();
        // oldest first
        let mut replies = children
            .filter(|(_, c)| after.map_or(true, |a| c.seq > a))
            .map(|(cid, c)| (c.seq, cid))
            .collect::<Vec<_>>();
        replies.sort_unstable_by_key(|(seq, _)| *seq);
        self.page(replies, first, total, embed)
    }

    fn page(
        &self,
        ordered: Vec<(i64, &CommentId)>,
        first: usize,
        total: usize,
        embed: usize,
    ) -> Result<Connection<Comment>, Error> {
        let has_next_page = ordered.len() > first;
        let mut edges = Vec::with_capacity(first);
        for (seq, id) in ordered.into_iter().take(first) {
            edges.push(Edge {
                node: self.to_api(id, embed)?,
                cursor: Cursor(seq.to_string()),
            });
        }
        Ok(Connection {
            page_info: PageInfo {
                has_next_page,
                has_previous_page: false,
                start_cursor: edges.first().map(|e| e.cursor.clone()),
                end_cursor: edges.last().map(|e| e.cursor.clone()),
            },
            edges,
            total_count: Some(total),
        })
    }

    /// `id` with `embed` levels of replies embedded
    fn to_api(&self, id: &CommentId, embed: usize) -> Result<Comment, Error> {
        let c = self
            .comments
            .get(id)
            .ok_or_else(|| Error::CommentNotFound(id.clone()))?;
        let replies = match embed {
            0 => None,
            _ => Some(self.replies_page(id, self.embed_first, None, embed - 1)?),
        };
        Ok(Comment {
            id: id.clone(),
            content: c.content.clone(),
            author: Author {
                id: c.author.clone(),
                username: c.author.0.clone(),
                is_verified: false,
                avatar_url: None,
            },
            parent: c.parent.clone().map(|id| ParentRef { id }),
            depth: Some(c.depth),
            vote_count: c.vote_count(),
            user_vote: self.viewer.as_ref().and_then(|v| c.votes.get(v).copied()),
            is_edited: c.is_edited,
            created_at: self.created_at(c.seq),
            updated_at: c.updated_at,
            replies,
        })
    }

    fn created_at(&self, seq: i64) -> Time {
        self.epoch + chrono::Duration::seconds(seq)
    }
}

fn parse_cursor(c: &Cursor) -> Result<i64, Error> {
    c.0.parse()
        .map_err(|_| Error::Unknown(format!("invalid cursor {:?}", c.0)))
}

#[async_trait]
impl ThreadSource for MockServer {
    async fn fetch_comments(
        &mut self,
        post: &PostId,
        first: usize,
        after: Option<Cursor>,
    ) -> anyhow::Result<Connection<Comment>> {
        Ok(self.page_of_roots(post, first, after.as_ref())?)
    }

    async fn fetch_replies(
        &mut self,
        comment: &CommentId,
        first: usize,
        after: Option<Cursor>,
    ) -> anyhow::Result<Connection<Comment>> {
        Ok(self.page_of_replies(comment, first, after.as_ref())?)
    }
}
