use std::{collections::HashSet, sync::Arc};

use crate::{
    api::{CommentId, Connection, Cursor, Edge, PageInfo, Time, VoteType},
    walk, CommentNode, OrphanBuffer, RepliesPageState, TreeConfig,
};

/// Root comments of a thread, as handed out to the rendering layer
///
/// Cloning is cheap, and a snapshot never changes once taken: every mutation
/// of the tree copies the nodes on the path to the change, so unchanged
/// subtrees stay pointer-equal across snapshots.
pub type Forest = Arc<Vec<Arc<CommentNode>>>;

/// What an operation on a [`CommentTree`] ended up doing
///
/// None of these are errors: the tree favors converging eventually over
/// rejecting operations that arrive at an unexpected time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// The tree now reflects the operation
    Applied,

    /// The comment was already known
    Duplicate,

    /// The parent of the comment is not known yet, so the comment was put
    /// aside until it shows up
    Buffered,

    /// The comment the operation is about is not in the tree
    NotFound,

    /// The page was fetched for a cursor the target has moved past since
    Stale,

    /// The operation is not about this tree
    Ignored,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum PageTarget {
    Roots,
    Replies(CommentId),
}

/// Token for a page fetch, handed out by [`CommentTree::begin_load_more`]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LoadMoreRequest {
    pub target: PageTarget,
    pub after: Option<Cursor>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Violation {
    DuplicateId(CommentId),
    WrongDepth {
        id: CommentId,
        expected: u32,
        found: u32,
    },
    WrongParent {
        id: CommentId,
        expected: Option<CommentId>,
        found: Option<CommentId>,
    },
    TotalBelowChildren {
        id: Option<CommentId>,
        total: usize,
        children: usize,
    },
}

/// The comments of one thread, kept consistent while pages and push events
/// arrive in any order
#[derive(Clone, Debug)]
pub struct CommentTree {
    config: TreeConfig,
    roots: Forest,
    roots_page: RepliesPageState,
    orphans: OrphanBuffer,
    in_flight: HashSet<PageTarget>,
}

impl CommentTree {
    pub fn new(config: TreeConfig) -> CommentTree {
        CommentTree {
            config,
            roots: Arc::new(Vec::new()),
            roots_page: RepliesPageState::unfetched(),
            orphans: OrphanBuffer::new(),
            in_flight: HashSet::new(),
        }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn snapshot(&self) -> Forest {
        self.roots.clone()
    }

    pub fn roots(&self) -> &[Arc<CommentNode>] {
        &self.roots
    }

    pub fn roots_page(&self) -> &RepliesPageState {
        &self.roots_page
    }

    pub fn orphans(&self) -> &OrphanBuffer {
        &self.orphans
    }

    pub fn find(&self, id: &CommentId) -> Option<&Arc<CommentNode>> {
        walk::find(&self.roots, id)
    }

    pub fn contains(&self, id: &CommentId) -> bool {
        walk::contains(&self.roots, id)
    }

    /// Number of comments in the tree, not counting buffered orphans
    pub fn total_count(&self) -> usize {
        walk::preorder(&self.roots).count()
    }

    pub fn can_reply(&self, id: &CommentId) -> bool {
        self.find(id)
            .map_or(false, |n| n.depth < self.config.max_reply_depth)
    }

    /// Vote the viewing user means to end up with when clicking `clicked` on
    /// comment `id`, or `None` if the comment is unknown
    pub fn vote_intent(&self, id: &CommentId, clicked: VoteType) -> Option<Option<VoteType>> {
        self.find(id).map(|n| VoteType::toggle(n.user_vote, clicked))
    }

    /// Replaces the whole forest with `roots`
    ///
    /// Comments that are not roots are dropped. Buffered orphans are kept, and
    /// attached right away if their parent is part of the new forest.
    pub fn seed(&mut self, roots: Vec<CommentNode>) {
        let mut seen = HashSet::new();
        let mut forest = Vec::with_capacity(roots.len());
        for mut node in roots {
            if let Some(parent) = &node.parent_id {
                tracing::warn!(id = %node.id, %parent, "dropping non-root comment from seed");
                continue;
            }
            if !seen.insert(node.id.clone()) {
                tracing::warn!(id = %node.id, "dropping duplicate root comment from seed");
                continue;
            }
            node.depth = 0;
            walk::adopt(&mut node, &mut seen);
            forest.push(Arc::new(node));
        }
        let num_roots = forest.len();
        self.roots = Arc::new(forest);
        self.roots_page = RepliesPageState {
            loaded_count: num_roots,
            total_count: num_roots,
            next_cursor: None,
            exhausted: true,
        };
        self.in_flight.clear();

        self.drop_known_orphans(&seen);
        let ready = self
            .orphans
            .waiting_on()
            .filter(|p| seen.contains(*p))
            .cloned()
            .collect();
        self.release_orphans(ready);
    }

    /// Same as [`CommentTree::seed`], also recording where to fetch the next
    /// page of root comments from
    pub fn seed_connection(&mut self, page: Connection<CommentNode>) {
        let Connection {
            edges,
            page_info,
            total_count,
        } = page;
        self.seed(edges.into_iter().map(|e| e.node).collect());
        let num_roots = self.roots.len();
        self.roots_page = RepliesPageState::unfetched();
        self.roots_page
            .merge_page(&page_info, num_roots, total_count, num_roots);
    }

    /// Adds a comment that was just created, either by a push event or by the
    /// response to a local submission
    ///
    /// Roots go first, replies go last among their siblings. Replies to an
    /// unknown comment are buffered until it arrives.
    pub fn insert(&mut self, node: CommentNode) -> Outcome {
        if self.contains(&node.id) || self.orphans.contains(&node.id) {
            tracing::trace!(id = %node.id, "ignoring already-known comment");
            return Outcome::Duplicate;
        }
        match self.attach(node) {
            Ok(new_ids) => {
                self.drop_known_orphans(&new_ids.iter().cloned().collect());
                self.release_orphans(new_ids);
                Outcome::Applied
            }
            Err((parent, node)) => {
                tracing::debug!(id = %node.id, %parent, "buffering reply to unknown comment");
                self.orphans.hold(parent, node);
                Outcome::Buffered
            }
        }
    }

    /// Removes comment `id`
    ///
    /// Its replies take its place under its own parent, one level up.
    pub fn remove(&mut self, id: &CommentId) -> Outcome {
        self.in_flight.remove(&PageTarget::Replies(id.clone()));

        if let Some(mut node) = self.orphans.remove(id) {
            tracing::debug!(%id, "removing buffered reply");
            let mut moved = std::mem::take(&mut node.children)
                .into_iter()
                .map(|c| Arc::try_unwrap(c).unwrap_or_else(|c| CommentNode::clone(&c)))
                .collect::<Vec<_>>();
            moved.extend(self.orphans.take(id));
            for mut c in moved {
                c.parent_id = node.parent_id.clone();
                self.insert(c);
            }
            return Outcome::Applied;
        }
        if let Some(owner) = self.orphans.remove_embedded(id) {
            tracing::debug!(%id, %owner, "removing reply embedded in a buffered comment");
            for mut o in self.orphans.take(id) {
                o.parent_id = Some(owner.clone());
                self.insert(o);
            }
            return Outcome::Applied;
        }

        let Some(path) = walk::locate(&self.roots, id) else {
            tracing::trace!(%id, "ignoring removal of unknown comment");
            return Outcome::NotFound;
        };
        let Some((&idx, parent_path)) = path.split_last() else {
            return Outcome::NotFound;
        };
        let roots = Arc::make_mut(&mut self.roots);
        let (siblings, state, parent_id, depth) = if parent_path.is_empty() {
            (roots, &mut self.roots_page, None, 0)
        } else {
            let Some(p) = walk::make_mut_at(roots, parent_path) else {
                return Outcome::NotFound;
            };
            let parent_id = Some(p.id.clone());
            let depth = p.depth + 1;
            (&mut p.children, &mut p.replies, parent_id, depth)
        };

        let num_adopted = walk::unlink(siblings, state, idx, parent_id.clone(), depth);
        tracing::debug!(%id, num_adopted, "removed comment");

        for mut o in self.orphans.take(id) {
            o.parent_id = parent_id.clone();
            self.insert(o);
        }
        Outcome::Applied
    }

    /// Records the viewing user's vote on comment `id`
    ///
    /// `vote_count` overrides the displayed count only when given, as the
    /// count is otherwise owned by the vote broadcasts.
    pub fn update_vote(
        &mut self,
        id: &CommentId,
        vote: Option<VoteType>,
        vote_count: Option<i64>,
    ) -> Outcome {
        let Some(path) = walk::locate(&self.roots, id) else {
            tracing::trace!(%id, "ignoring vote on unknown comment");
            return Outcome::NotFound;
        };
        let unchanged = walk::get_at(&self.roots, &path).map_or(false, |n| {
            n.user_vote == vote && vote_count.map_or(true, |c| c == n.vote_count)
        });
        if unchanged {
            return Outcome::Applied;
        }
        let Some(node) = walk::make_mut_at(Arc::make_mut(&mut self.roots), &path) else {
            return Outcome::NotFound;
        };
        node.user_vote = vote;
        if let Some(c) = vote_count {
            node.vote_count = c;
        }
        Outcome::Applied
    }

    /// Applies an authoritative vote count, leaving the viewing user's own
    /// vote alone
    pub fn apply_vote_count(&mut self, id: &CommentId, vote_count: i64) -> Outcome {
        let Some(path) = walk::locate(&self.roots, id) else {
            tracing::trace!(%id, "ignoring vote count of unknown comment");
            return Outcome::NotFound;
        };
        if walk::get_at(&self.roots, &path).map_or(false, |n| n.vote_count == vote_count) {
            return Outcome::Applied;
        }
        let Some(node) = walk::make_mut_at(Arc::make_mut(&mut self.roots), &path) else {
            return Outcome::NotFound;
        };
        node.vote_count = vote_count;
        Outcome::Applied
    }

    pub fn edit_content(
        &mut self,
        id: &CommentId,
        content: String,
        updated_at: Option<Time>,
    ) -> Outcome {
        let Some(path) = walk::locate(&self.roots, id) else {
            tracing::trace!(%id, "ignoring edit of unknown comment");
            return Outcome::NotFound;
        };
        let Some(node) = walk::make_mut_at(Arc::make_mut(&mut self.roots), &path) else {
            return Outcome::NotFound;
        };
        node.content = content;
        node.is_edited = true;
        if updated_at.is_some() {
            node.updated_at = updated_at;
        }
        Outcome::Applied
    }

    pub fn is_loading(&self, target: &PageTarget) -> bool {
        self.in_flight.contains(target)
    }

    /// Starts fetching the next page of `target`
    ///
    /// Returns `None` when there is nothing to fetch: the target is unknown or
    /// exhausted, or a page is already being fetched for it. Fetches for one
    /// target are thus serialized, which keeps its cursor moving forward.
    pub fn begin_load_more(&mut self, target: PageTarget) -> Option<LoadMoreRequest> {
        let (exhausted, after) = {
            let state = match &target {
                PageTarget::Roots => &self.roots_page,
                PageTarget::Replies(id) => &self.find(id)?.replies,
            };
            (state.exhausted, state.next_cursor.clone())
        };
        if exhausted {
            return None;
        }
        if !self.in_flight.insert(target.clone()) {
            tracing::debug!(page = ?target, "page already being fetched");
            return None;
        }
        Some(LoadMoreRequest { target, after })
    }

    /// Forgets about a request whose fetch failed, so that it can be retried
    pub fn cancel_load_more(&mut self, target: &PageTarget) {
        self.in_flight.remove(target);
    }

    /// Applies the page fetched for `req`
    pub fn complete_load_more(
        &mut self,
        req: LoadMoreRequest,
        page: Connection<CommentNode>,
    ) -> Outcome {
        self.in_flight.remove(&req.target);
        let current = match &req.target {
            PageTarget::Roots => Some(&self.roots_page),
            PageTarget::Replies(id) => self.find(id).map(|n| &n.replies),
        };
        let Some(current) = current else {
            tracing::debug!(page = ?req.target, "dropping page for a comment that is gone");
            return Outcome::NotFound;
        };
        if current.next_cursor != req.after {
            tracing::warn!(page = ?req.target, "dropping page fetched for an outdated cursor");
            return Outcome::Stale;
        }
        match req.target {
            PageTarget::Roots => self.load_more_roots(page),
            PageTarget::Replies(id) => self.load_more_replies(&id, page),
        }
    }

    /// Appends a page of replies after the replies of comment `id` that are
    /// already known
    ///
    /// Replies that are already in the tree (eg. received by push event while
    /// the page was being fetched) are skipped.
    pub fn load_more_replies(&mut self, id: &CommentId, page: Connection<CommentNode>) -> Outcome {
        self.in_flight.remove(&PageTarget::Replies(id.clone()));
        let Some(path) = walk::locate(&self.roots, id) else {
            tracing::debug!(%id, "dropping page of replies for unknown comment");
            return Outcome::NotFound;
        };
        let mut seen = walk::ids(&self.roots);
        let Connection {
            edges,
            page_info,
            total_count,
        } = page;
        let Some(target) = walk::make_mut_at(Arc::make_mut(&mut self.roots), &path) else {
            return Outcome::NotFound;
        };
        let parent = Some(target.id.clone());
        let depth = target.depth + 1;
        let new_ids = append_page(
            &mut target.children,
            &mut target.replies,
            parent,
            depth,
            edges,
            &page_info,
            total_count,
            &mut seen,
        );
        self.drop_known_orphans(&seen);
        self.release_orphans(new_ids);
        Outcome::Applied
    }

    /// Appends a page of root comments after the ones already known
    pub fn load_more_roots(&mut self, page: Connection<CommentNode>) -> Outcome {
        self.in_flight.remove(&PageTarget::Roots);
        let mut seen = walk::ids(&self.roots);
        let Connection {
            edges,
            page_info,
            total_count,
        } = page;
        let new_ids = append_page(
            Arc::make_mut(&mut self.roots),
            &mut self.roots_page,
            None,
            0,
            edges,
            &page_info,
            total_count,
            &mut seen,
        );
        self.drop_known_orphans(&seen);
        self.release_orphans(new_ids);
        Outcome::Applied
    }

    /// Lists everything that is wrong with the tree; empty on a healthy tree
    pub fn check_invariants(&self) -> Vec<Violation> {
        let mut res = Vec::new();
        let mut seen = HashSet::new();
        if self.roots_page.total_count < self.roots.len() {
            res.push(Violation::TotalBelowChildren {
                id: None,
                total: self.roots_page.total_count,
                children: self.roots.len(),
            });
        }
        let mut pending = self
            .roots
            .iter()
            .map(|n| (n, None, 0))
            .collect::<Vec<(&Arc<CommentNode>, Option<&CommentId>, u32)>>();
        while let Some((n, parent, depth)) = pending.pop() {
            if !seen.insert(&n.id) {
                res.push(Violation::DuplicateId(n.id.clone()));
            }
            if n.depth != depth {
                res.push(Violation::WrongDepth {
                    id: n.id.clone(),
                    expected: depth,
                    found: n.depth,
                });
            }
            if n.parent_id.as_ref() != parent {
                res.push(Violation::WrongParent {
                    id: n.id.clone(),
                    expected: parent.cloned(),
                    found: n.parent_id.clone(),
                });
            }
            if n.replies.total_count < n.children.len() {
                res.push(Violation::TotalBelowChildren {
                    id: Some(n.id.clone()),
                    total: n.replies.total_count,
                    children: n.children.len(),
                });
            }
            pending.extend(n.children.iter().map(|c| (c, Some(&n.id), depth + 1)));
        }
        for o in self.orphans.nodes() {
            if seen.contains(&o.id) {
                res.push(Violation::DuplicateId(o.id.clone()));
            }
        }
        res
    }

    /// Puts `node` in the forest, returning the ids that just appeared, or
    /// hands it back along with its parent if the parent is unknown
    fn attach(&mut self, mut node: CommentNode) -> Result<Vec<CommentId>, (CommentId, CommentNode)> {
        let mut seen = if node.children.is_empty() {
            HashSet::new()
        } else {
            walk::ids(&self.roots)
        };
        seen.insert(node.id.clone());
        match node.parent_id.clone() {
            None => {
                node.depth = 0;
                walk::adopt(&mut node, &mut seen);
                let new_ids = walk::subtree_ids(&node);
                Arc::make_mut(&mut self.roots).insert(0, Arc::new(node));
                self.roots_page.loaded_count += 1;
                self.roots_page.total_count += 1;
                Ok(new_ids)
            }
            Some(parent) => {
                let Some(path) = walk::locate(&self.roots, &parent) else {
                    return Err((parent, node));
                };
                let Some(p) = walk::make_mut_at(Arc::make_mut(&mut self.roots), &path) else {
                    return Err((parent, node));
                };
                node.depth = p.depth + 1;
                walk::adopt(&mut node, &mut seen);
                let new_ids = walk::subtree_ids(&node);
                p.children.push(Arc::new(node));
                p.replies.loaded_count += 1;
                p.replies.total_count += 1;
                Ok(new_ids)
            }
        }
    }

    /// Attaches every buffered orphan waiting on one of `ready`, and then the
    /// ones waiting on those, and so on
    fn release_orphans(&mut self, mut ready: Vec<CommentId>) {
        while let Some(parent) = ready.pop() {
            for orphan in self.orphans.take(&parent) {
                if self.contains(&orphan.id) {
                    tracing::trace!(id = %orphan.id, "dropping buffered reply that arrived meanwhile");
                    self.keep_replies_of(orphan);
                    continue;
                }
                tracing::debug!(id = %orphan.id, %parent, "attaching buffered reply");
                match self.attach(orphan) {
                    Ok(new_ids) => {
                        self.drop_known_orphans(&new_ids.iter().cloned().collect());
                        ready.extend(new_ids);
                    }
                    Err((missing, orphan)) => self.orphans.hold(missing, orphan),
                }
            }
        }
    }

    /// Drops the buffered copies of comments in `known`, which are in the tree
    fn drop_known_orphans(&mut self, known: &HashSet<CommentId>) {
        for orphan in self.orphans.extract(|n| known.contains(&n.id)) {
            tracing::trace!(id = %orphan.id, "dropping buffered copy of a comment in the tree");
            self.keep_replies_of(orphan);
        }
    }

    /// Inserts the embedded replies of `node`, a copy of a comment the tree
    /// already has
    fn keep_replies_of(&mut self, node: CommentNode) {
        let mut pending = vec![node];
        while let Some(mut node) = pending.pop() {
            for c in std::mem::take(&mut node.children) {
                let mut c = Arc::try_unwrap(c).unwrap_or_else(|c| CommentNode::clone(&c));
                c.parent_id = Some(node.id.clone());
                if self.contains(&c.id) {
                    pending.push(c);
                } else {
                    self.insert(c);
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn append_page(
    siblings: &mut Vec<Arc<CommentNode>>,
    state: &mut RepliesPageState,
    parent: Option<CommentId>,
    depth: u32,
    edges: Vec<Edge<CommentNode>>,
    page_info: &PageInfo,
    total_count: Option<usize>,
    seen: &mut HashSet<CommentId>,
) -> Vec<CommentId> {
    let mut new_ids = Vec::new();
    let mut appended = 0;
    for Edge { mut node, .. } in edges {
        if !seen.insert(node.id.clone()) {
            tracing::trace!(id = %node.id, "skipping already-known comment from page");
            continue;
        }
        if node.parent_id != parent {
            tracing::debug!(
                id = %node.id,
                claimed = ?node.parent_id,
                actual = ?parent,
                "fixing parent of paginated comment"
            );
            node.parent_id = parent.clone();
        }
        node.depth = depth;
        walk::adopt(&mut node, seen);
        new_ids.extend(walk::subtree_ids(&node));
        siblings.push(Arc::new(node));
        appended += 1;
    }
    state.merge_page(page_info, appended, total_count, siblings.len());
    new_ids
}
