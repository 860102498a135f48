//! Stack-based traversals over a forest of comment nodes
//!
//! None of these recurse, so arbitrarily deep threads are fine.

use std::{collections::HashSet, sync::Arc};

use crate::{api::CommentId, CommentNode, RepliesPageState};

/// Pre-order, depth-first iterator over a forest
pub(crate) struct Preorder<'a> {
    stack: Vec<&'a Arc<CommentNode>>,
}

impl<'a> Iterator for Preorder<'a> {
    type Item = &'a Arc<CommentNode>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

pub(crate) fn preorder(forest: &[Arc<CommentNode>]) -> Preorder<'_> {
    Preorder {
        stack: forest.iter().rev().collect(),
    }
}

pub(crate) fn find<'a>(
    forest: &'a [Arc<CommentNode>],
    id: &CommentId,
) -> Option<&'a Arc<CommentNode>> {
    preorder(forest).find(|n| n.id == *id)
}

pub(crate) fn contains(forest: &[Arc<CommentNode>], id: &CommentId) -> bool {
    find(forest, id).is_some()
}

pub(crate) fn ids(forest: &[Arc<CommentNode>]) -> HashSet<CommentId> {
    preorder(forest).map(|n| n.id.clone()).collect()
}

/// Returns the child indices leading from the forest down to `id`
pub(crate) fn locate(forest: &[Arc<CommentNode>], id: &CommentId) -> Option<Vec<usize>> {
    let mut frames: Vec<(&[Arc<CommentNode>], usize)> = vec![(forest, 0)];
    let mut path = Vec::new();
    while let Some(frame) = frames.last_mut() {
        let (nodes, next) = *frame;
        if next == nodes.len() {
            frames.pop();
            path.pop();
            continue;
        }
        frame.1 += 1;
        let node = &nodes[next];
        if node.id == *id {
            path.push(next);
            return Some(path);
        }
        if !node.children.is_empty() {
            path.push(next);
            frames.push((&node.children[..], 0));
        }
    }
    None
}

pub(crate) fn get_at<'a>(
    forest: &'a [Arc<CommentNode>],
    path: &[usize],
) -> Option<&'a Arc<CommentNode>> {
    let (first, rest) = path.split_first()?;
    let mut node = forest.get(*first)?;
    for i in rest {
        node = node.children.get(*i)?;
    }
    Some(node)
}

/// Gives mutable access to the node at `path`, copying every shared node on
/// the way down so that snapshots taken earlier are left untouched
pub(crate) fn make_mut_at<'a>(
    forest: &'a mut Vec<Arc<CommentNode>>,
    path: &[usize],
) -> Option<&'a mut CommentNode> {
    let (first, rest) = path.split_first()?;
    let mut node = Arc::make_mut(forest.get_mut(*first)?);
    for i in rest {
        node = Arc::make_mut(node.children.get_mut(*i)?);
    }
    Some(node)
}

/// Rewrites the depth of every node below `node` from `node`'s own depth,
/// along with their parent links
pub(crate) fn fix_subtree(node: &mut CommentNode) {
    let mut pending: Vec<&mut CommentNode> = vec![node];
    while let Some(n) = pending.pop() {
        let depth = n.depth + 1;
        let id = n.id.clone();
        for c in n.children.iter_mut() {
            let c = Arc::make_mut(c);
            c.depth = depth;
            c.parent_id = Some(id.clone());
            pending.push(c);
        }
    }
}

/// Same as [`fix_subtree`], but also drops every reply whose id is already in
/// `seen`, and records the ids that are kept
pub(crate) fn adopt(node: &mut CommentNode, seen: &mut HashSet<CommentId>) {
    let mut pending: Vec<&mut CommentNode> = vec![node];
    while let Some(n) = pending.pop() {
        n.children.retain(|c| {
            let fresh = seen.insert(c.id.clone());
            if !fresh {
                tracing::warn!(id = %c.id, "dropping reply that is already in the tree");
            }
            fresh
        });
        let depth = n.depth + 1;
        let id = n.id.clone();
        for c in n.children.iter_mut() {
            let c = Arc::make_mut(c);
            c.depth = depth;
            c.parent_id = Some(id.clone());
            pending.push(c);
        }
    }
}

/// Removes `siblings[idx]`, whose replies take its place one level up under
/// `parent_id`, and returns how many replies moved
pub(crate) fn unlink(
    siblings: &mut Vec<Arc<CommentNode>>,
    state: &mut RepliesPageState,
    idx: usize,
    parent_id: Option<CommentId>,
    depth: u32,
) -> usize {
    let mut adopted = match Arc::try_unwrap(siblings.remove(idx)) {
        Ok(mut removed) => std::mem::take(&mut removed.children),
        Err(removed) => removed.children.clone(),
    };
    for c in adopted.iter_mut() {
        let c = Arc::make_mut(c);
        c.parent_id = parent_id.clone();
        c.depth = depth;
        fix_subtree(c);
    }
    let num_adopted = adopted.len();
    siblings.splice(idx..idx, adopted);
    state.total_count = state.total_count.saturating_sub(1) + num_adopted;
    state.loaded_count += num_adopted;
    num_adopted
}

/// `node`'s id followed by the ids of all its replies
pub(crate) fn subtree_ids(node: &CommentNode) -> Vec<CommentId> {
    let mut res = vec![node.id.clone()];
    res.extend(preorder(&node.children).map(|n| n.id.clone()));
    res
}
