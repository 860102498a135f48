use std::{collections::HashMap, mem};

use crate::{api::CommentId, walk, CommentNode};

/// Replies that arrived before their parent, keyed by the missing parent
///
/// Nodes held here are not part of the rendered tree. They are attached as
/// soon as their parent shows up, be it through a push event, a page of
/// replies or a new seed.
#[derive(Clone, Debug, Default)]
pub struct OrphanBuffer {
    waiting: HashMap<CommentId, Vec<CommentNode>>,
}

impl OrphanBuffer {
    pub fn new() -> OrphanBuffer {
        OrphanBuffer::default()
    }

    pub fn len(&self) -> usize {
        self.waiting.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    /// Parents that are currently missing
    pub fn waiting_on(&self) -> impl Iterator<Item = &CommentId> {
        self.waiting.keys()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CommentNode> {
        self.waiting.values().flat_map(|v| v.iter())
    }

    /// Whether `id` is held here, either directly or as an embedded reply of
    /// a held node
    pub fn contains(&self, id: &CommentId) -> bool {
        self.nodes()
            .any(|n| n.id == *id || walk::contains(&n.children, id))
    }

    pub(crate) fn hold(&mut self, parent: CommentId, node: CommentNode) {
        self.waiting.entry(parent).or_default().push(node);
    }

    /// Removes and returns everything that was waiting on `parent`, in arrival
    /// order
    pub(crate) fn take(&mut self, parent: &CommentId) -> Vec<CommentNode> {
        self.waiting.remove(parent).unwrap_or_default()
    }

    /// Removes the held node `id`, not looking at embedded replies
    pub(crate) fn remove(&mut self, id: &CommentId) -> Option<CommentNode> {
        let (parent, idx) = self.waiting.iter().find_map(|(p, v)| {
            v.iter()
                .position(|n| n.id == *id)
                .map(|i| (p.clone(), i))
        })?;
        let list = self.waiting.get_mut(&parent)?;
        let node = list.remove(idx);
        if list.is_empty() {
            self.waiting.remove(&parent);
        }
        Some(node)
    }

    /// Removes `id` from the embedded replies of a held node, its own replies
    /// taking its place one level up
    ///
    /// Returns the id of the comment that adopted them.
    pub(crate) fn remove_embedded(&mut self, id: &CommentId) -> Option<CommentId> {
        for held in self.waiting.values_mut().flat_map(|v| v.iter_mut()) {
            let Some(path) = walk::locate(&held.children, id) else {
                continue;
            };
            let (&idx, owner_path) = path.split_last()?;
            let owner = if owner_path.is_empty() {
                held
            } else {
                walk::make_mut_at(&mut held.children, owner_path)?
            };
            let owner_id = owner.id.clone();
            let depth = owner.depth + 1;
            walk::unlink(
                &mut owner.children,
                &mut owner.replies,
                idx,
                Some(owner_id.clone()),
                depth,
            );
            return Some(owner_id);
        }
        None
    }

    /// Removes and returns every held node `pick` returns `true` for
    pub(crate) fn extract(&mut self, mut pick: impl FnMut(&CommentNode) -> bool) -> Vec<CommentNode> {
        let mut res = Vec::new();
        for list in self.waiting.values_mut() {
            let (picked, kept): (Vec<_>, Vec<_>) = mem::take(list).into_iter().partition(|n| pick(n));
            *list = kept;
            res.extend(picked);
        }
        self.waiting.retain(|_, list| !list.is_empty());
        res
    }
}
