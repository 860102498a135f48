use std::{cmp::Reverse, sync::Arc};

use crate::{api::CommentOrder, CommentNode};

pub trait OrderExt {
    fn sort(&self, nodes: &mut [Arc<CommentNode>]);

    /// Sorted copy of `nodes`, leaving the tree's own order alone
    fn view(&self, nodes: &[Arc<CommentNode>]) -> Vec<Arc<CommentNode>> {
        let mut res = nodes.to_vec();
        self.sort(&mut res);
        res
    }
}

impl OrderExt for CommentOrder {
    fn sort(&self, nodes: &mut [Arc<CommentNode>]) {
        // Stable, so that comments created at the same instant keep arrival order
        match self {
            CommentOrder::Newest => nodes.sort_by_key(|n| Reverse(n.created_at)),
            CommentOrder::Oldest => nodes.sort_by_key(|n| n.created_at),
            CommentOrder::Top => {
                nodes.sort_by_key(|n| (Reverse(n.vote_count), Reverse(n.created_at)))
            }
        }
    }
}
