mod config;
pub use config::TreeConfig;

mod node;
pub use node::{CommentNode, RepliesPageState};

mod order;
pub use order::OrderExt;

mod orphan;
pub use orphan::OrphanBuffer;

mod feed;

pub mod sync;

mod tree;
pub use tree::{CommentTree, Forest, LoadMoreRequest, Outcome, PageTarget, Violation};

mod walk;

#[cfg(test)]
mod fuzz;

pub mod api {
    pub use threadweave_api::*;
}

pub mod prelude {
    pub use crate::OrderExt;
}
