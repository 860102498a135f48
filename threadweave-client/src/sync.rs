//! Drives a [`CommentTree`] from a [`ThreadSource`]
//!
//! The tree itself never talks to the network. These helpers fetch pages the
//! way the UI would, going through the same request tokens, so that a page
//! racing with push events or with a removal is handled by the tree.

use anyhow::Context;

use crate::{
    api::{self, PostId, ThreadSource},
    walk, CommentNode, CommentTree, Outcome, PageTarget,
};

/// Seeds `tree` with the first page of root comments of `post`
pub async fn fetch_initial<S>(tree: &mut CommentTree, source: &mut S, post: &PostId) -> anyhow::Result<()>
where
    S: ThreadSource + Send,
{
    let page = source
        .fetch_comments(post, tree.config().roots_page_size, None)
        .await
        .with_context(|| format!("fetching root comments of post {post}"))?;
    tracing::debug!(%post, num_roots = page.edges.len(), "seeding comment tree");
    tree.seed_connection(page.map(CommentNode::from));
    Ok(())
}

/// Fetches and applies the next page of `target`
///
/// Returns `Ignored` when there is nothing to fetch for it right now. A fetch
/// that fails because the comment went away meanwhile is not an error, the
/// push feed will be carrying its removal.
pub async fn fetch_more<S>(
    tree: &mut CommentTree,
    source: &mut S,
    target: PageTarget,
) -> anyhow::Result<Outcome>
where
    S: ThreadSource + Send,
{
    let Some(req) = tree.begin_load_more(target) else {
        return Ok(Outcome::Ignored);
    };
    let res = match &req.target {
        PageTarget::Roots => match tree.config().post_id.clone() {
            Some(post) => source
                .fetch_comments(&post, tree.config().roots_page_size, req.after.clone())
                .await
                .with_context(|| format!("fetching more root comments of post {post}")),
            None => Err(anyhow::anyhow!("comment tree is not bound to a post")),
        },
        PageTarget::Replies(id) => source
            .fetch_replies(id, tree.config().replies_page_size, req.after.clone())
            .await
            .with_context(|| format!("fetching more replies to comment {id}")),
    };
    match res {
        Ok(page) => Ok(tree.complete_load_more(req, page.map(CommentNode::from))),
        Err(e) => {
            tree.cancel_load_more(&req.target);
            if e.downcast_ref::<api::Error>().map_or(false, api::Error::is_race) {
                tracing::debug!(page = ?req.target, error = ?e, "page target vanished while fetching");
                return Ok(Outcome::NotFound);
            }
            Err(e)
        }
    }
}

/// Every target that still has pages left to fetch
pub fn pending_pages(tree: &CommentTree) -> Vec<PageTarget> {
    let mut res = Vec::new();
    if !tree.roots_page().exhausted {
        res.push(PageTarget::Roots);
    }
    res.extend(
        walk::preorder(tree.roots())
            .filter(|n| !n.replies.exhausted)
            .map(|n| PageTarget::Replies(n.id.clone())),
    );
    res.retain(|t| !tree.is_loading(t));
    res
}

/// Fetches pages until every comment of the thread is loaded
pub async fn fetch_everything<S>(tree: &mut CommentTree, source: &mut S) -> anyhow::Result<()>
where
    S: ThreadSource + Send,
{
    loop {
        let pending = pending_pages(tree);
        if pending.is_empty() {
            return Ok(());
        }
        let mut progressed = false;
        for target in pending {
            if fetch_more(tree, source, target).await? == Outcome::Applied {
                progressed = true;
            }
        }
        if !progressed {
            tracing::warn!("some pages could not be loaded, giving up");
            return Ok(());
        }
    }
}
