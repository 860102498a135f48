#![cfg(test)]

use std::{cmp, collections::BTreeMap, ops::RangeTo, panic::AssertUnwindSafe};

use threadweave_mock_server::{MockServer, Shape};
use tokio::sync::mpsc;

use crate::{
    api::{CommentId, Connection, Cursor, Edge, PageInfo, PostId, PushEvent, UserId, VoteType},
    sync,
    tree::tests::comment,
    walk, CommentNode, CommentTree, TreeConfig,
};

macro_rules! do_tokio_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            if std::env::var("RUST_LOG").is_ok() {
                let _ = tracing_subscriber::fmt::try_init();
            }
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_type::<$typ>()
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

fn resize_int(fuzz_id: usize, RangeTo { end }: RangeTo<usize>) -> Option<usize> {
    if end == 0 {
        return None;
    }
    let bucket_size = cmp::max(1, usize::MAX / end); // in case we rounded to 0
    let id = fuzz_id / bucket_size;
    Some(cmp::min(id, end - 1)) // in case id was actually over end - 1 due to rounding
}

fn user(u: u8) -> UserId {
    UserId::new(format!("u{}", u % 4))
}

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum FuzzOp {
    AddRoot { author: u8 },
    Reply { parent: usize, author: u8 },
    Delete { target: usize },
    Vote { target: usize, user: u8, up: bool },
    Unvote { target: usize, user: u8 },
}

struct ComparativeFuzzer {
    mock: MockServer,
    tree: CommentTree,
    feed: mpsc::UnboundedReceiver<PushEvent>,
    live: bool,
}

impl ComparativeFuzzer {
    fn new() -> ComparativeFuzzer {
        let post = PostId::from("post");
        let mut mock = MockServer::new(post.clone())
            .with_embedding(2, 2)
            .with_viewer(user(0));
        let feed = mock.subscribe();
        let tree = CommentTree::new(TreeConfig {
            roots_page_size: 3,
            replies_page_size: 2,
            ..TreeConfig::for_post(post)
        });
        ComparativeFuzzer {
            mock,
            tree,
            feed,
            live: false,
        }
    }

    fn target(&self, idx: usize) -> Option<CommentId> {
        resize_int(idx, ..self.mock.test_num_comments())
            .and_then(|i| self.mock.test_get_comment_id(i))
            .cloned()
    }

    /// Runs `op` on the server and, once the tree is loaded, mirrors the
    /// responses into the tree the way a client submitting it would
    fn execute_fuzz_op(&mut self, op: FuzzOp) {
        match op {
            FuzzOp::AddRoot { author } => {
                let c = self
                    .mock
                    .add_comment(MockServer::new_comment_id(), user(author), None, String::new())
                    .expect("adding root comment");
                if self.live {
                    self.tree.insert(CommentNode::from(c));
                }
            }
            FuzzOp::Reply { parent, author } => match self.target(parent) {
                None => self.execute_fuzz_op(FuzzOp::AddRoot { author }),
                Some(parent) => {
                    let c = self
                        .mock
                        .add_comment(
                            MockServer::new_comment_id(),
                            user(author),
                            Some(parent),
                            String::from("reply"),
                        )
                        .expect("adding reply");
                    if self.live {
                        self.tree.insert(CommentNode::from(c));
                    }
                }
            },
            FuzzOp::Delete { target } => {
                if let Some(id) = self.target(target) {
                    self.mock.delete_comment(&id).expect("deleting comment");
                    if self.live {
                        self.tree.remove(&id);
                    }
                }
            }
            FuzzOp::Vote { target, user: u, up } => {
                let vote = if up {
                    VoteType::Upvote
                } else {
                    VoteType::Downvote
                };
                self.vote(target, u, Some(vote));
            }
            FuzzOp::Unvote { target, user: u } => self.vote(target, u, None),
        }
        if self.live {
            self.drain_feed();
        }
    }

    fn vote(&mut self, target: usize, u: u8, vote: Option<VoteType>) {
        let Some(id) = self.target(target) else {
            return;
        };
        let res = self.mock.vote(user(u), &id, vote).expect("voting");
        if self.live && user(u) == user(0) {
            self.tree
                .update_vote(&id, res.user_vote, Some(res.vote_count));
        }
    }

    fn drain_feed(&mut self) {
        while let Ok(evt) = self.feed.try_recv() {
            self.tree.apply_event(evt);
        }
    }

    async fn load(&mut self) {
        let post = self.mock.post().clone();
        sync::fetch_initial(&mut self.tree, &mut self.mock, &post)
            .await
            .expect("fetching first page");
        sync::fetch_everything(&mut self.tree, &mut self.mock)
            .await
            .expect("fetching all pages");
        self.live = true;
        // everything that happened before the fetch gets replayed on top of it
        self.drain_feed();
    }

    fn check(&self) {
        assert_eq!(self.tree.check_invariants(), Vec::new());
        assert!(self.tree.orphans().is_empty(), "orphans left: {:?}", self.tree.orphans());
        assert_eq!(shape_of(&self.tree), self.mock.shape());
        let votes = walk::preorder(self.tree.roots())
            .filter_map(|n| n.user_vote.map(|v| (n.id.clone(), v)))
            .collect::<BTreeMap<_, _>>();
        assert_eq!(votes, self.mock.viewer_votes());
    }
}

fn shape_of(tree: &CommentTree) -> BTreeMap<CommentId, Shape> {
    walk::preorder(tree.roots())
        .map(|n| {
            (
                n.id.clone(),
                Shape {
                    parent: n.parent_id.clone(),
                    depth: n.depth,
                    vote_count: n.vote_count,
                },
            )
        })
        .collect()
}

do_tokio_test!(
    compare_with_mock,
    (Vec<FuzzOp>, Vec<FuzzOp>),
    |(before, after): (Vec<FuzzOp>, Vec<FuzzOp>)| async move {
        let mut fuzzer = ComparativeFuzzer::new();
        for op in before {
            fuzzer.execute_fuzz_op(op);
        }
        fuzzer.load().await;
        fuzzer.check();
        for op in after {
            fuzzer.execute_fuzz_op(op);
        }
        fuzzer.check();
    }
);

#[test]
fn reordered_additions_converge() {
    bolero::check!()
        .with_type::<(Vec<(usize, u8)>, Vec<u16>)>()
        .cloned()
        .for_each(|(replies, keys)| {
            let mut mock = MockServer::new(PostId::from("post"));
            let mut feed = mock.subscribe();
            for (parent, author) in replies {
                let parent = resize_int(parent, ..mock.test_num_comments() + 1)
                    .and_then(|i| mock.test_get_comment_id(i))
                    .cloned();
                mock.add_comment(MockServer::new_comment_id(), user(author), parent, String::new())
                    .expect("adding comment");
            }
            let mut events = Vec::new();
            while let Ok(evt) = feed.try_recv() {
                events.push(evt);
            }
            let mut keyed = events
                .into_iter()
                .enumerate()
                .map(|(i, e)| (keys.get(i).copied().unwrap_or(0), e))
                .collect::<Vec<_>>();
            keyed.sort_by_key(|(k, _)| *k);

            let mut tree = CommentTree::new(TreeConfig::default());
            for (_, evt) in keyed {
                tree.apply_event(evt.clone());
                tree.apply_event(evt);
                assert_eq!(tree.check_invariants(), Vec::new());
            }
            assert!(tree.orphans().is_empty());
            assert_eq!(shape_of(&tree), mock.shape());
        })
}

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum TreeOp {
    Insert { id: u8, parent: Option<u8> },
    Remove { id: u8 },
    Vote { id: u8, count: i8 },
    LoadPage { parent: Option<u8>, ids: Vec<u8>, more: bool },
}

fn small_id(id: u8) -> String {
    format!("c{}", id % 24)
}

#[test]
fn invariants_hold_under_any_sequence() {
    bolero::check!()
        .with_type::<Vec<TreeOp>>()
        .cloned()
        .for_each(|ops| {
            let mut tree = CommentTree::new(TreeConfig::default());
            for op in ops {
                match op {
                    TreeOp::Insert { id, parent } => {
                        let parent = parent.map(small_id);
                        tree.insert(comment(&small_id(id), parent.as_deref()));
                    }
                    TreeOp::Remove { id } => {
                        tree.remove(&CommentId::new(small_id(id)));
                    }
                    TreeOp::Vote { id, count } => {
                        tree.apply_vote_count(&CommentId::new(small_id(id)), i64::from(count));
                    }
                    TreeOp::LoadPage { parent, ids, more } => {
                        let page = Connection {
                            edges: ids
                                .iter()
                                .map(|id| Edge {
                                    node: comment(&small_id(*id), None),
                                    cursor: Cursor(small_id(*id)),
                                })
                                .collect(),
                            page_info: PageInfo {
                                has_next_page: more,
                                end_cursor: ids.last().map(|id| Cursor(small_id(*id))),
                                ..PageInfo::default()
                            },
                            total_count: None,
                        };
                        match parent.map(|p| CommentId::new(small_id(p))) {
                            None => {
                                tree.load_more_roots(page);
                            }
                            Some(p) => {
                                let before = tree.find(&p).map(|n| n.replies.clone());
                                tree.load_more_replies(&p, page);
                                if let (Some(before), Some(after)) = (before, tree.find(&p)) {
                                    assert!(after.replies.loaded_count >= before.loaded_count);
                                    assert!(after.replies.exhausted || !before.exhausted);
                                }
                            }
                        }
                    }
                }
                assert_eq!(tree.check_invariants(), Vec::new());
                for o in tree.orphans().nodes() {
                    assert!(!tree.contains(&o.id), "{} is both buffered and in the tree", o.id);
                }
            }
        })
}
