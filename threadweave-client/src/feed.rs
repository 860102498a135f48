use crate::{
    api::{PushEvent, VoteUpdated},
    CommentNode, CommentTree, Outcome,
};

impl CommentTree {
    /// Applies one push event to the tree
    ///
    /// Events about another post than the one the tree is bound to, and
    /// events that carry no comment change, are ignored.
    pub fn apply_event(&mut self, evt: PushEvent) -> Outcome {
        if let (Some(bound), Some(post)) = (&self.config().post_id, evt.post_id()) {
            if bound != post {
                tracing::trace!(%post, "ignoring event for another post");
                return Outcome::Ignored;
            }
        }
        match evt {
            PushEvent::Connected { post_id } => {
                tracing::debug!(?post_id, "push feed connected");
                Outcome::Ignored
            }
            PushEvent::CommentAdded(c) => self.insert(CommentNode::from(c)),
            PushEvent::CommentDeleted(c) => self.remove(&c.id),
            PushEvent::VoteUpdated(v) => self.apply_vote_event(&v),
        }
    }

    /// Decodes and applies the `data:` payload of one server-sent event
    ///
    /// Payloads that do not decode are logged and dropped.
    pub fn apply_payload(&mut self, payload: &str) -> Outcome {
        match PushEvent::parse(payload) {
            Ok(Some(evt)) => self.apply_event(evt),
            Ok(None) => Outcome::Ignored,
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable push event");
                Outcome::Ignored
            }
        }
    }

    fn apply_vote_event(&mut self, v: &VoteUpdated) -> Outcome {
        // The broadcast's userVote is the voter's, not the viewer's
        match v.comment_id() {
            Some(id) => self.apply_vote_count(&id, v.vote_count),
            None => Outcome::Ignored,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        api::{
            CommentAdded, CommentDeleted, CommentId, EventAuthor, PostId, PushEvent,
            TargetType, UserId, VoteType, VoteUpdated,
        },
        tree::tests::{comment, with_replies},
        CommentTree, Outcome, TreeConfig,
    };
    use chrono::{TimeZone, Utc};

    fn tree() -> CommentTree {
        let mut tree = CommentTree::new(TreeConfig::for_post(PostId::from("p1")));
        tree.seed(vec![with_replies(
            comment("A", None),
            vec![comment("A1", Some("A")), comment("A2", Some("A"))],
        )]);
        tree
    }

    fn added(id: &str, parent: Option<&str>, post: &str) -> PushEvent {
        PushEvent::CommentAdded(CommentAdded {
            id: CommentId::from(id),
            content: String::from("hello"),
            author: EventAuthor {
                id: UserId::from("u2"),
                username: String::from("bob"),
                avatar_url: None,
            },
            post_id: PostId::from(post),
            parent_id: parent.map(CommentId::from),
            depth: Some(42),
            created_at: Utc.timestamp_opt(1_700_000_100, 0).unwrap(),
        })
    }

    fn vote(target: &str, target_type: TargetType, count: i64) -> PushEvent {
        PushEvent::VoteUpdated(VoteUpdated {
            target_id: String::from(target),
            target_type,
            vote_count: count,
            user_vote: Some(VoteType::Downvote),
        })
    }

    #[test]
    fn applies_comment_events() {
        let mut tree = tree();
        assert_eq!(tree.apply_event(added("A3", Some("A"), "p1")), Outcome::Applied);
        assert_eq!(tree.apply_event(added("A3", Some("A"), "p1")), Outcome::Duplicate);
        assert_eq!(tree.find(&CommentId::from("A3")).unwrap().depth, 1);
        assert_eq!(tree.total_count(), 4);

        let deleted = PushEvent::CommentDeleted(CommentDeleted {
            id: CommentId::from("A2"),
            post_id: PostId::from("p1"),
            parent_id: Some(CommentId::from("A")),
        });
        assert_eq!(tree.apply_event(deleted.clone()), Outcome::Applied);
        assert_eq!(tree.apply_event(deleted), Outcome::NotFound);
        assert_eq!(tree.total_count(), 3);
    }

    #[test]
    fn other_posts_are_ignored() {
        let mut tree = tree();
        assert_eq!(tree.apply_event(added("X", None, "p2")), Outcome::Ignored);
        assert!(!tree.contains(&CommentId::from("X")));
        assert_eq!(
            tree.apply_event(PushEvent::Connected {
                post_id: Some(PostId::from("p1"))
            }),
            Outcome::Ignored
        );
    }

    #[test]
    fn vote_broadcasts_only_set_the_count() {
        let mut tree = tree();
        tree.update_vote(&CommentId::from("A1"), Some(VoteType::Upvote), Some(10));
        assert_eq!(
            tree.apply_event(vote("A1", TargetType::Comment, 10)),
            Outcome::Applied
        );
        let a1 = tree.find(&CommentId::from("A1")).unwrap();
        assert_eq!(a1.vote_count, 10);
        assert_eq!(a1.user_vote, Some(VoteType::Upvote));

        assert_eq!(
            tree.apply_event(vote("A1", TargetType::Post, 99)),
            Outcome::Ignored
        );
        assert_eq!(tree.find(&CommentId::from("A1")).unwrap().vote_count, 10);
    }

    #[test]
    fn payloads_are_decoded_or_dropped() {
        let mut tree = tree();
        assert_eq!(tree.apply_payload(": ping"), Outcome::Ignored);
        assert_eq!(tree.apply_payload("{garbage"), Outcome::Ignored);
        assert_eq!(
            tree.apply_payload(r#"{"type":"somethingNew","data":{}}"#),
            Outcome::Ignored
        );
        assert_eq!(
            tree.apply_payload(
                r#"{"type":"voteUpdated","data":{"targetId":"A2","targetType":"comment","voteCount":-3}}"#
            ),
            Outcome::Applied
        );
        assert_eq!(tree.find(&CommentId::from("A2")).unwrap().vote_count, -3);
        assert!(tree.check_invariants().is_empty());
    }
}
