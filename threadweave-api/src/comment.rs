use std::fmt;

use crate::{Connection, Error, Time};

macro_rules! string_id {
    ($name:ident) => {
        #[derive(
            Clone,
            Debug,
            Eq,
            Hash,
            Ord,
            PartialEq,
            PartialOrd,
            serde::Deserialize,
            serde::Serialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> $name {
                $name(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> $name {
                $name(String::from(id))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(CommentId);
string_id!(PostId);
string_id!(UserId);

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VoteType {
    Upvote,
    Downvote,
}

impl VoteType {
    /// Vote the user ends up with after clicking `clicked`: clicking the vote
    /// that is already cast removes it
    pub fn toggle(current: Option<VoteType>, clicked: VoteType) -> Option<VoteType> {
        match current {
            Some(c) if c == clicked => None,
            _ => Some(clicked),
        }
    }

    pub fn weight(self) -> i64 {
        match self {
            VoteType::Upvote => 1,
            VoteType::Downvote => -1,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommentOrder {
    Newest,
    Oldest,
    Top,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ParentRef {
    pub id: CommentId,
}

/// A comment as returned by the GraphQL API, with a bounded number of levels
/// of replies embedded
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub content: String,
    pub author: Author,
    #[serde(default)]
    pub parent: Option<ParentRef>,

    /// Server-computed depth, only ever used as a hint
    #[serde(default)]
    pub depth: Option<u32>,

    #[serde(default)]
    pub vote_count: i64,
    #[serde(default)]
    pub user_vote: Option<VoteType>,
    #[serde(default)]
    pub is_edited: bool,
    pub created_at: Time,
    #[serde(default)]
    pub updated_at: Option<Time>,

    /// First page of replies, absent past the embedding depth of the query
    #[serde(default)]
    pub replies: Option<Connection<Comment>>,
}

impl Comment {
    pub fn parent_id(&self) -> Option<&CommentId> {
        self.parent.as_ref().map(|p| &p.id)
    }

    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.content)
    }
}

/// Response to a vote or remove-vote mutation
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VotePayload {
    pub success: bool,
    pub vote_count: i64,
    #[serde(default)]
    pub user_vote: Option<VoteType>,
}
