use serde_json::json;

use crate::{CommentId, Error, PostId, Time, UserId, VoteType};

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAuthor {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentAdded {
    pub id: CommentId,
    pub content: String,
    pub author: EventAuthor,
    pub post_id: PostId,
    #[serde(default)]
    pub parent_id: Option<CommentId>,
    #[serde(default)]
    pub depth: Option<u32>,
    pub created_at: Time,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDeleted {
    pub id: CommentId,
    pub post_id: PostId,
    #[serde(default)]
    pub parent_id: Option<CommentId>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    #[serde(alias = "COMMENT")]
    Comment,
    #[serde(alias = "POST")]
    Post,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteUpdated {
    pub target_id: String,
    pub target_type: TargetType,
    pub vote_count: i64,

    /// Vote of whoever triggered the broadcast, which is not necessarily the
    /// viewing user
    #[serde(default)]
    pub user_vote: Option<VoteType>,
}

impl VoteUpdated {
    pub fn comment_id(&self) -> Option<CommentId> {
        match self.target_type {
            TargetType::Comment => Some(CommentId(self.target_id.clone())),
            TargetType::Post => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PushEvent {
    Connected { post_id: Option<PostId> },
    VoteUpdated(VoteUpdated),
    CommentAdded(CommentAdded),
    CommentDeleted(CommentDeleted),
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    post_id: Option<PostId>,
    #[serde(default)]
    error: Option<String>,
}

fn data_of<T: for<'de> serde::Deserialize<'de>>(
    kind: &str,
    data: Option<serde_json::Value>,
) -> Result<T, Error> {
    let data = data.ok_or_else(|| Error::MalformedEvent(format!("{kind} event without data")))?;
    serde_json::from_value(data).map_err(|e| Error::MalformedEvent(format!("{kind} event: {e}")))
}

impl PushEvent {
    /// Decodes the `data:` payload of one server-sent event
    ///
    /// Heartbeats and empty payloads decode to `Ok(None)`.
    pub fn parse(payload: &str) -> Result<Option<PushEvent>, Error> {
        let payload = payload.trim();
        if payload.is_empty() || payload.starts_with(':') {
            return Ok(None);
        }
        let Envelope {
            kind,
            data,
            post_id,
            error,
        } = serde_json::from_str(payload).map_err(|e| Error::MalformedEvent(e.to_string()))?;
        Ok(Some(match kind.as_str() {
            "connected" => PushEvent::Connected { post_id },
            "voteUpdated" => PushEvent::VoteUpdated(data_of(&kind, data)?),
            "commentAdded" => PushEvent::CommentAdded(data_of(&kind, data)?),
            "commentDeleted" => PushEvent::CommentDeleted(data_of(&kind, data)?),
            "error" => return Err(Error::StreamError(error.unwrap_or_default())),
            other => return Err(Error::UnknownEventKind(String::from(other))),
        }))
    }

    pub fn to_payload(&self) -> Result<String, Error> {
        let value = match self {
            PushEvent::Connected { post_id } => json!({
                "type": "connected",
                "postId": post_id,
            }),
            PushEvent::VoteUpdated(v) => json!({ "type": "voteUpdated", "data": v }),
            PushEvent::CommentAdded(c) => json!({ "type": "commentAdded", "data": c }),
            PushEvent::CommentDeleted(c) => json!({ "type": "commentDeleted", "data": c }),
        };
        serde_json::to_string(&value).map_err(|e| Error::Unknown(e.to_string()))
    }

    /// Post this event is about, if it carries one
    pub fn post_id(&self) -> Option<&PostId> {
        match self {
            PushEvent::Connected { post_id } => post_id.as_ref(),
            PushEvent::VoteUpdated(_) => None,
            PushEvent::CommentAdded(c) => Some(&c.post_id),
            PushEvent::CommentDeleted(c) => Some(&c.post_id),
        }
    }
}
