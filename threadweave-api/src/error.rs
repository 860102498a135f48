use crate::CommentId;

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Comment not found {0}")]
    CommentNotFound(CommentId),

    #[error("Comment id already used {0}")]
    IdAlreadyUsed(CommentId),

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Malformed push event: {0}")]
    MalformedEvent(String),

    #[error("Unknown push event kind {0:?}")]
    UnknownEventKind(String),

    #[error("Event stream reported an error: {0}")]
    StreamError(String),
}

impl Error {
    /// Whether this error may be the result of racing with a concurrent
    /// delete, in which case the push feed will eventually resync the state
    pub fn is_race(&self) -> bool {
        matches!(self, Error::CommentNotFound(_))
    }
}
