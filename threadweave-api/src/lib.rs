use chrono::Utc;

pub type Time = chrono::DateTime<Utc>;

mod comment;
pub use comment::{
    Author, Comment, CommentId, CommentOrder, ParentRef, PostId, UserId, VotePayload, VoteType,
};

mod error;
pub use error::Error;

mod event;
pub use event::{
    CommentAdded, CommentDeleted, EventAuthor, PushEvent, TargetType, VoteUpdated,
};

mod page;
pub use page::{Connection, Cursor, Edge, PageInfo};

mod source;
pub use source::ThreadSource;

/// Comment bodies holding null bytes are refused when submitted or edited
pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(String::from(s)));
    }
    Ok(())
}
