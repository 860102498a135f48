use crate::api::PostId;

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Post the tree is bound to; push events about other posts are ignored.
    /// `None` accepts everything.
    pub post_id: Option<PostId>,

    /// Comments at this depth or deeper no longer offer to be replied to
    pub max_reply_depth: u32,

    pub roots_page_size: usize,
    pub replies_page_size: usize,
}

impl Default for TreeConfig {
    fn default() -> TreeConfig {
        TreeConfig {
            post_id: None,
            max_reply_depth: 5,
            roots_page_size: 50,
            replies_page_size: 10,
        }
    }
}

impl TreeConfig {
    pub fn for_post(post_id: PostId) -> TreeConfig {
        TreeConfig {
            post_id: Some(post_id),
            ..TreeConfig::default()
        }
    }
}
