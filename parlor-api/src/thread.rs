use crate::{Author, Comment};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct ThreadId(pub i64);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Thread {
    pub id: ThreadId,
    pub title: String,
    pub content: String,
    pub author: Author,

    /// Root-level comments, each carrying its nested replies
    pub comments: Vec<Comment>,
}
