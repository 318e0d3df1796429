use crate::{ThreadId, Time, UserId};

/// Comment identity
///
/// Negative ids are temporary: they are handed out client-side to optimistic comments and
/// never collide with the positive ids the backend assigns on commit.
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub i64);

impl CommentId {
    pub fn is_temporary(&self) -> bool {
        self.0 < 0
    }
}

/// Denormalized projection of a comment's author
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Author {
    pub id: UserId,
    pub username: String,
    pub avatar: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum CommentSync {
    /// Inserted optimistically, the backend write has not resolved yet
    Pending,

    #[default]
    Committed,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub content: String,
    pub created_at: Time,

    /// Soft-delete flag, deleted comments stay in the tree so their replies remain reachable
    pub deleted: bool,

    pub parent_id: Option<CommentId>,
    pub author: Author,

    /// Child comments, empty when there are no replies yet
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<Comment>,

    #[serde(default)]
    pub sync: CommentSync,
}

impl Comment {
    pub fn is_pending(&self) -> bool {
        self.sync == CommentSync::Pending
    }
}

/// Write request sent to the backend for a new comment
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub thread: ThreadId,
    pub author: UserId,
    pub content: String,
    pub parent_id: Option<CommentId>,
}
