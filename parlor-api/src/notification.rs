use crate::{CommentId, ThreadId, UserId};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// Someone commented on a thread the recipient started
    Comment,

    /// Someone replied to a comment the recipient wrote
    Reply,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Notification {
    pub recipient: UserId,
    pub sender: UserId,
    pub thread: ThreadId,
    pub comment: CommentId,
    pub kind: NotificationKind,
}
