use crate::{Comment, ThreadId};

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub enum FeedMessage {
    Pong,
    NewComment { thread: ThreadId, comment: Comment },
}
