use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{Comment, FeedMessage, Identity, NewComment, Notification, ThreadId};

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Writes the comment and returns the committed record, author projection included
    async fn create_comment(&self, c: NewComment) -> anyhow::Result<Comment>;
}

#[async_trait]
pub trait AccountProvisioner: Send + Sync {
    async fn ensure_account_exists(&self, who: &Identity) -> anyhow::Result<()>;
}

#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn create_notification(&self, n: Notification) -> anyhow::Result<()>;
}

#[async_trait]
pub trait CommentFeed: Send + Sync {
    /// Opens a push channel of comments inserted into `thread`, closing the receiver unsubscribes
    async fn subscribe(&self, thread: ThreadId)
        -> anyhow::Result<mpsc::UnboundedReceiver<FeedMessage>>;
}
