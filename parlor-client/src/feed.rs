use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    api::{CommentFeed, FeedMessage, ThreadId},
    state::{Applied, ThreadState},
    ThreadSync,
};

/// Live subscription folding remote comments into a thread's tree
///
/// Dropping the handle unsubscribes too, `stop` additionally waits for the merge task to end.
pub struct FeedHandle {
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl FeedHandle {
    pub async fn stop(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Err(err) = (&mut self.task).await {
            tracing::error!(?err, "comment feed task panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

pub struct RealtimeMerge;

impl RealtimeMerge {
    pub async fn start(
        sync: &ThreadSync,
        feed: Arc<dyn CommentFeed>,
    ) -> anyhow::Result<FeedHandle> {
        let state = sync.shared_state();
        let thread = state.lock().thread();
        let receiver = feed
            .subscribe(thread)
            .await
            .with_context(|| format!("subscribing to comments of thread {thread:?}"))?;
        tracing::info!(?thread, "subscribed to comment feed");
        let (cancel, cancellation) = oneshot::channel();
        let task = tokio::spawn(run(thread, state, receiver, cancellation));
        Ok(FeedHandle {
            cancel: Some(cancel),
            task,
        })
    }
}

async fn run(
    thread: ThreadId,
    state: Arc<Mutex<ThreadState>>,
    mut receiver: mpsc::UnboundedReceiver<FeedMessage>,
    mut cancellation: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut cancellation => {
                tracing::info!(?thread, "unsubscribed from comment feed");
                return;
            }
            msg = receiver.recv() => match msg {
                None => {
                    tracing::warn!(?thread, "comment feed closed by the backend");
                    return;
                }
                Some(FeedMessage::Pong) => (),
                Some(FeedMessage::NewComment { thread: t, comment }) if t != thread => {
                    tracing::trace!(
                        thread = ?t,
                        id = ?comment.id,
                        "ignoring comment of another thread",
                    );
                }
                Some(FeedMessage::NewComment { comment, .. }) => {
                    let id = comment.id;
                    let merged = state.lock().merge_remote(comment);
                    match merged {
                        Ok(Applied::Ignored) => tracing::trace!(?id, "feed echoed a known comment"),
                        Ok(_) => tracing::debug!(?id, "merged comment from feed"),
                        Err(err) => tracing::warn!(?id, %err, "failed merging comment from feed"),
                    }
                }
            },
        }
    }
}
