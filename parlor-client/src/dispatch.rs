use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::{
    api::{Comment, Notification, NotificationGateway, NotificationKind, UserId},
    state::ThreadState,
    DispatchError,
};

/// Works out who should hear about `committed`, `Ok(None)` when that is its own author
///
/// Root comments notify the thread author, replies at any depth notify the author of the
/// immediate parent.
pub fn notification_for(
    state: &ThreadState,
    committed: &Comment,
) -> Result<Option<Notification>, DispatchError> {
    let (recipient, kind) = match committed.parent_id {
        None => (state.thread_author(), NotificationKind::Comment),
        Some(parent) => {
            let parent = state
                .tree()
                .get(parent)
                .ok_or(DispatchError::UnknownParent(parent))?;
            (parent.author.id, NotificationKind::Reply)
        }
    };
    let sender: UserId = committed.author.id;
    if recipient == sender {
        return Ok(None);
    }
    Ok(Some(Notification {
        recipient,
        sender,
        thread: state.thread(),
        comment: committed.id,
        kind,
    }))
}

/// Fires notifications on background tasks, detached from the submission result
pub struct Dispatcher {
    gateway: Arc<dyn NotificationGateway>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(gateway: Arc<dyn NotificationGateway>) -> Dispatcher {
        Dispatcher {
            gateway,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn dispatch(&self, n: Notification) {
        let gateway = self.gateway.clone();
        let task = tokio::spawn(async move {
            let comment = n.comment;
            match gateway.create_notification(n).await {
                Ok(()) => tracing::debug!(?comment, "notification sent"),
                Err(err) => {
                    let err = DispatchError::Gateway(err);
                    tracing::warn!(?comment, %err, "failed sending notification");
                }
            }
        });
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    /// Waits for every notification fired so far
    pub async fn settle(&self) {
        loop {
            let tasks = std::mem::take(&mut *self.tasks.lock());
            if tasks.is_empty() {
                return;
            }
            for t in tasks {
                if let Err(err) = t.await {
                    tracing::error!(?err, "notification task panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{CommentId, Thread, ThreadId},
        tree::tests::{author, chain, comment},
    };

    fn state() -> ThreadState {
        // chain() comments are all written by alice
        let thread = Thread {
            id: ThreadId(3),
            title: String::new(),
            content: String::new(),
            author: author("op"),
            comments: chain().to_forest(),
        };
        ThreadState::new(&thread, 8).unwrap()
    }

    #[test]
    fn root_comment_notifies_thread_author() {
        let s = state();
        let mut c = comment(90, None, 9);
        c.author = author("bob");
        let n = notification_for(&s, &c).unwrap().unwrap();
        assert_eq!(n.recipient, author("op").id);
        assert_eq!(n.sender, author("bob").id);
        assert_eq!(n.thread, ThreadId(3));
        assert_eq!(n.comment, CommentId(90));
        assert_eq!(n.kind, NotificationKind::Comment);
    }

    #[test]
    fn nested_reply_notifies_immediate_parent_author() {
        let mut s = state();
        let mut other = comment(71, Some(61), 5);
        other.author = author("carol");
        s.merge_remote(other).unwrap();

        let mut c = comment(90, Some(71), 9);
        c.author = author("bob");
        let n = notification_for(&s, &c).unwrap().unwrap();
        assert_eq!(n.recipient, author("carol").id);
        assert_eq!(n.kind, NotificationKind::Reply);
    }

    #[test]
    fn no_self_notification() {
        let s = state();
        // alice replying to alice
        let c = comment(90, Some(70), 9);
        assert!(notification_for(&s, &c).unwrap().is_none());

        let mut c = comment(91, None, 9);
        c.author = author("op");
        assert!(notification_for(&s, &c).unwrap().is_none());
    }

    #[test]
    fn unknown_parent_is_reported() {
        let s = state();
        let c = comment(90, Some(404), 9);
        assert!(matches!(
            notification_for(&s, &c),
            Err(DispatchError::UnknownParent(CommentId(404))),
        ));
    }
}
