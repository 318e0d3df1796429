use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{anyhow, Context};
use chrono::Utc;
use parking_lot::Mutex;

use crate::{
    api::{
        AccountProvisioner, Comment, CommentId, Identity, NewComment, NotificationGateway,
        PersistenceGateway, Thread,
    },
    dispatch::{self, Dispatcher},
    state::{Applied, JournalEntry, SyncState, ThreadState, Ticket},
    tree::{Tree, TreeError},
    SubmitError, SyncConfig,
};

/// External collaborators the controller writes through
#[derive(Clone)]
pub struct Gateways {
    pub persistence: Arc<dyn PersistenceGateway>,
    pub accounts: Arc<dyn AccountProvisioner>,
    pub notifications: Arc<dyn NotificationGateway>,
}

impl Gateways {
    pub fn from_backend<B>(backend: Arc<B>) -> Gateways
    where
        B: 'static + PersistenceGateway + AccountProvisioner + NotificationGateway,
    {
        Gateways {
            persistence: backend.clone(),
            accounts: backend.clone(),
            notifications: backend,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Submitted {
    /// The comment is committed and in the tree under its backend id
    Committed(Comment),

    /// Another submission was pending, nothing happened
    Busy,

    /// The submission was abandoned before its response came back
    Abandoned,
}

impl Submitted {
    pub fn is_committed(&self) -> bool {
        matches!(self, Submitted::Committed(_))
    }
}

struct Inner {
    identity: Identity,
    config: SyncConfig,
    state: Arc<Mutex<ThreadState>>,
    gateways: Gateways,
    dispatcher: Dispatcher,
    account_ready: AtomicBool,
}

/// Optimistic comment submission for one thread, on behalf of one user
///
/// At most one submission is in flight at any time: submitting while another one is pending
/// returns [`Submitted::Busy`] without effect.
#[derive(Clone)]
pub struct ThreadSync(Arc<Inner>);

impl ThreadSync {
    pub fn new(
        thread: &Thread,
        identity: Identity,
        config: SyncConfig,
        gateways: Gateways,
    ) -> Result<ThreadSync, TreeError> {
        let state = ThreadState::new(thread, config.journal_capacity)?;
        Ok(ThreadSync(Arc::new(Inner {
            identity,
            config,
            state: Arc::new(Mutex::new(state)),
            dispatcher: Dispatcher::new(gateways.notifications.clone()),
            gateways,
            account_ready: AtomicBool::new(false),
        })))
    }

    pub fn identity(&self) -> &Identity {
        &self.0.identity
    }

    pub(crate) fn shared_state(&self) -> Arc<Mutex<ThreadState>> {
        self.0.state.clone()
    }

    pub fn sync_state(&self) -> SyncState {
        self.0.state.lock().sync()
    }

    pub fn snapshot(&self) -> Tree {
        self.0.state.lock().tree().clone()
    }

    pub fn with_tree<R>(&self, f: impl FnOnce(&Tree) -> R) -> R {
        f(self.0.state.lock().tree())
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.0.state.lock().journal().copied().collect()
    }

    pub fn display_roots(&self) -> Vec<Comment> {
        self.0.state.lock().tree().display_roots()
    }

    pub fn display_replies(&self, id: CommentId) -> Result<Vec<Comment>, TreeError> {
        self.0.state.lock().tree().display_replies(id)
    }

    pub async fn submit_root_comment(&self, content: &str) -> Result<Submitted, SubmitError> {
        self.submit(None, content).await
    }

    pub async fn submit_reply(
        &self,
        parent: CommentId,
        content: &str,
    ) -> Result<Submitted, SubmitError> {
        self.submit(Some(parent), content).await
    }

    /// Same state machine as [`ThreadSync::submit_reply`], `reply` may be at any depth
    pub async fn submit_nested_reply(
        &self,
        reply: CommentId,
        content: &str,
    ) -> Result<Submitted, SubmitError> {
        self.submit(Some(reply), content).await
    }

    /// Additive merge of a comment authored elsewhere
    pub fn merge_remote(&self, comment: Comment) -> Result<Applied, TreeError> {
        self.0.state.lock().merge_remote(comment)
    }

    /// Rolls back the pending submission, if any; its response will be ignored when it arrives
    pub fn abandon_pending(&self) -> Option<CommentId> {
        match self.0.state.lock().abandon() {
            Ok(res) => res,
            Err(err) => {
                tracing::error!(%err, "failed rolling back abandoned submission");
                None
            }
        }
    }

    /// Waits for all the notifications fired so far
    pub async fn settle(&self) {
        self.0.dispatcher.settle().await
    }

    async fn submit(
        &self,
        parent: Option<CommentId>,
        content: &str,
    ) -> Result<Submitted, SubmitError> {
        let ticket = {
            let mut state = self.0.state.lock();
            if !state.sync().is_idle() {
                tracing::debug!(?parent, "submission already pending, ignoring");
                return Ok(Submitted::Busy);
            }
            crate::api::validate_content(content, self.0.config.max_content_len)?;
            let begun = state.begin(
                parent,
                String::from(content.trim()),
                self.0.identity.author(),
                Utc::now(),
            );
            match begun {
                Ok(Some(ticket)) => ticket,
                Ok(None) => return Ok(Submitted::Busy),
                Err(TreeError::UnknownParent(p)) => return Err(SubmitError::UnknownParent(p)),
                Err(err) => return Err(SubmitError::Persistence(err.into())),
            }
        };
        tracing::debug!(?ticket, "optimistic comment inserted");

        if let Err(err) = self.ensure_account().await {
            tracing::warn!(?ticket, ?err, "account provisioning failed");
            return match self.roll_back(&ticket) {
                Some(abandoned) => Ok(abandoned),
                None => Err(SubmitError::Provisioning(err)),
            };
        }

        let request = NewComment {
            thread: self.0.state.lock().thread(),
            author: self.0.identity.id,
            content: String::from(content.trim()),
            parent_id: parent,
        };
        match self.write(request).await {
            Ok(committed) => self.on_committed(&ticket, committed),
            Err(err) => {
                tracing::warn!(?ticket, ?err, "comment write failed");
                match self.roll_back(&ticket) {
                    Some(abandoned) => Ok(abandoned),
                    None => Err(SubmitError::Persistence(err)),
                }
            }
        }
    }

    async fn ensure_account(&self) -> anyhow::Result<()> {
        if self.0.account_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        self.0
            .gateways
            .accounts
            .ensure_account_exists(&self.0.identity)
            .await
            .with_context(|| format!("provisioning account of {:?}", self.0.identity.id))?;
        self.0.account_ready.store(true, Ordering::Release);
        Ok(())
    }

    async fn write(&self, request: NewComment) -> anyhow::Result<Comment> {
        let write = self.0.gateways.persistence.create_comment(request);
        let committed = match self.0.config.commit_timeout {
            None => write.await,
            Some(timeout) => match tokio::time::timeout(timeout, write).await {
                Ok(res) => res,
                Err(_) => Err(anyhow!("no answer from the backend after {timeout:?}")),
            },
        };
        committed.context("writing comment")
    }

    /// Rolls back the optimistic comment, `Some(Abandoned)` if the ticket was outdated
    fn roll_back(&self, ticket: &Ticket) -> Option<Submitted> {
        match self.0.state.lock().fail(ticket) {
            Ok(true) => None,
            Ok(false) => Some(Submitted::Abandoned),
            Err(err) => {
                tracing::error!(?ticket, %err, "failed rolling back optimistic comment");
                None
            }
        }
    }

    fn on_committed(
        &self,
        ticket: &Ticket,
        committed: Comment,
    ) -> Result<Submitted, SubmitError> {
        let notification = {
            let mut state = self.0.state.lock();
            match state.commit(ticket, committed.clone()) {
                Ok(Some(replaced)) => {
                    tracing::debug!(?ticket, id = ?committed.id, ?replaced, "comment committed")
                }
                Ok(None) => return Ok(Submitted::Abandoned),
                Err(err) => {
                    // the write went through, the feed will bring the comment in eventually
                    tracing::error!(?ticket, %err, "failed swapping in committed comment");
                }
            }
            dispatch::notification_for(&state, &committed)
        };
        match notification {
            Ok(Some(n)) => self.0.dispatcher.dispatch(n),
            Ok(None) => tracing::trace!(id = ?committed.id, "not notifying own comment"),
            Err(err) => tracing::warn!(id = ?committed.id, %err, "not sending notification"),
        }
        Ok(Submitted::Committed(committed))
    }
}
