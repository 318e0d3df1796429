use std::collections::{hash_map, HashMap};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use parlor_api::{
    AccountProvisioner, Comment, CommentFeed, CommentId, CommentSync, FeedMessage, Identity,
    NewComment, Notification, NotificationGateway, PersistenceGateway, Thread, ThreadId, UserId,
};
use tokio::sync::{mpsc, watch};

/// In-memory backend standing in for the real data store
pub struct MockServer {
    db: Mutex<Db>,
    hold: watch::Sender<bool>,
}

struct Db {
    next_comment_id: i64,
    next_thread_id: i64,
    accounts: HashMap<UserId, Identity>,
    threads: HashMap<ThreadId, DbThread>,
    notifications: Vec<Notification>,
    feeds: HashMap<ThreadId, Vec<mpsc::UnboundedSender<FeedMessage>>>,
    provision_calls: usize,
    fail_next_commit: Option<String>,
    fail_provisioning: bool,
    fail_notifications: bool,
}

struct DbThread {
    thread: Thread,
    // flat, in insertion order
    comments: Vec<Comment>,
}

impl Db {
    fn relay(&mut self, thread: ThreadId, comment: &Comment) {
        if let Some(feeds) = self.feeds.get_mut(&thread) {
            feeds.retain(|f| {
                f.send(FeedMessage::NewComment {
                    thread,
                    comment: comment.clone(),
                })
                .is_ok()
            });
        }
    }

    fn insert(&mut self, c: NewComment) -> anyhow::Result<Comment> {
        let author = self
            .accounts
            .get(&c.author)
            .ok_or_else(|| anyhow!("author {:?} has no account", c.author))?
            .author();
        let thread = self
            .threads
            .get_mut(&c.thread)
            .ok_or_else(|| anyhow!("thread {:?} does not exist", c.thread))?;
        if let Some(parent) = c.parent_id {
            if !thread.comments.iter().any(|p| p.id == parent) {
                return Err(anyhow!("parent comment {parent:?} does not exist"));
            }
        }
        let comment = Comment {
            id: CommentId(self.next_comment_id),
            content: c.content,
            created_at: Utc::now(),
            deleted: false,
            parent_id: c.parent_id,
            author,
            replies: Vec::new(),
            sync: CommentSync::Committed,
        };
        self.next_comment_id += 1;
        thread.comments.push(comment.clone());
        self.relay(c.thread, &comment);
        Ok(comment)
    }
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer {
            db: Mutex::new(Db {
                next_comment_id: 1,
                next_thread_id: 1,
                accounts: HashMap::new(),
                threads: HashMap::new(),
                notifications: Vec::new(),
                feeds: HashMap::new(),
                provision_calls: 0,
                fail_next_commit: None,
                fail_provisioning: false,
                fail_notifications: false,
            }),
            hold: watch::channel(false).0,
        }
    }

    /// Id the next committed comment will get, ids keep increasing from there
    pub fn set_next_comment_id(&self, id: i64) {
        self.db.lock().next_comment_id = id;
    }

    /// Creates a thread started by `author`, whose account is created along the way
    pub fn create_thread(&self, author: &Identity, title: &str) -> Thread {
        let mut db = self.db.lock();
        db.accounts.insert(author.id, author.clone());
        let thread = Thread {
            id: ThreadId(db.next_thread_id),
            title: String::from(title),
            content: String::new(),
            author: author.author(),
            comments: Vec::new(),
        };
        db.next_thread_id += 1;
        db.threads.insert(
            thread.id,
            DbThread {
                thread: thread.clone(),
                comments: Vec::new(),
            },
        );
        thread
    }

    /// Comment written by someone else, relayed to the thread's subscribers
    pub fn post_as(
        &self,
        who: &Identity,
        thread: ThreadId,
        parent_id: Option<CommentId>,
        content: &str,
    ) -> anyhow::Result<Comment> {
        let mut db = self.db.lock();
        db.accounts.entry(who.id).or_insert_with(|| who.clone());
        db.insert(NewComment {
            thread,
            author: who.id,
            content: String::from(content),
            parent_id,
        })
    }

    /// Thread with its comments nested, as a fresh page load would see it
    pub fn fetch_thread(&self, thread: ThreadId) -> anyhow::Result<Thread> {
        let db = self.db.lock();
        let t = db
            .threads
            .get(&thread)
            .ok_or_else(|| anyhow!("thread {thread:?} does not exist"))?;
        let mut res = t.thread.clone();
        res.comments = nest(&t.comments, None);
        Ok(res)
    }

    pub fn comment_count(&self, thread: ThreadId) -> usize {
        self.db
            .lock()
            .threads
            .get(&thread)
            .map(|t| t.comments.len())
            .unwrap_or(0)
    }

    pub fn has_account(&self, user: UserId) -> bool {
        self.db.lock().accounts.contains_key(&user)
    }

    pub fn provision_calls(&self) -> usize {
        self.db.lock().provision_calls
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.db.lock().notifications.clone()
    }

    pub fn subscriber_count(&self, thread: ThreadId) -> usize {
        let mut db = self.db.lock();
        match db.feeds.get_mut(&thread) {
            None => 0,
            Some(feeds) => {
                feeds.retain(|f| !f.is_closed());
                feeds.len()
            }
        }
    }

    pub fn fail_next_commit(&self, reason: &str) {
        self.db.lock().fail_next_commit = Some(String::from(reason));
    }

    pub fn fail_provisioning(&self, fail: bool) {
        self.db.lock().fail_provisioning = fail;
    }

    pub fn fail_notifications(&self, fail: bool) {
        self.db.lock().fail_notifications = fail;
    }

    /// Comment writes wait until `release_commits` is called
    pub fn hold_commits(&self) {
        self.hold.send_replace(true);
    }

    pub fn release_commits(&self) {
        self.hold.send_replace(false);
    }

    async fn wait_for_release(&self) {
        let mut held = self.hold.subscribe();
        while *held.borrow_and_update() {
            if held.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}

fn nest(flat: &[Comment], parent: Option<CommentId>) -> Vec<Comment> {
    flat.iter()
        .filter(|c| c.parent_id == parent)
        .map(|c| {
            let mut c = c.clone();
            c.replies = nest(flat, Some(c.id));
            c
        })
        .collect()
}

#[async_trait]
impl PersistenceGateway for MockServer {
    async fn create_comment(&self, c: NewComment) -> anyhow::Result<Comment> {
        self.wait_for_release().await;
        let mut db = self.db.lock();
        if let Some(reason) = db.fail_next_commit.take() {
            return Err(anyhow!("{reason}"));
        }
        let thread = c.thread;
        db.insert(c)
            .with_context(|| format!("inserting comment into thread {thread:?}"))
    }
}

#[async_trait]
impl AccountProvisioner for MockServer {
    async fn ensure_account_exists(&self, who: &Identity) -> anyhow::Result<()> {
        let mut db = self.db.lock();
        db.provision_calls += 1;
        if db.fail_provisioning {
            return Err(anyhow!("account service unavailable"));
        }
        if let hash_map::Entry::Vacant(e) = db.accounts.entry(who.id) {
            e.insert(who.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationGateway for MockServer {
    async fn create_notification(&self, n: Notification) -> anyhow::Result<()> {
        let mut db = self.db.lock();
        if db.fail_notifications {
            return Err(anyhow!("notification store unavailable"));
        }
        db.notifications.push(n);
        Ok(())
    }
}

#[async_trait]
impl CommentFeed for MockServer {
    async fn subscribe(
        &self,
        thread: ThreadId,
    ) -> anyhow::Result<mpsc::UnboundedReceiver<FeedMessage>> {
        let mut db = self.db.lock();
        if !db.threads.contains_key(&thread) {
            return Err(anyhow!("thread {thread:?} does not exist"));
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        db.feeds.entry(thread).or_insert_with(Vec::new).push(sender);
        Ok(receiver)
    }
}
