use std::collections::VecDeque;

use crate::{
    api::{Author, Comment, CommentId, CommentSync, Thread, ThreadId, Time, UserId},
    tree::{Replaced, Tree, TreeError},
};

/// Submission lifecycle of a controller
///
/// `Idle -> Pending -> Committed -> Idle` on success, `Idle -> Pending -> Failed -> Idle` on
/// failure. There is no retry state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SyncState {
    Idle,
    Pending {
        generation: u64,
        temp_id: CommentId,
    },
    Committed {
        generation: u64,
        id: CommentId,
    },
    Failed {
        generation: u64,
        temp_id: CommentId,
    },
}

impl SyncState {
    pub fn is_idle(&self) -> bool {
        matches!(self, SyncState::Idle)
    }

    pub fn can_step_to(&self, to: &SyncState) -> bool {
        match (self, to) {
            (SyncState::Idle, SyncState::Pending { .. }) => true,
            (
                SyncState::Pending { generation: g, .. },
                SyncState::Committed { generation, .. } | SyncState::Failed { generation, .. },
            ) => g == generation,
            (SyncState::Committed { .. } | SyncState::Failed { .. }, SyncState::Idle) => true,
            _ => false,
        }
    }
}

/// Identifies one submission, responses carrying an outdated ticket are discarded
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Ticket {
    pub generation: u64,
    pub temp_id: CommentId,
    pub parent: Option<CommentId>,
}

/// Every change to the tree goes through one of these
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Mutation {
    Optimistic {
        parent: Option<CommentId>,
        comment: Comment,
    },
    Commit {
        temp_id: CommentId,
        committed: Comment,
    },
    Rollback {
        temp_id: CommentId,
    },
    Merge {
        comment: Comment,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Applied {
    Inserted,
    Replaced(Replaced),
    Removed,

    /// Merged comment was already known
    Ignored,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MutationKind {
    Optimistic,
    Commit,
    Rollback,
    Merge,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct JournalEntry {
    pub seq: u64,
    pub kind: MutationKind,
    pub id: CommentId,
    pub applied: Applied,
}

/// Everything the controller and the feed share for one thread
#[derive(Clone, Debug)]
pub struct ThreadState {
    thread: ThreadId,
    thread_author: UserId,
    tree: Tree,
    sync: SyncState,
    generation: u64,
    next_temp_id: i64,
    seq: u64,
    journal: VecDeque<JournalEntry>,
    journal_capacity: usize,
}

impl ThreadState {
    pub fn new(thread: &Thread, journal_capacity: usize) -> Result<ThreadState, TreeError> {
        Ok(ThreadState {
            thread: thread.id,
            thread_author: thread.author.id,
            tree: Tree::from_forest(thread.comments.clone())?,
            sync: SyncState::Idle,
            generation: 0,
            next_temp_id: -1,
            seq: 0,
            journal: VecDeque::with_capacity(journal_capacity),
            journal_capacity,
        })
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn thread_author(&self) -> UserId {
        self.thread_author
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn sync(&self) -> SyncState {
        self.sync
    }

    pub fn journal(&self) -> impl Iterator<Item = &JournalEntry> {
        self.journal.iter()
    }

    /// Applies one mutation and records it in the journal
    pub fn apply(&mut self, m: Mutation) -> Result<Applied, TreeError> {
        let (kind, id) = match &m {
            Mutation::Optimistic { comment, .. } => (MutationKind::Optimistic, comment.id),
            Mutation::Commit { temp_id, .. } => (MutationKind::Commit, *temp_id),
            Mutation::Rollback { temp_id } => (MutationKind::Rollback, *temp_id),
            Mutation::Merge { comment } => (MutationKind::Merge, comment.id),
        };
        let applied = match m {
            Mutation::Optimistic { parent, comment } => {
                self.tree.insert_child(parent, comment)?;
                Applied::Inserted
            }
            Mutation::Commit { temp_id, committed } => {
                Applied::Replaced(self.tree.replace(temp_id, committed)?)
            }
            Mutation::Rollback { temp_id } => {
                self.tree.remove(temp_id)?;
                Applied::Removed
            }
            Mutation::Merge { comment } => self.merge(comment)?,
        };
        self.seq += 1;
        if self.journal.len() >= self.journal_capacity {
            self.journal.pop_front();
        }
        if self.journal_capacity > 0 {
            self.journal.push_back(JournalEntry {
                seq: self.seq,
                kind,
                id,
                applied,
            });
        }
        Ok(applied)
    }

    fn merge(&mut self, mut comment: Comment) -> Result<Applied, TreeError> {
        if self.tree.contains(comment.id) {
            tracing::debug!(id = ?comment.id, "merged comment is already known");
            return Ok(Applied::Ignored);
        }
        let parent = match comment.parent_id {
            Some(p) if !self.tree.contains(p) => {
                tracing::warn!(
                    id = ?comment.id,
                    parent = ?p,
                    "merged comment has unknown parent, adding it as a root comment",
                );
                comment.parent_id = None;
                None
            }
            p => p,
        };
        comment.sync = CommentSync::Committed;
        self.tree.insert_child(parent, comment)?;
        Ok(Applied::Inserted)
    }

    fn transition(&mut self, to: SyncState) {
        if !self.sync.can_step_to(&to) {
            tracing::error!(from = ?self.sync, ?to, "invalid sync state transition");
            debug_assert!(false, "invalid sync state transition {:?} -> {to:?}", self.sync);
        }
        self.sync = to;
    }

    fn allocate_temp_id(&mut self) -> CommentId {
        while self.tree.contains(CommentId(self.next_temp_id)) {
            self.next_temp_id -= 1;
        }
        let id = CommentId(self.next_temp_id);
        self.next_temp_id -= 1;
        id
    }

    /// Starts a submission by inserting its optimistic comment
    ///
    /// Returns `None` without touching anything when a submission is already pending.
    pub fn begin(
        &mut self,
        parent: Option<CommentId>,
        content: String,
        author: Author,
        now: Time,
    ) -> Result<Option<Ticket>, TreeError> {
        if !self.sync.is_idle() {
            return Ok(None);
        }
        if let Some(p) = parent {
            if !self.tree.contains(p) {
                return Err(TreeError::UnknownParent(p));
            }
        }
        let temp_id = self.allocate_temp_id();
        self.apply(Mutation::Optimistic {
            parent,
            comment: Comment {
                id: temp_id,
                content,
                created_at: now,
                deleted: false,
                parent_id: parent,
                author,
                replies: Vec::new(),
                sync: CommentSync::Pending,
            },
        })?;
        self.generation += 1;
        let ticket = Ticket {
            generation: self.generation,
            temp_id,
            parent,
        };
        self.transition(SyncState::Pending {
            generation: ticket.generation,
            temp_id,
        });
        Ok(Some(ticket))
    }

    fn is_current(&self, ticket: &Ticket) -> bool {
        self.sync
            == SyncState::Pending {
                generation: ticket.generation,
                temp_id: ticket.temp_id,
            }
    }

    /// Swaps in the committed record, `Ok(None)` if the ticket is outdated
    pub fn commit(
        &mut self,
        ticket: &Ticket,
        mut committed: Comment,
    ) -> Result<Option<Replaced>, TreeError> {
        if !self.is_current(ticket) {
            tracing::info!(?ticket, id = ?committed.id, "discarding outdated commit response");
            return Ok(None);
        }
        committed.sync = CommentSync::Committed;
        let id = committed.id;
        let res = self.apply(Mutation::Commit {
            temp_id: ticket.temp_id,
            committed,
        });
        self.transition(SyncState::Committed {
            generation: ticket.generation,
            id,
        });
        self.transition(SyncState::Idle);
        match res? {
            Applied::Replaced(r) => Ok(Some(r)),
            _ => Err(TreeError::UnknownComment(ticket.temp_id)),
        }
    }

    /// Rolls the optimistic comment back, `false` if the ticket is outdated
    pub fn fail(&mut self, ticket: &Ticket) -> Result<bool, TreeError> {
        if !self.is_current(ticket) {
            tracing::info!(?ticket, "discarding outdated failure response");
            return Ok(false);
        }
        let res = self.apply(Mutation::Rollback {
            temp_id: ticket.temp_id,
        });
        self.transition(SyncState::Failed {
            generation: ticket.generation,
            temp_id: ticket.temp_id,
        });
        self.transition(SyncState::Idle);
        res.map(|_| true)
    }

    /// Rolls back whatever submission is pending, so that its eventual response is ignored
    pub fn abandon(&mut self) -> Result<Option<CommentId>, TreeError> {
        let (generation, temp_id) = match self.sync {
            SyncState::Pending {
                generation,
                temp_id,
            } => (generation, temp_id),
            _ => return Ok(None),
        };
        let ticket = Ticket {
            generation,
            temp_id,
            parent: None,
        };
        self.fail(&ticket).map(|_| Some(temp_id))
    }

    /// Additive merge of a comment pushed by the backend
    pub fn merge_remote(&mut self, comment: Comment) -> Result<Applied, TreeError> {
        self.apply(Mutation::Merge { comment })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::tests::{at, author, chain, comment};

    fn state() -> ThreadState {
        let thread = Thread {
            id: ThreadId(1),
            title: String::from("title"),
            content: String::from("content"),
            author: author("op"),
            comments: chain().to_forest(),
        };
        ThreadState::new(&thread, 8).unwrap()
    }

    #[test]
    fn transitions() {
        let pending = SyncState::Pending {
            generation: 2,
            temp_id: CommentId(-1),
        };
        assert!(SyncState::Idle.can_step_to(&pending));
        assert!(!SyncState::Idle.can_step_to(&SyncState::Committed {
            generation: 2,
            id: CommentId(5)
        }));
        assert!(pending.can_step_to(&SyncState::Failed {
            generation: 2,
            temp_id: CommentId(-1)
        }));
        assert!(!pending.can_step_to(&SyncState::Committed {
            generation: 1,
            id: CommentId(5)
        }));
        assert!(!pending.can_step_to(&SyncState::Idle));
        assert!(!pending.can_step_to(&pending));
    }

    #[test]
    fn begin_commit_cycle() {
        let mut s = state();
        let ticket = s
            .begin(Some(CommentId(70)), String::from("deep"), author("bob"), at(10))
            .unwrap()
            .unwrap();
        assert!(ticket.temp_id.is_temporary());
        assert!(s.tree().get(ticket.temp_id).unwrap().sync == CommentSync::Pending);

        // second begin while pending is a no-op
        let before = s.tree().clone();
        assert_eq!(
            s.begin(None, String::from("other"), author("bob"), at(11)),
            Ok(None),
        );
        assert_eq!(s.tree(), &before);

        let replaced = s.commit(&ticket, comment(80, Some(70), 12)).unwrap();
        assert_eq!(replaced, Some(Replaced::InPlace));
        assert!(s.sync().is_idle());
        let node = s.tree().get(CommentId(80)).unwrap();
        assert_eq!(node.parent_id, Some(CommentId(70)));
        assert_eq!(node.sync, CommentSync::Committed);
        assert_eq!(s.tree().len(), before.len());
    }

    #[test]
    fn temp_ids_are_never_reused() {
        let mut s = state();
        let first = s
            .begin(None, String::from("a"), author("bob"), at(10))
            .unwrap()
            .unwrap();
        s.fail(&first).unwrap();
        let second = s
            .begin(None, String::from("b"), author("bob"), at(11))
            .unwrap()
            .unwrap();
        assert_ne!(first.temp_id, second.temp_id);
        assert!(second.generation > first.generation);
    }

    #[test]
    fn temp_ids_skip_ids_already_in_tree() {
        let mut thread_comments = chain().to_forest();
        thread_comments.push(comment(-1, None, 9));
        let thread = Thread {
            id: ThreadId(1),
            title: String::new(),
            content: String::new(),
            author: author("op"),
            comments: thread_comments,
        };
        let mut s = ThreadState::new(&thread, 8).unwrap();
        let ticket = s
            .begin(None, String::from("a"), author("bob"), at(10))
            .unwrap()
            .unwrap();
        assert_eq!(ticket.temp_id, CommentId(-2));
    }

    #[test]
    fn rollback_restores_tree() {
        let mut s = state();
        let before = s.tree().clone();
        let ticket = s
            .begin(Some(CommentId(61)), String::from("x"), author("bob"), at(10))
            .unwrap()
            .unwrap();
        assert_eq!(s.fail(&ticket), Ok(true));
        assert_eq!(s.tree(), &before);
        assert!(s.sync().is_idle());
    }

    #[test]
    fn outdated_responses_are_discarded() {
        let mut s = state();
        let before = s.tree().clone();
        let ticket = s
            .begin(None, String::from("x"), author("bob"), at(10))
            .unwrap()
            .unwrap();
        assert_eq!(s.abandon(), Ok(Some(ticket.temp_id)));
        assert_eq!(s.tree(), &before);

        assert_eq!(s.commit(&ticket, comment(90, None, 11)), Ok(None));
        assert_eq!(s.fail(&ticket), Ok(false));
        assert_eq!(s.tree(), &before);

        // a newer submission is not disturbed by the stale ticket
        let newer = s
            .begin(None, String::from("y"), author("bob"), at(12))
            .unwrap()
            .unwrap();
        assert_eq!(s.commit(&ticket, comment(91, None, 13)), Ok(None));
        assert!(s.tree().contains(newer.temp_id));
        assert_eq!(s.abandon(), Ok(Some(newer.temp_id)));
        assert_eq!(s.abandon(), Ok(None));
    }

    #[test]
    fn merge_is_additive() {
        let mut s = state();
        let ticket = s
            .begin(Some(CommentId(55)), String::from("mine"), author("bob"), at(10))
            .unwrap()
            .unwrap();

        assert_eq!(s.merge_remote(comment(100, Some(61), 11)), Ok(Applied::Inserted));
        assert_eq!(s.merge_remote(comment(100, Some(61), 11)), Ok(Applied::Ignored));
        assert_eq!(s.merge_remote(comment(55, None, 0)), Ok(Applied::Ignored));
        // pending optimistic comment survives remote merges
        assert!(s.tree().contains(ticket.temp_id));

        // unknown parent falls back to the root
        assert_eq!(s.merge_remote(comment(101, Some(999), 12)), Ok(Applied::Inserted));
        assert!(s.tree().roots().contains(&CommentId(101)));
        assert_eq!(s.tree().get(CommentId(101)).unwrap().parent_id, None);
    }

    #[test]
    fn echo_before_commit() {
        let mut s = state();
        let ticket = s
            .begin(Some(CommentId(55)), String::from("mine"), author("bob"), at(10))
            .unwrap()
            .unwrap();
        let committed = comment(62, Some(55), 10);
        s.merge_remote(committed.clone()).unwrap();
        assert_eq!(
            s.commit(&ticket, committed),
            Ok(Some(Replaced::MergedIntoExisting)),
        );
        assert!(!s.tree().contains(ticket.temp_id));
        let ids = s.tree().get(CommentId(55)).unwrap().children().to_vec();
        assert_eq!(ids, vec![CommentId(61), CommentId(62)]);
    }

    #[test]
    fn journal_is_ordered_and_bounded() {
        let mut s = state();
        for i in 0..10 {
            s.merge_remote(comment(200 + i, None, i)).unwrap();
        }
        let entries = s.journal().copied().collect::<Vec<_>>();
        assert_eq!(entries.len(), 8);
        assert!(entries.windows(2).all(|w| w[0].seq + 1 == w[1].seq));
        assert_eq!(entries.last().unwrap().id, CommentId(209));
        assert!(entries.iter().all(|e| e.kind == MutationKind::Merge));
    }
}
