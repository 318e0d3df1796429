use std::collections::{hash_map, HashMap};

use crate::{
    api::{Author, Comment, CommentId, CommentSync, Time},
    order::dedup_replies,
};

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum TreeError {
    #[error("comment {0:?} is not in the tree")]
    UnknownComment(CommentId),

    #[error("parent comment {0:?} is not in the tree")]
    UnknownParent(CommentId),

    #[error("comment {0:?} is already in the tree")]
    DuplicateId(CommentId),
}

/// A comment as stored in the arena, with its children referenced by id
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Node {
    pub id: CommentId,
    pub content: String,
    pub created_at: Time,
    pub deleted: bool,
    pub parent_id: Option<CommentId>,
    pub author: Author,
    pub sync: CommentSync,

    /// Children in insertion order
    children: Vec<CommentId>,
}

impl Node {
    fn from_comment(c: Comment, parent_id: Option<CommentId>) -> (Node, Vec<Comment>) {
        let node = Node {
            id: c.id,
            content: c.content,
            created_at: c.created_at,
            deleted: c.deleted,
            parent_id,
            author: c.author,
            sync: c.sync,
            children: Vec::new(),
        };
        (node, c.replies)
    }

    pub fn children(&self) -> &[CommentId] {
        &self.children
    }

    /// This node alone, without its replies
    pub fn to_comment(&self) -> Comment {
        Comment {
            id: self.id,
            content: self.content.clone(),
            created_at: self.created_at,
            deleted: self.deleted,
            parent_id: self.parent_id,
            author: self.author.clone(),
            replies: Vec::new(),
            sync: self.sync,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Located<'a> {
    pub node: &'a Node,
    pub parent: Option<&'a Node>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Replaced {
    /// The temporary node took the committed identity in place
    InPlace,

    /// The committed record was already in the tree (delivered by the feed first), the
    /// temporary node was folded into it
    MergedIntoExisting,
}

/// Comment forest of a thread, stored as an arena keyed by comment id
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Tree {
    nodes: HashMap<CommentId, Node>,
    roots: Vec<CommentId>,
}

impl Tree {
    pub fn new() -> Tree {
        Tree::default()
    }

    pub fn from_forest(comments: Vec<Comment>) -> Result<Tree, TreeError> {
        let mut tree = Tree::new();
        for c in comments {
            tree.insert_child(None, c)?;
        }
        Ok(tree)
    }

    pub fn to_forest(&self) -> Vec<Comment> {
        self.roots.iter().filter_map(|id| self.comment(*id)).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: CommentId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: CommentId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn roots(&self) -> &[CommentId] {
        &self.roots
    }

    pub fn locate(&self, id: CommentId) -> Option<Located<'_>> {
        let node = self.nodes.get(&id)?;
        let parent = node.parent_id.and_then(|p| self.nodes.get(&p));
        Some(Located { node, parent })
    }

    /// The comment and all its replies, in nested form
    pub fn comment(&self, id: CommentId) -> Option<Comment> {
        let node = self.nodes.get(&id)?;
        let mut res = node.to_comment();
        res.replies = node
            .children
            .iter()
            .filter_map(|c| self.comment(*c))
            .collect();
        Some(res)
    }

    /// Number of ancestors, 0 for root comments
    pub fn depth(&self, id: CommentId) -> Option<usize> {
        let mut node = self.nodes.get(&id)?;
        let mut depth = 0;
        while let Some(parent) = node.parent_id {
            node = self.nodes.get(&parent)?;
            depth += 1;
        }
        Some(depth)
    }

    /// Depth-first, pre-order walk over the whole forest
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            tree: self,
            stack: self.roots.iter().rev().copied().collect(),
        }
    }

    /// Number of comments a reader can see, soft-deleted ones excluded
    pub fn visible_count(&self) -> usize {
        self.nodes.values().filter(|n| !n.deleted).count()
    }

    pub fn display_roots(&self) -> Vec<Comment> {
        dedup_replies(self.to_forest())
    }

    pub fn display_replies(&self, id: CommentId) -> Result<Vec<Comment>, TreeError> {
        let node = self.nodes.get(&id).ok_or(TreeError::UnknownComment(id))?;
        Ok(dedup_replies(
            node.children.iter().filter_map(|c| self.comment(*c)),
        ))
    }

    /// Appends `comment`, with any replies it carries, under `parent` or at the root
    pub fn insert_child(
        &mut self,
        parent: Option<CommentId>,
        comment: Comment,
    ) -> Result<(), TreeError> {
        if let Some(p) = parent {
            if !self.nodes.contains_key(&p) {
                return Err(TreeError::UnknownParent(p));
            }
        }
        let mut ids = Vec::new();
        collect_ids(&comment, &mut ids);
        let mut seen = std::collections::HashSet::with_capacity(ids.len());
        for id in ids {
            if self.nodes.contains_key(&id) || !seen.insert(id) {
                return Err(TreeError::DuplicateId(id));
            }
        }

        let id = comment.id;
        match parent {
            None => self.roots.push(id),
            Some(p) => {
                if let Some(p) = self.nodes.get_mut(&p) {
                    p.children.push(id);
                }
            }
        }
        let mut pending = vec![(parent, comment)];
        while let Some((parent, comment)) = pending.pop() {
            let (mut node, replies) = Node::from_comment(comment, parent);
            node.children = replies.iter().map(|r| r.id).collect();
            let id = node.id;
            pending.extend(replies.into_iter().map(|r| (Some(id), r)));
            self.nodes.insert(id, node);
        }
        Ok(())
    }

    /// Swaps the node `temp_id` for `committed`, keeping its position and its children
    pub fn replace(
        &mut self,
        temp_id: CommentId,
        committed: Comment,
    ) -> Result<Replaced, TreeError> {
        let temp = self
            .nodes
            .get(&temp_id)
            .ok_or(TreeError::UnknownComment(temp_id))?;
        let new_id = committed.id;
        let parent_id = temp.parent_id;

        if new_id != temp_id && self.nodes.contains_key(&new_id) {
            // committed copy already there: move the children over and drop the temporary node
            let temp = self.detach(temp_id)?;
            for c in temp.children.iter() {
                if let Some(child) = self.nodes.get_mut(c) {
                    child.parent_id = Some(new_id);
                }
            }
            if let Some(existing) = self.nodes.get_mut(&new_id) {
                existing.children.extend(temp.children);
            }
            return Ok(Replaced::MergedIntoExisting);
        }

        let temp = self
            .nodes
            .remove(&temp_id)
            .ok_or(TreeError::UnknownComment(temp_id))?;
        let (mut node, _) = Node::from_comment(committed, parent_id);
        node.children = temp.children;
        for c in node.children.iter() {
            if let Some(child) = self.nodes.get_mut(c) {
                child.parent_id = Some(new_id);
            }
        }
        if let Some(slot) = self
            .sibling_list_mut(parent_id)
            .iter_mut()
            .find(|s| **s == temp_id)
        {
            *slot = new_id;
        }
        self.nodes.insert(new_id, node);
        Ok(Replaced::InPlace)
    }

    /// Removes the node `id` and everything below it, returning it in nested form
    pub fn remove(&mut self, id: CommentId) -> Result<Comment, TreeError> {
        let removed = self
            .comment(id)
            .ok_or(TreeError::UnknownComment(id))?;
        let node = self.detach(id)?;
        let mut stack = node.children;
        while let Some(c) = stack.pop() {
            if let Some(n) = self.nodes.remove(&c) {
                stack.extend(n.children);
            }
        }
        Ok(removed)
    }

    /// Unlinks `id` from its sibling list and drops its own entry, leaving its children alone
    fn detach(&mut self, id: CommentId) -> Result<Node, TreeError> {
        let node = self.nodes.remove(&id).ok_or(TreeError::UnknownComment(id))?;
        self.sibling_list_mut(node.parent_id).retain(|s| *s != id);
        Ok(node)
    }

    fn sibling_list_mut(&mut self, parent: Option<CommentId>) -> &mut Vec<CommentId> {
        match parent.map(|p| self.nodes.entry(p)) {
            Some(hash_map::Entry::Occupied(e)) => &mut e.into_mut().children,
            _ => &mut self.roots,
        }
    }
}

fn collect_ids(c: &Comment, out: &mut Vec<CommentId>) {
    out.push(c.id);
    for r in c.replies.iter() {
        collect_ids(r, out);
    }
}

pub struct Walk<'a> {
    tree: &'a Tree,
    stack: Vec<CommentId>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<&'a Node> {
        loop {
            let id = self.stack.pop()?;
            if let Some(node) = self.tree.nodes.get(&id) {
                self.stack.extend(node.children.iter().rev().copied());
                return Some(node);
            }
        }
    }
}
