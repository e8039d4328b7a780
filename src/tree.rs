//! Canonical discussion tree.
//!
//! ## Design
//! - [`TreeNode`] owns its children; the [`TreeStore`] owns the root.
//! - Sibling order is arrival order and is never rearranged.
//! - All reads are pre-order depth-first, implemented with an explicit stack
//!   so deep reply chains cannot overflow the call stack.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ReplayError, Result};
use crate::model::CommentNode;

/// A comment plus its ordered replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub node: CommentNode,
    #[serde(default)]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn leaf(node: CommentNode) -> Self {
        Self {
            node,
            children: Vec::new(),
        }
    }

    pub fn with_children(node: CommentNode, children: Vec<TreeNode>) -> Self {
        Self { node, children }
    }
}

/// One step of a pre-order walk.
#[derive(Debug, Clone)]
pub struct Visit<'a> {
    pub tree: &'a TreeNode,
    pub parent: Option<&'a TreeNode>,
    /// Distance from the root (root = 0).
    pub depth: u32,
    /// Index among the parent's children; `None` for the root.
    pub child_idx: Option<usize>,
    /// Dotted path of sibling indices, `"1"` for the root.
    pub branch_id: String,
}

/// Pre-order iterator over a tree.
pub struct PreOrder<'a> {
    stack: Vec<Visit<'a>>,
}

impl<'a> PreOrder<'a> {
    pub fn new(root: &'a TreeNode) -> Self {
        Self {
            stack: vec![Visit {
                tree: root,
                parent: None,
                depth: 0,
                child_idx: None,
                branch_id: "1".into(),
            }],
        }
    }
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = Visit<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let visit = self.stack.pop()?;
        for (idx, child) in visit.tree.children.iter().enumerate().rev() {
            self.stack.push(Visit {
                tree: child,
                parent: Some(visit.tree),
                depth: visit.depth + 1,
                child_idx: Some(idx),
                branch_id: child_branch_id(&visit.branch_id, idx),
            });
        }
        Some(visit)
    }
}

/// Branch id of a child given its parent's branch id.
///
/// The depth-0 node is always `"1"`; every other node appends its
/// sibling index to the parent's id.
pub fn child_branch_id(parent_branch: &str, child_idx: usize) -> String {
    format!("{parent_branch}.{child_idx}")
}

/// Owns the discussion tree and supports point insertion by parent id.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeStore {
    root: TreeNode,
}

impl TreeStore {
    /// Take ownership of a loaded tree and attach `child_idx`/`branch_id` to
    /// every node.
    pub fn new(mut root: TreeNode) -> Self {
        assign_branch_ids(&mut root);
        Self { root }
    }

    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    pub fn into_root(self) -> TreeNode {
        self.root
    }

    pub fn iter(&self) -> PreOrder<'_> {
        PreOrder::new(&self.root)
    }

    /// Total number of nodes, alerts included.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Always false: a store cannot exist without its root.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn comment_count(&self) -> usize {
        self.iter().filter(|v| v.tree.node.is_comment()).count()
    }

    pub fn find(&self, id: &str) -> Option<&TreeNode> {
        self.iter().map(|v| v.tree).find(|t| t.node.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    /// Append `comment` as the last child of the node whose id is
    /// `comment.parent_id`.
    ///
    /// # Errors
    /// `MissingParent` when the comment has no parent id and
    /// `ParentNotFound` when no node carries it. The tree is left unchanged
    /// in both cases.
    pub fn insert(&mut self, mut comment: CommentNode) -> Result<&CommentNode> {
        let Some(parent_id) = comment.parent_id.clone() else {
            return Err(ReplayError::MissingParent {
                comment_id: comment.id,
            });
        };
        let Some(parent) = find_mut(&mut self.root, &parent_id) else {
            warn!(
                target: "discussion::tree",
                parent_id = %parent_id,
                comment_id = %comment.id,
                "parent not found, insertion dropped"
            );
            return Err(ReplayError::ParentNotFound {
                parent_id,
                comment_id: comment.id,
            });
        };

        let child_idx = parent.children.len();
        let parent_branch = parent.node.branch_id.clone().unwrap_or_else(|| "1".into());
        comment.child_idx = Some(child_idx);
        comment.branch_id = Some(child_branch_id(&parent_branch, child_idx));
        debug!(
            target: "discussion::tree",
            comment_id = %comment.id,
            parent_id = %parent_id,
            child_idx,
            "comment inserted"
        );
        parent.children.push(TreeNode::leaf(comment));
        Ok(&parent.children[child_idx].node)
    }
}

fn find_mut<'a>(root: &'a mut TreeNode, id: &str) -> Option<&'a mut TreeNode> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.node.id == id {
            return Some(node);
        }
        stack.extend(node.children.iter_mut().rev());
    }
    None
}

fn assign_branch_ids(root: &mut TreeNode) {
    root.node.child_idx = None;
    root.node.branch_id = Some("1".into());
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        let branch = node.node.branch_id.clone().unwrap_or_else(|| "1".into());
        for (idx, child) in node.children.iter_mut().enumerate() {
            child.node.child_idx = Some(idx);
            child.node.branch_id = Some(child_branch_id(&branch, idx));
        }
        stack.extend(node.children.iter_mut());
    }
}
