//! Structural operations on a project tree.
//!
//! Every operation takes the current tree by reference and returns a new
//! value, leaving the input untouched so callers can compare old and new.
//! An unknown id is never an error: the returned tree is simply unchanged.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::TreeNode;

/// Name given to nodes created through [`add_child`].
pub const PLACEHOLDER_NAME: &str = "New element";

/// A node reached during a pre-order walk.
#[derive(Debug, Clone, Copy)]
pub struct Visit<'a> {
    pub node: &'a TreeNode,
    pub parent: Option<&'a TreeNode>,
    pub depth: usize,
    pub sibling_index: usize,
    pub sibling_count: usize,
}

impl TreeNode {
    /// Pre-order walk, root first.
    pub fn walk(&self) -> Vec<Visit<'_>> {
        let mut out = Vec::new();
        walk_into(self, None, 0, 0, 1, &mut out);
        out
    }

    /// All ids in pre-order.
    pub fn ids(&self) -> Vec<&str> {
        self.walk().into_iter().map(|v| v.node.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        1 + self.children.iter().map(TreeNode::len).sum::<usize>()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// No id appears twice anywhere in the tree.
    pub fn has_unique_ids(&self) -> bool {
        let mut seen = HashSet::new();
        self.walk().into_iter().all(|v| seen.insert(v.node.id.as_str()))
    }

    pub fn contains(&self, id: &str) -> bool {
        find(self, id).is_some()
    }

    pub fn depth_of(&self, id: &str) -> Option<usize> {
        self.walk().into_iter().find(|v| v.node.id == id).map(|v| v.depth)
    }

    pub fn parent_of(&self, id: &str) -> Option<&TreeNode> {
        self.walk()
            .into_iter()
            .find(|v| v.node.id == id)
            .and_then(|v| v.parent)
    }
}

fn walk_into<'a>(
    node: &'a TreeNode,
    parent: Option<&'a TreeNode>,
    depth: usize,
    sibling_index: usize,
    sibling_count: usize,
    out: &mut Vec<Visit<'a>>,
) {
    out.push(Visit {
        node,
        parent,
        depth,
        sibling_index,
        sibling_count,
    });
    let count = node.children.len();
    for (i, child) in node.children.iter().enumerate() {
        walk_into(child, Some(node), depth + 1, i, count, out);
    }
}

/// Depth-first search for `id`.
pub fn find<'a>(tree: &'a TreeNode, id: &str) -> Option<&'a TreeNode> {
    if tree.id == id {
        return Some(tree);
    }
    tree.children.iter().find_map(|c| find(c, id))
}

/// Copy of `tree` with the matching node's name replaced.
pub fn rename(tree: &TreeNode, id: &str, name: &str) -> TreeNode {
    if tree.id == id {
        return TreeNode {
            name: name.to_string(),
            ..tree.clone()
        };
    }
    rebuild(tree, tree.children.iter().map(|c| rename(c, id, name)).collect())
}

/// Append a placeholder child to `parent_id`, inheriting the parent's category.
pub fn add_child(tree: &TreeNode, parent_id: &str) -> TreeNode {
    let Some(parent) = find(tree, parent_id) else {
        return tree.clone();
    };
    let child = TreeNode::new(next_item_id(tree), PLACEHOLDER_NAME, parent.category);
    insert_child(tree, parent_id, child)
}

/// Append `child` to the end of `parent_id`'s children.
pub fn insert_child(tree: &TreeNode, parent_id: &str, child: TreeNode) -> TreeNode {
    if tree.id == parent_id {
        let mut children = tree.children.clone();
        children.push(child);
        return rebuild(tree, children);
    }
    rebuild(
        tree,
        tree.children
            .iter()
            .map(|c| insert_child(c, parent_id, child.clone()))
            .collect(),
    )
}

/// Remove `id` and everything under it. Deleting the root yields `None`.
pub fn delete_subtree(tree: &TreeNode, id: &str) -> Option<TreeNode> {
    if tree.id == id {
        return None;
    }
    Some(rebuild(
        tree,
        tree.children.iter().filter_map(|c| delete_subtree(c, id)).collect(),
    ))
}

/// Shallow copy of `node`'s own fields over a new child list.
fn rebuild(node: &TreeNode, children: Vec<TreeNode>) -> TreeNode {
    TreeNode {
        id: node.id.clone(),
        name: node.name.clone(),
        description: node.description.clone(),
        category: node.category,
        children,
    }
}

static LAST_ITEM_ID: AtomicU64 = AtomicU64::new(0);

/// Mint an `item-N` id. N is strictly increasing within the process, starts
/// from wall-clock milliseconds and always lands past any `item-N` already in
/// `tree`, so deleted ids never come back.
///
/// Once N would pass `u64::MAX` the id gets an `-K` suffix instead, still
/// unique within `tree`.
pub fn next_item_id(tree: &TreeNode) -> String {
    let taken = tree
        .ids()
        .into_iter()
        .filter_map(|id| id.strip_prefix("item-").and_then(|s| s.parse::<u64>().ok()))
        .max()
        .unwrap_or(0);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    let Some(floor) = taken.checked_add(1) else {
        return suffixed(tree, u64::MAX);
    };

    let mut prev = LAST_ITEM_ID.load(Ordering::Relaxed);
    let n = loop {
        let candidate = prev.saturating_add(1).max(now).max(floor);
        match LAST_ITEM_ID.compare_exchange_weak(prev, candidate, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break candidate,
            Err(actual) => prev = actual,
        }
    };

    let id = format!("item-{}", n);
    if tree.contains(&id) {
        return suffixed(tree, n);
    }
    id
}

/// First free `item-N-K`. The global counter is left alone.
fn suffixed(tree: &TreeNode, n: u64) -> String {
    let mut k: u64 = 1;
    loop {
        let id = format!("item-{}-{}", n, k);
        if !tree.contains(&id) {
            return id;
        }
        k += 1;
    }
}
