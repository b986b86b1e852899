//! Decision-tree arena types.
//!
//! Every tree node of a compilation lives in one [`TreeForest`]. Nodes and
//! roots are addressed by `u32` handles; subtree sharing after deduplication
//! is just two parents holding the same child handle. Released duplicate
//! subtrees go on a free list and their slots are reused.

use std::collections::HashSet;

use crate::error::{FastPatternError, Result};
use crate::rules::{OptionId, RuleId};

/// Handle of a node inside a [`TreeForest`].
pub type TreeNodeId = u32;

/// Handle of a tree root inside a [`TreeForest`].
pub type TreeRootId = u32;

/// What one tree node evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeNodeKind {
    /// Evaluate the interned condition; on success descend into children.
    Check { option: OptionId },
    /// Terminal: the rule matches here.
    Leaf { rule: RuleId },
}

/// A node in a shared decision tree.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub kind: TreeNodeKind,
    /// The condition evaluates relative to the previous match position.
    pub is_relative: bool,
    /// Number of relative children below this node.
    pub relative_children: u32,
    pub children: Vec<TreeNodeId>,
    /// Rule promoted here by the fixup pass; lets the evaluator report a
    /// match without descending further.
    pub matched_rule: Option<RuleId>,
}

impl TreeNode {
    pub fn new(kind: TreeNodeKind, is_relative: bool) -> Self {
        Self {
            kind,
            is_relative,
            relative_children: 0,
            children: Vec::new(),
            matched_rule: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, TreeNodeKind::Leaf { .. })
    }
}

/// Entry point of one shared tree. Each search engine group and each
/// no-fast-pattern bucket owns one root.
#[derive(Debug, Clone, Default)]
pub struct TreeRoot {
    pub children: Vec<TreeNodeId>,
}

/// Arena owning every tree node and root of a compilation.
#[derive(Debug, Clone, Default)]
pub struct TreeForest {
    nodes: Vec<TreeNode>,
    roots: Vec<TreeRoot>,
    free: Vec<TreeNodeId>,
}

impl TreeForest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node, reusing a released slot when one exists.
    pub fn alloc_node(&mut self, kind: TreeNodeKind, is_relative: bool) -> TreeNodeId {
        let node = TreeNode::new(kind, is_relative);
        if let Some(id) = self.free.pop() {
            self.nodes[id as usize] = node;
            id
        } else {
            let id = self.nodes.len() as TreeNodeId;
            self.nodes.push(node);
            id
        }
    }

    pub fn alloc_root(&mut self) -> TreeRootId {
        let id = self.roots.len() as TreeRootId;
        self.roots.push(TreeRoot::default());
        id
    }

    pub fn node(&self, id: TreeNodeId) -> &TreeNode {
        &self.nodes[id as usize]
    }

    pub fn node_mut(&mut self, id: TreeNodeId) -> &mut TreeNode {
        &mut self.nodes[id as usize]
    }

    pub fn root(&self, id: TreeRootId) -> &TreeRoot {
        &self.roots[id as usize]
    }

    pub fn root_mut(&mut self, id: TreeRootId) -> &mut TreeRoot {
        &mut self.roots[id as usize]
    }

    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    /// Nodes currently reachable through allocation, excluding free slots.
    pub fn live_node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Release a subtree back to the free list.
    pub fn release_subtree(&mut self, id: TreeNodeId) {
        let children = std::mem::take(&mut self.nodes[id as usize].children);
        for child in children {
            self.release_subtree(child);
        }
        self.free.push(id);
    }

    /// Structural signature of a subtree. Two subtrees get the same key
    /// exactly when they check the same option handles with the same
    /// relative flags over the same shape and end in the same rules.
    pub fn shape_key(&self, id: TreeNodeId) -> String {
        let node = self.node(id);
        let mut key = match node.kind {
            TreeNodeKind::Leaf { rule } => format!("l{rule}"),
            TreeNodeKind::Check { option } => {
                if node.is_relative {
                    format!("c{option}r")
                } else {
                    format!("c{option}")
                }
            }
        };
        if !node.children.is_empty() {
            key.push('(');
            for (i, &child) in node.children.iter().enumerate() {
                if i > 0 {
                    key.push(',');
                }
                key.push_str(&self.shape_key(child));
            }
            key.push(')');
        }
        key
    }

    /// Validate arena consistency.
    pub fn validate(&self) -> Result<()> {
        let freed: HashSet<TreeNodeId> = self.free.iter().copied().collect();

        let mut check_children = |owner: &str, children: &[TreeNodeId]| -> Result<()> {
            for &child in children {
                if child as usize >= self.nodes.len() {
                    return Err(FastPatternError::Compilation(format!(
                        "Invalid tree child: {owner} -> {child}"
                    )));
                }
                if freed.contains(&child) {
                    return Err(FastPatternError::Compilation(format!(
                        "Released tree child still referenced: {owner} -> {child}"
                    )));
                }
            }
            Ok(())
        };

        for (i, root) in self.roots.iter().enumerate() {
            check_children(&format!("root {i}"), &root.children)?;
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if freed.contains(&(i as TreeNodeId)) {
                continue;
            }
            check_children(&format!("node {i}"), &node.children)?;
            if node.is_leaf() && !node.children.is_empty() {
                return Err(FastPatternError::Compilation(format!(
                    "Leaf node {i} has children"
                )));
            }
        }
        Ok(())
    }

    pub fn statistics(&self) -> TreeStatistics {
        TreeStatistics::from_forest(self)
    }

    fn depth_below(&self, id: TreeNodeId) -> usize {
        1 + self
            .node(id)
            .children
            .iter()
            .map(|&c| self.depth_below(c))
            .max()
            .unwrap_or(0)
    }
}

/// Structure counts for diagnostics.
#[derive(Debug, Clone)]
pub struct TreeStatistics {
    pub live_nodes: usize,
    pub check_nodes: usize,
    pub leaf_nodes: usize,
    pub root_count: usize,
    /// Nodes carrying a fixup-promoted rule.
    pub promoted_nodes: usize,
    /// Deepest root-to-leaf path.
    pub max_depth: usize,
}

impl TreeStatistics {
    pub fn from_forest(forest: &TreeForest) -> Self {
        let freed: HashSet<TreeNodeId> = forest.free.iter().copied().collect();
        let mut check_nodes = 0;
        let mut leaf_nodes = 0;
        let mut promoted_nodes = 0;

        for (i, node) in forest.nodes.iter().enumerate() {
            if freed.contains(&(i as TreeNodeId)) {
                continue;
            }
            match node.kind {
                TreeNodeKind::Check { .. } => check_nodes += 1,
                TreeNodeKind::Leaf { .. } => leaf_nodes += 1,
            }
            if node.matched_rule.is_some() {
                promoted_nodes += 1;
            }
        }

        let max_depth = forest
            .roots
            .iter()
            .flat_map(|r| r.children.iter())
            .map(|&c| forest.depth_below(c))
            .max()
            .unwrap_or(0);

        Self {
            live_nodes: forest.live_node_count(),
            check_nodes,
            leaf_nodes,
            root_count: forest.root_count(),
            promoted_nodes,
            max_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(option: OptionId) -> TreeNodeKind {
        TreeNodeKind::Check { option }
    }

    fn leaf(rule: RuleId) -> TreeNodeKind {
        TreeNodeKind::Leaf { rule }
    }

    #[test]
    fn test_alloc_and_accessors() {
        let mut forest = TreeForest::new();
        let root = forest.alloc_root();
        let a = forest.alloc_node(check(1), false);
        let l = forest.alloc_node(leaf(0), false);

        forest.node_mut(a).children.push(l);
        forest.root_mut(root).children.push(a);

        assert_eq!(forest.live_node_count(), 2);
        assert_eq!(forest.root_count(), 1);
        assert!(!forest.node(a).is_leaf());
        assert!(forest.node(l).is_leaf());
        assert!(forest.validate().is_ok());
    }

    #[test]
    fn test_release_reuses_slots() {
        let mut forest = TreeForest::new();
        let a = forest.alloc_node(check(1), false);
        let b = forest.alloc_node(check(2), false);
        let l = forest.alloc_node(leaf(0), false);
        forest.node_mut(a).children.push(b);
        forest.node_mut(b).children.push(l);

        assert_eq!(forest.live_node_count(), 3);
        forest.release_subtree(a);
        assert_eq!(forest.live_node_count(), 0);

        // Fresh allocations reuse the released slots instead of growing.
        let c = forest.alloc_node(check(3), false);
        let d = forest.alloc_node(check(4), false);
        let e = forest.alloc_node(check(5), false);
        assert!(c < 3 && d < 3 && e < 3);
        assert_eq!(forest.live_node_count(), 3);
    }

    #[test]
    fn test_shape_key_structure() {
        let mut forest = TreeForest::new();
        let a = forest.alloc_node(check(7), false);
        let b = forest.alloc_node(check(9), true);
        let l = forest.alloc_node(leaf(3), false);
        forest.node_mut(b).children.push(l);
        forest.node_mut(a).children.push(b);

        assert_eq!(forest.shape_key(a), "c7(c9r(l3))");
        assert_eq!(forest.shape_key(l), "l3");
    }

    #[test]
    fn test_shape_key_distinguishes_sibling_order() {
        let mut forest = TreeForest::new();
        let a = forest.alloc_node(check(1), false);
        let l1 = forest.alloc_node(leaf(1), false);
        let l2 = forest.alloc_node(leaf(2), false);
        forest.node_mut(a).children.push(l1);
        forest.node_mut(a).children.push(l2);

        let b = forest.alloc_node(check(1), false);
        let l2b = forest.alloc_node(leaf(2), false);
        let l1b = forest.alloc_node(leaf(1), false);
        forest.node_mut(b).children.push(l2b);
        forest.node_mut(b).children.push(l1b);

        assert_eq!(forest.shape_key(a), "c1(l1,l2)");
        assert_ne!(forest.shape_key(a), forest.shape_key(b));
    }

    #[test]
    fn test_identical_subtrees_share_shape_key() {
        let mut forest = TreeForest::new();

        let mut build = |forest: &mut TreeForest| {
            let a = forest.alloc_node(check(4), false);
            let l = forest.alloc_node(leaf(6), false);
            forest.node_mut(a).children.push(l);
            a
        };
        let first = build(&mut forest);
        let second = build(&mut forest);

        assert_ne!(first, second);
        assert_eq!(forest.shape_key(first), forest.shape_key(second));
    }

    #[test]
    fn test_validate_rejects_bad_child() {
        let mut forest = TreeForest::new();
        let a = forest.alloc_node(check(1), false);
        forest.node_mut(a).children.push(99);

        assert!(forest.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_released_child() {
        let mut forest = TreeForest::new();
        let root = forest.alloc_root();
        let a = forest.alloc_node(check(1), false);
        let b = forest.alloc_node(check(2), false);
        forest.root_mut(root).children.push(a);
        forest.root_mut(root).children.push(b);

        forest.release_subtree(b);
        assert!(forest.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_leaf_with_children() {
        let mut forest = TreeForest::new();
        let l = forest.alloc_node(leaf(1), false);
        let other = forest.alloc_node(leaf(2), false);
        forest.node_mut(l).children.push(other);

        assert!(forest.validate().is_err());
    }

    #[test]
    fn test_statistics() {
        let mut forest = TreeForest::new();
        let root = forest.alloc_root();
        let a = forest.alloc_node(check(1), false);
        let b = forest.alloc_node(check(2), false);
        let l = forest.alloc_node(leaf(0), false);
        forest.node_mut(b).children.push(l);
        forest.node_mut(a).children.push(b);
        forest.root_mut(root).children.push(a);
        forest.node_mut(a).matched_rule = Some(0);

        let stats = forest.statistics();
        assert_eq!(stats.live_nodes, 3);
        assert_eq!(stats.check_nodes, 2);
        assert_eq!(stats.leaf_nodes, 1);
        assert_eq!(stats.root_count, 1);
        assert_eq!(stats.promoted_nodes, 1);
        assert_eq!(stats.max_depth, 3);
    }

    #[test]
    fn test_statistics_empty_forest() {
        let forest = TreeForest::new();
        let stats = forest.statistics();

        assert_eq!(stats.live_nodes, 0);
        assert_eq!(stats.root_count, 0);
        assert_eq!(stats.max_depth, 0);
    }
}
