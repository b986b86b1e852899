//! Decision-tree construction: insertion, sharing, and chain fixup.
//!
//! Rules enter a tree one at a time through [`insert_rule`], walking their
//! surviving conditions from the root and branching on option-handle
//! equality. [`finalize_root`] deduplicates completed top-level subtrees
//! across all trees of the build, and [`fixup_registered_trees`] collapses
//! unbranched chains after every tree is final.

use std::collections::HashMap;

use crate::error::{FastPatternError, Result};
use crate::rules::{RuleBuildState, RuleId, RuleSet};
use crate::search::{EngineRole, RuleAssociation, TreeAgent};
use crate::tree::types::{TreeForest, TreeNodeId, TreeNodeKind, TreeRootId};

/// Registry of canonical top-level subtrees, keyed by structural shape.
///
/// Registration order is preserved so later passes over the registered
/// subtrees are deterministic.
#[derive(Debug, Default)]
pub struct TreeRegistry {
    by_shape: HashMap<String, TreeNodeId>,
    registered: Vec<TreeNodeId>,
}

impl TreeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical subtrees in registration order.
    pub fn registered(&self) -> &[TreeNodeId] {
        &self.registered
    }

    pub fn len(&self) -> usize {
        self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }
}

/// Insert one rule's surviving condition chain into the tree under `root_id`.
///
/// Children branch and merge on option-handle equality alone; a node created
/// earlier for the same handle is descended into, anything else grows a new
/// sibling. `skip` names the condition index consumed by the engine's fast
/// pattern for the active context, which must not be evaluated again in the
/// tree. A leaf is appended unless the walk ended on a node that already has
/// a sibling leaf with this rule's signature.
pub fn insert_rule(
    forest: &mut TreeForest,
    ruleset: &RuleSet,
    root_id: TreeRootId,
    rule_id: RuleId,
    skip: Option<usize>,
) -> Result<()> {
    let rule = ruleset
        .rule(rule_id)
        .ok_or(FastPatternError::InvalidHandle(rule_id))?;

    let mut need_leaf = forest.root(root_id).children.is_empty();
    let mut parent: Option<TreeNodeId> = None;

    for (idx, cond) in rule.conditions.iter().enumerate() {
        if skip == Some(idx) {
            continue;
        }

        let existing = {
            let level = match parent {
                None => &forest.root(root_id).children,
                Some(p) => &forest.node(p).children,
            };
            level.iter().copied().find(|&c| {
                matches!(forest.node(c).kind,
                    TreeNodeKind::Check { option } if option == cond.option)
            })
        };

        let next = match existing {
            Some(found) => found,
            None => {
                let created =
                    forest.alloc_node(TreeNodeKind::Check { option: cond.option }, cond.relative);
                match parent {
                    None => forest.root_mut(root_id).children.push(created),
                    Some(p) => {
                        forest.node_mut(p).children.push(created);
                        if cond.relative {
                            forest.node_mut(p).relative_children += 1;
                        }
                    }
                }
                need_leaf = true;
                created
            }
        };
        parent = Some(next);
    }

    if !need_leaf {
        need_leaf = is_new_sig(forest, ruleset, root_id, parent, rule_id);
    }
    if !need_leaf {
        return Ok(());
    }

    let leaf = forest.alloc_node(TreeNodeKind::Leaf { rule: rule_id }, false);
    match parent {
        None => forest.root_mut(root_id).children.push(leaf),
        Some(p) => forest.node_mut(p).children.push(leaf),
    }
    Ok(())
}

/// A leaf is needed unless a sibling leaf already carries the same
/// signature. A rule re-entering the same tree through another of its
/// patterns must not produce a duplicate leaf.
fn is_new_sig(
    forest: &TreeForest,
    ruleset: &RuleSet,
    root_id: TreeRootId,
    parent: Option<TreeNodeId>,
    rule_id: RuleId,
) -> bool {
    let sig = ruleset.rules()[rule_id as usize].sig;
    let siblings = match parent {
        None => &forest.root(root_id).children,
        Some(p) => &forest.node(p).children,
    };
    !siblings.iter().any(|&c| match forest.node(c).kind {
        TreeNodeKind::Leaf { rule } => ruleset.rules()[rule as usize].sig == sig,
        TreeNodeKind::Check { .. } => false,
    })
}

/// Replace each of the root's top-level subtrees with the canonical
/// registered copy when a structurally identical one exists, releasing the
/// duplicate; otherwise register the subtree as canonical.
///
/// Must run after the last insertion into `root_id`. Safe to call again on
/// an already-finalized root.
pub fn finalize_root(forest: &mut TreeForest, registry: &mut TreeRegistry, root_id: TreeRootId) {
    let children: Vec<TreeNodeId> = forest.root(root_id).children.clone();
    for (slot, &child) in children.iter().enumerate() {
        let key = forest.shape_key(child);
        match registry.by_shape.get(&key).copied() {
            Some(canonical) if canonical != child => {
                forest.release_subtree(child);
                forest.root_mut(root_id).children[slot] = canonical;
            }
            Some(_) => {}
            None => {
                registry.by_shape.insert(key, child);
                registry.registered.push(child);
            }
        }
    }
}

/// Collapse unbranched chains in every registered subtree.
///
/// When a node sits on a single-child chain whose remainder holds at most
/// one literal content condition, the terminal rule is promoted into the
/// node's `matched_rule`, letting the evaluator report the match without
/// descending further.
pub fn fixup_registered_trees(forest: &mut TreeForest, ruleset: &RuleSet, registry: &TreeRegistry) {
    for &node in registry.registered() {
        fixup_node(forest, ruleset, node, true, 0);
    }
}

fn fixup_node(
    forest: &mut TreeForest,
    ruleset: &RuleSet,
    id: TreeNodeId,
    branched: bool,
    mut contents: u32,
) -> Option<RuleId> {
    let (kind, child_count, first_child) = {
        let node = forest.node(id);
        (node.kind, node.children.len(), node.children.first().copied())
    };

    match child_count {
        0 => {
            let rule = match kind {
                TreeNodeKind::Leaf { rule } => rule,
                TreeNodeKind::Check { .. } => return None,
            };
            if !branched && contents > 0 {
                return Some(rule);
            }
            forest.node_mut(id).matched_rule = Some(rule);
            None
        }
        1 => {
            if let TreeNodeKind::Check { option } = kind {
                if ruleset
                    .option(option)
                    .map_or(false, |o| o.is_literal_content())
                {
                    contents += 1;
                }
            }
            let promoted = match first_child {
                Some(only) => fixup_node(forest, ruleset, only, false, contents),
                None => None,
            };
            if !branched && contents > 1 {
                return promoted;
            }
            forest.node_mut(id).matched_rule = promoted;
            None
        }
        _ => {
            let children: Vec<TreeNodeId> = forest.node(id).children.clone();
            for child in children {
                fixup_node(forest, ruleset, child, true, 0);
            }
            None
        }
    }
}

/// Agent folding one engine's association walk into its group's tree.
///
/// Primary and offload engines of a group share one tree, so only the last
/// walk over a root sets `finalize_on_finish`. Negated associations bypass
/// the tree and collect on the engine's side list.
pub struct TreeFolder<'a> {
    pub forest: &'a mut TreeForest,
    pub registry: &'a mut TreeRegistry,
    pub ruleset: &'a RuleSet,
    pub rule_states: &'a [RuleBuildState],
    pub role: EngineRole,
    pub root: &'a mut Option<TreeRootId>,
    pub negated: &'a mut Vec<RuleAssociation>,
    pub finalize_on_finish: bool,
}

impl TreeAgent for TreeFolder<'_> {
    fn build_tree(&mut self, assoc: RuleAssociation) -> Result<()> {
        let root_id = match *self.root {
            Some(root) => root,
            None => {
                let root = self.forest.alloc_root();
                *self.root = Some(root);
                root
            }
        };
        let skip = self
            .rule_states
            .get(assoc.rule as usize)
            .and_then(|s| s.fp_only[self.role.index()]);
        insert_rule(self.forest, self.ruleset, root_id, assoc.rule, skip)
    }

    fn negated_pattern(&mut self, assoc: RuleAssociation) -> Result<()> {
        self.negated.push(assoc);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.finalize_on_finish {
            if let Some(root) = *self.root {
                finalize_root(self.forest, self.registry, root);
            }
        }
        Ok(())
    }
}
