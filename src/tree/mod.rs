//! Shared decision trees for non-fast-pattern rule conditions.
//!
//! Every rule group owns one tree. Rules associated with the group's search
//! engines fold their remaining conditions into it, structurally identical
//! subtrees are shared across groups, and a fixup pass collapses unbranched
//! chains so trivial rules match without tree descent.

pub mod builder;
pub mod types;

// Re-export main types for convenience
pub use builder::{
    finalize_root, fixup_registered_trees, insert_rule, TreeFolder, TreeRegistry,
};
pub use types::{
    TreeForest, TreeNode, TreeNodeId, TreeNodeKind, TreeRoot, TreeRootId, TreeStatistics,
};
