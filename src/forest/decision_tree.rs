//! Decision trees: nodes, tags, and tree filters.

use std::collections::HashSet;
use std::sync::Arc;

use crate::forest::split_condition::SplitCondition;

/// Identifies either a split node or an adjustment (leaf) within one tree.
///
/// Non-negative raw values index `split_nodes`; negative values encode
/// `-adjustment_index - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeNodeId(i64);

impl TreeNodeId {
    pub fn split_node(index: usize) -> Self {
        TreeNodeId(index as i64)
    }

    pub fn adjustment(index: usize) -> Self {
        TreeNodeId(-(index as i64) - 1)
    }

    pub fn is_leaf(self) -> bool {
        self.0 < 0
    }

    pub fn split_node_index(self) -> usize {
        debug_assert!(!self.is_leaf());
        self.0 as usize
    }

    pub fn adjustment_index(self) -> usize {
        debug_assert!(self.is_leaf());
        (-self.0 - 1) as usize
    }

    pub fn raw_index(self) -> i64 {
        self.0
    }
}

/// An internal node: a shared condition plus the two child ids.
#[derive(Debug, Clone)]
pub struct SplitNode {
    pub child_if_false: TreeNodeId,
    pub child_if_true: TreeNodeId,
    pub condition: Arc<SplitCondition>,
}

impl SplitNode {
    pub fn new(
        child_if_false: TreeNodeId,
        child_if_true: TreeNodeId,
        condition: Arc<SplitCondition>,
    ) -> Self {
        SplitNode {
            child_if_false,
            child_if_true,
            condition,
        }
    }
}

/// Optional tag on a tree; tree filters select subsets by it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeTag {
    pub step: usize,
    pub submodel_id: usize,
}

/// A binary decision tree with a float adjustment in each leaf.
///
/// In a validated tree every referenced split index lies in
/// `[1, split_nodes.len())` (index 0 is the root and has no parent) and
/// every referenced adjustment index is in range; `adjustments.len()` is
/// `split_nodes.len() + 1` (a lone leaf when there are no splits).
#[derive(Debug, Clone)]
pub struct DecisionTree {
    pub split_nodes: Vec<SplitNode>,
    pub adjustments: Vec<f32>,
    pub weight: f32,
    pub tag: TreeTag,
}

impl Default for DecisionTree {
    fn default() -> Self {
        DecisionTree {
            split_nodes: Vec::new(),
            adjustments: Vec::new(),
            weight: 1.0,
            tag: TreeTag::default(),
        }
    }
}

impl DecisionTree {
    /// The id evaluation starts from.
    pub fn root_id(&self) -> TreeNodeId {
        if self.split_nodes.is_empty() {
            TreeNodeId::adjustment(0)
        } else {
            TreeNodeId::split_node(0)
        }
    }

    pub fn split_count(&self) -> usize {
        self.split_nodes.len()
    }
}

/// Selects a subset of trees by tag for partial evaluation.
///
/// The default filter accepts every tree. `step_range_to: None` means
/// unbounded; an empty submodel set means "all submodels".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeFilter {
    pub step_range_from: usize,
    pub step_range_to: Option<usize>,
    pub submodels: HashSet<usize>,
}

impl TreeFilter {
    /// Returns true if a tree with this tag should be evaluated.
    pub fn accepts(&self, tag: &TreeTag) -> bool {
        tag.step >= self.step_range_from
            && self.step_range_to.map_or(true, |to| tag.step < to)
            && (self.submodels.is_empty() || self.submodels.contains(&tag.submodel_id))
    }
}
