//! Oblivious tree detection.
//!
//! An oblivious tree is a perfect binary tree in which all internal nodes at
//! one depth share the same split condition. Such trees collapse to one
//! condition per layer plus an adjustment per leaf, which is what the
//! bitmask evaluator consumes.

use std::sync::Arc;

use crate::forest::{DecisionTree, SplitCondition, TreeNodeId, TreeTag};

/// Canonical form of an oblivious tree.
///
/// Leaves are numbered from the false-branch side to the true-branch side:
/// leaf 0 corresponds to every condition being false, the last leaf to every
/// condition being true. Adjustments are pre-multiplied by the tree weight.
#[derive(Debug, Clone)]
pub struct ObliviousDecisionTree {
    pub tag: TreeTag,
    pub layer_splits: Vec<Arc<SplitCondition>>,
    pub adjustments: Vec<f32>,
}

/// Re-expresses `tree` as an oblivious tree, or returns `None` if the tree
/// is not perfect or mixes conditions within a layer.
pub fn to_oblivious_tree(tree: &DecisionTree) -> Option<ObliviousDecisionTree> {
    let region_count = tree.adjustments.len();
    if !region_count.is_power_of_two() {
        return None;
    }
    let depth = region_count.trailing_zeros() as usize;
    let mut layer_splits: Vec<Arc<SplitCondition>> = Vec::with_capacity(depth);
    let mut adjustments = Vec::with_capacity(region_count);

    // Traversal order: node, false subtree, true subtree.
    let mut stack = Vec::with_capacity(32);
    stack.push((tree.root_id(), 0usize));
    while let Some((node_id, current_depth)) = stack.pop() {
        if node_id.is_leaf() {
            if current_depth != depth {
                return None; // not balanced
            }
            adjustments.push(tree.adjustments[node_id.adjustment_index()] * tree.weight);
        } else {
            if current_depth >= depth {
                return None; // not balanced
            }
            let node = &tree.split_nodes[node_id.split_node_index()];
            if layer_splits.len() == current_depth {
                layer_splits.push(node.condition.clone());
            } else if *layer_splits[current_depth] != *node.condition {
                return None; // different splits in one layer
            }
            stack.push((node.child_if_true, current_depth + 1));
            stack.push((node.child_if_false, current_depth + 1));
        }
    }

    Some(ObliviousDecisionTree {
        tag: tree.tag,
        layer_splits,
        adjustments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::{interval_split, DecisionTree, SplitNode};

    const INF: f32 = f32::INFINITY;

    fn s(index: usize) -> TreeNodeId {
        TreeNodeId::split_node(index)
    }

    fn a(index: usize) -> TreeNodeId {
        TreeNodeId::adjustment(index)
    }

    #[test]
    fn test_not_power_of_two_regions() {
        let tree = DecisionTree {
            split_nodes: vec![
                SplitNode::new(a(0), s(1), interval_split(0, -INF, 1.0)),
                SplitNode::new(a(1), a(2), interval_split(0, -1.0, INF)),
            ],
            adjustments: vec![0.0, 1.0, 2.0],
            ..Default::default()
        };
        assert!(to_oblivious_tree(&tree).is_none());
    }

    #[test]
    fn test_not_balanced() {
        let tree = DecisionTree {
            split_nodes: vec![
                SplitNode::new(a(0), s(1), interval_split(0, -INF, 1.0)),
                SplitNode::new(s(2), a(2), interval_split(0, -1.0, INF)),
                SplitNode::new(a(1), a(3), interval_split(0, -1.0, INF)),
            ],
            adjustments: vec![0.0, 1.0, 2.0, 3.0],
            ..Default::default()
        };
        assert!(to_oblivious_tree(&tree).is_none());
    }

    #[test]
    fn test_different_splits_in_one_layer() {
        let tree = DecisionTree {
            split_nodes: vec![
                SplitNode::new(s(2), s(1), interval_split(0, -INF, 1.0)),
                SplitNode::new(a(1), a(2), interval_split(0, -1.0, INF)),
                SplitNode::new(a(0), a(3), interval_split(0, 1.0, INF)),
            ],
            adjustments: vec![0.0, 1.0, 2.0, 3.0],
            ..Default::default()
        };
        assert!(to_oblivious_tree(&tree).is_none());
    }

    #[test]
    fn test_depth_zero_with_weight() {
        let tree = DecisionTree {
            adjustments: vec![2.0],
            weight: 0.5,
            ..Default::default()
        };
        let view = to_oblivious_tree(&tree).unwrap();
        assert!(view.layer_splits.is_empty());
        assert_eq!(view.adjustments, vec![1.0]);
    }

    #[test]
    fn test_depth_one_with_weight() {
        let tree = DecisionTree {
            split_nodes: vec![SplitNode::new(a(0), a(1), interval_split(0, -INF, 1.0))],
            adjustments: vec![7.0, 3.0],
            weight: 2.0,
            ..Default::default()
        };
        let view = to_oblivious_tree(&tree).unwrap();
        assert_eq!(view.layer_splits.len(), 1);
        assert_eq!(*view.layer_splits[0], *interval_split(0, -INF, 1.0));
        assert_eq!(view.adjustments, vec![14.0, 6.0]);
    }

    #[test]
    fn test_depth_two_leaf_order() {
        let tree = DecisionTree {
            split_nodes: vec![
                SplitNode::new(s(2), s(1), interval_split(0, -INF, 1.0)),
                SplitNode::new(a(1), a(2), interval_split(0, -1.0, INF)),
                SplitNode::new(a(0), a(3), interval_split(0, -1.0, INF)),
            ],
            adjustments: vec![0.0, 1.0, 2.0, 3.0],
            ..Default::default()
        };
        let view = to_oblivious_tree(&tree).unwrap();
        assert_eq!(view.layer_splits.len(), 2);
        assert_eq!(*view.layer_splits[0], *interval_split(0, -INF, 1.0));
        assert_eq!(*view.layer_splits[1], *interval_split(0, -1.0, INF));
        assert_eq!(view.adjustments, vec![0.0, 3.0, 1.0, 2.0]);
    }
}
