//! DecisionForest - validated immutable tree ensembles
//!
//! A forest is built once from a vector of trees, validated during
//! construction, and never mutated afterwards. Construction derives the
//! required input types, the submodel/step counters and a content
//! fingerprint; evaluators are compiled from the forest separately.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use log::debug;

use crate::errors::{ForestError, Result};
use crate::forest::decision_tree::{DecisionTree, TreeFilter, TreeNodeId};
use crate::mem::{Frame, TypedSlot};
use crate::types::ValueType;
use crate::util::{Fingerprint, FingerprintHasher};

/// An immutable, validated ensemble of decision trees.
///
/// # Examples
///
/// ```
/// use rust_dfe::forest::{
///     interval_split, DecisionForest, DecisionTree, SplitNode, TreeNodeId,
/// };
///
/// let tree = DecisionTree {
///     split_nodes: vec![SplitNode::new(
///         TreeNodeId::adjustment(0),
///         TreeNodeId::adjustment(1),
///         interval_split(0, 1.0, 5.0),
///     )],
///     adjustments: vec![-1.0, 1.0],
///     ..Default::default()
/// };
/// let forest = DecisionForest::from_trees(vec![tree]).unwrap();
/// assert_eq!(forest.submodel_count(), 1);
/// ```
#[derive(Debug)]
pub struct DecisionForest {
    trees: Vec<DecisionTree>,
    required_types: BTreeMap<usize, ValueType>,
    fingerprint: Fingerprint,
    submodel_count: usize,
    step_count: usize,
}

impl DecisionForest {
    /// Validates the trees and assembles a forest.
    pub fn from_trees(trees: Vec<DecisionTree>) -> Result<DecisionForest> {
        let mut required_types = BTreeMap::new();
        for tree in &trees {
            validate_tree(tree)?;
            for node in &tree.split_nodes {
                for signature in node.condition.input_signatures() {
                    let entry = required_types
                        .entry(signature.id)
                        .or_insert(signature.value_type);
                    if *entry != signature.value_type {
                        return Err(ForestError::invalid_argument(format!(
                            "types mismatch in decision forest: input #{} is used as {} and as {}",
                            signature.id, entry, signature.value_type
                        )));
                    }
                }
            }
        }

        let submodel_count = trees
            .iter()
            .map(|t| t.tag.submodel_id + 1)
            .max()
            .unwrap_or(0);
        let step_count = trees.iter().map(|t| t.tag.step + 1).max().unwrap_or(0);
        let fingerprint = compute_fingerprint(&trees);

        debug!(
            "constructed decision forest: {} trees, {} submodels, {} steps, fingerprint {}",
            trees.len(),
            submodel_count,
            step_count,
            fingerprint
        );

        Ok(DecisionForest {
            trees,
            required_types,
            fingerprint,
            submodel_count,
            step_count,
        })
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    pub fn trees_copy(&self) -> Vec<DecisionTree> {
        self.trees.clone()
    }

    /// The input types the forest reads, keyed by input id.
    pub fn required_types(&self) -> &BTreeMap<usize, ValueType> {
        &self.required_types
    }

    /// The number of submodels (max tag submodel id + 1).
    pub fn submodel_count(&self) -> usize {
        self.submodel_count
    }

    /// The number of steps (max tag step + 1).
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Checks that `slots` covers every required input with the right type.
    pub fn validate_input_slots(&self, slots: &[TypedSlot]) -> Result<()> {
        let required_count = self
            .required_types
            .keys()
            .next_back()
            .map_or(0, |id| id + 1);
        if slots.len() < required_count {
            return Err(ForestError::invalid_argument(format!(
                "not enough arguments for the decision forest: expected at least {}, got {}",
                required_count,
                slots.len()
            )));
        }
        for (&id, &value_type) in &self.required_types {
            if slots[id].value_type() != value_type {
                return Err(ForestError::invalid_argument(format!(
                    "type mismatch for input #{}: expected {}, got {}",
                    id,
                    value_type,
                    slots[id].value_type()
                )));
            }
        }
        Ok(())
    }

    /// Produces a deterministic multi-line dump of the forest.
    pub fn to_debug_string(&self) -> String {
        let mut out = String::from("DecisionForest {\n");
        for (id, value_type) in &self.required_types {
            let _ = writeln!(out, "  input #{id}: {value_type}");
        }
        for tree in &self.trees {
            write_tree_debug(tree, &mut out, "  ");
        }
        out.push('}');
        out
    }
}

/// Reference (non-optimized) evaluation: walks every accepted tree from the
/// root and sums the selected adjustments. Production code should compile a
/// `ForestEvaluator` instead; tests use this as ground truth.
pub fn naive_evaluation(
    forest: &DecisionForest,
    frame: &Frame,
    inputs: &[TypedSlot],
    filter: &TreeFilter,
) -> f32 {
    let mut result = 0.0f64;
    for tree in forest.trees() {
        if !filter.accepts(&tree.tag) {
            continue;
        }
        let mut node_id = tree.root_id();
        while !node_id.is_leaf() {
            let node = &tree.split_nodes[node_id.split_node_index()];
            node_id = if node.condition.evaluate(frame, inputs) {
                node.child_if_true
            } else {
                node.child_if_false
            };
        }
        result += (tree.adjustments[node_id.adjustment_index()] * tree.weight) as f64;
    }
    result as f32
}

/// Deterministic multi-line dump of a single tree.
pub fn tree_to_debug_string(tree: &DecisionTree) -> String {
    let mut out = String::new();
    write_tree_debug(tree, &mut out, "");
    if out.ends_with('\n') {
        out.pop();
    }
    out
}

fn write_tree_debug(tree: &DecisionTree, out: &mut String, indent: &str) {
    let _ = writeln!(out, "{indent}DecisionTree {{");
    let _ = writeln!(
        out,
        "{indent}  tag {{ step: {}   submodel_id: {} }}",
        tree.tag.step, tree.tag.submodel_id
    );
    let _ = writeln!(out, "{indent}  weight: {:.6}", tree.weight);
    let _ = writeln!(out, "{indent}  split_nodes {{");
    for (index, node) in tree.split_nodes.iter().enumerate() {
        let _ = writeln!(
            out,
            "{indent}    {index}: IF {} THEN {} ELSE {}",
            node.condition,
            format_target(node.child_if_true),
            format_target(node.child_if_false)
        );
    }
    let _ = writeln!(out, "{indent}  }}");
    let mut adjustments = String::new();
    for (i, value) in tree.adjustments.iter().enumerate() {
        if i > 0 {
            adjustments.push(' ');
        }
        let _ = write!(adjustments, "{value:.6}");
    }
    let _ = writeln!(out, "{indent}  adjustments: {adjustments}");
    let _ = writeln!(out, "{indent}}}");
}

fn format_target(id: TreeNodeId) -> String {
    if id.is_leaf() {
        format!("adjustments[{}]", id.adjustment_index())
    } else {
        format!("goto {}", id.split_node_index())
    }
}

fn validate_tree(tree: &DecisionTree) -> Result<()> {
    if tree.adjustments.len() != tree.split_nodes.len() + 1 {
        return Err(ForestError::invalid_argument(format!(
            "incorrect number of regions in tree: expected {}, got {}",
            tree.split_nodes.len() + 1,
            tree.adjustments.len()
        )));
    }
    for node in &tree.split_nodes {
        for child in [node.child_if_false, node.child_if_true] {
            if child.is_leaf() {
                if child.adjustment_index() >= tree.adjustments.len() {
                    return Err(ForestError::invalid_argument(format!(
                        "adjustment index is out of range: {} >= {}",
                        child.adjustment_index(),
                        tree.adjustments.len()
                    )));
                }
            } else if child.split_node_index() < 1
                || child.split_node_index() >= tree.split_nodes.len()
            {
                return Err(ForestError::invalid_argument(format!(
                    "split node index is out of range: {}",
                    child.split_node_index()
                )));
            }
        }
    }
    Ok(())
}

fn compute_fingerprint(trees: &[DecisionTree]) -> Fingerprint {
    let mut hasher = FingerprintHasher::new("DecisionForest");
    hasher.combine_usize(trees.len());
    for tree in trees {
        hasher
            .combine_f32(tree.weight)
            .combine_usize(tree.tag.step)
            .combine_usize(tree.tag.submodel_id)
            .combine_usize(tree.adjustments.len());
        for &adjustment in &tree.adjustments {
            hasher.combine_f32(adjustment);
        }
        hasher.combine_usize(tree.split_nodes.len());
        for node in &tree.split_nodes {
            hasher
                .combine_i64(node.child_if_false.raw_index())
                .combine_i64(node.child_if_true.raw_index());
            node.condition.combine_to_fingerprint(&mut hasher);
        }
    }
    hasher.finish()
}
