//! ForestEvaluator - compiled pointwise evaluation of a forest.
//!
//! Compilation routes every tree to the cheapest sub-evaluator that can
//! represent it: constants are folded, single-input trees become piecewise
//! functions, small and oblivious trees go to the bitmask evaluator, and
//! everything else is flattened for the regular walkers. At eval time the
//! regular predictors write each group's sum and the other sub-evaluators
//! add into the same output slots.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use crate::errors::{ForestError, Result};
use crate::eval::pointwise::bitmask::{BitmaskBuilder, BitmaskEval, MAX_REGIONS_FOR_BITMASK};
use crate::eval::pointwise::bound_conditions::{
    BoundCondition, IntervalBoundCondition, UniversalBoundCondition,
};
use crate::eval::pointwise::oblivious::to_oblivious_tree;
use crate::eval::pointwise::predictor::{FlatSplit, FlatTree, Predictor, PredictorCompiler};
use crate::eval::pointwise::single_input::{SingleInputBuilder, SingleInputEval};
use crate::forest::{
    DecisionForest, DecisionTree, InputSignature, SplitCondition, TreeFilter, TreeTag,
};
use crate::mem::{Frame, Slot, TypedSlot};

/// Enables or disables individual sub-evaluators. Intended for benchmarks
/// and tests that force a specific algorithm; the default enables all.
#[derive(Debug, Clone, Copy)]
pub struct CompilationParams {
    pub enable_regular_eval: bool,
    pub enable_bitmask_eval: bool,
    pub enable_single_input_eval: bool,
}

impl Default for CompilationParams {
    fn default() -> Self {
        CompilationParams {
            enable_regular_eval: true,
            enable_bitmask_eval: true,
            enable_single_input_eval: true,
        }
    }
}

/// One output group: the filter selecting its trees and the float slot the
/// group sum is written to. Filters of different outputs must not intersect;
/// an empty filter selects all trees.
#[derive(Debug, Clone)]
pub struct ForestEvaluatorOutput {
    pub filter: TreeFilter,
    pub slot: Slot<f32>,
}

#[derive(Debug)]
struct RegularPredictors {
    universal: Predictor<UniversalBoundCondition>,
    interval_splits: Predictor<IntervalBoundCondition>,
}

impl RegularPredictors {
    fn predict(&self, frame: &Frame) -> f32 {
        (self.universal.predict(frame) + self.interval_splits.predict(frame)) as f32
    }
}

/// A compiled pointwise evaluator. Immutable and safely shared across
/// threads once built.
#[derive(Debug)]
pub struct ForestEvaluator {
    output_slots: Vec<Slot<f32>>,
    regular_predictors: Vec<RegularPredictors>,
    bitmask_predictor: Option<BitmaskEval>,
    single_input_predictor: SingleInputEval,
}

impl ForestEvaluator {
    pub fn compile(
        forest: &DecisionForest,
        input_slots: &[TypedSlot],
        outputs: &[ForestEvaluatorOutput],
        params: CompilationParams,
    ) -> Result<ForestEvaluator> {
        let tree_to_group = split_trees_by_groups(forest.trees(), outputs)?;
        let output_slots: Vec<Slot<f32>> = outputs.iter().map(|output| output.slot).collect();

        let mut regular_builder = RegularPredictorsBuilder::new(outputs.len(), input_slots);
        let mut bitmask_builder = BitmaskBuilder::new(input_slots, &output_slots);
        let mut single_input_builder = SingleInputBuilder::new(input_slots, &output_slots);
        let mut consts: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); outputs.len()];

        if tree_to_group.len() != forest.trees().len() {
            return Err(ForestError::internal(
                "size of tree2group doesn't match trees",
            ));
        }
        let mut counts = RoutingCounts::default();
        for (tree_id, tree) in forest.trees().iter().enumerate() {
            let Some(group_id) = tree_to_group[tree_id] else {
                continue; // tree is not used
            };
            if group_id >= outputs.len() {
                return Err(ForestError::internal("invalid tree2group mapping"));
            }

            if params.enable_regular_eval && tree.split_nodes.is_empty() {
                // Constants are merged and later re-added as one synthetic
                // tree per (group, submodel).
                *consts[group_id].entry(tree.tag.submodel_id).or_insert(0.0) +=
                    (tree.adjustments[0] * tree.weight) as f64;
                counts.consts += 1;
                continue;
            }

            if params.enable_single_input_eval {
                if let Some(signature) = single_input_signature(tree) {
                    if SingleInputBuilder::is_input_type_supported(signature.value_type) {
                        single_input_builder.add_tree(tree, signature, group_id)?;
                        counts.single_input += 1;
                        continue;
                    }
                }
            }

            if params.enable_bitmask_eval
                && tree
                    .split_nodes
                    .iter()
                    .all(BitmaskBuilder::is_split_node_supported)
            {
                if let Some(oblivious) = to_oblivious_tree(tree) {
                    if oblivious.layer_splits.len() <= MAX_REGIONS_FOR_BITMASK {
                        bitmask_builder.add_oblivious_tree(oblivious, group_id);
                        counts.oblivious += 1;
                        continue;
                    }
                }
                if tree.adjustments.len() <= MAX_REGIONS_FOR_BITMASK {
                    bitmask_builder.add_small_tree(tree, group_id);
                    counts.bitmask += 1;
                    continue;
                }
            }

            if params.enable_regular_eval {
                regular_builder.add_tree(tree, group_id)?;
                counts.regular += 1;
            } else {
                return Err(ForestError::invalid_argument(
                    "No suitable evaluator. Use enable_regular_eval=true.",
                ));
            }
        }
        for (group_id, group_consts) in consts.iter().enumerate() {
            for (&submodel_id, &value) in group_consts {
                let tree = DecisionTree {
                    adjustments: vec![value as f32],
                    tag: TreeTag {
                        step: 0,
                        submodel_id,
                    },
                    ..Default::default()
                };
                regular_builder.add_tree(&tree, group_id)?;
            }
        }

        debug!(
            "compiled forest evaluator: {} regular, {} bitmask, {} oblivious, \
             {} single-input trees, {} constants",
            counts.regular, counts.bitmask, counts.oblivious, counts.single_input, counts.consts
        );

        Ok(ForestEvaluator {
            output_slots,
            regular_predictors: regular_builder.build(),
            bitmask_predictor: bitmask_builder.build()?,
            single_input_predictor: single_input_builder.build()?,
        })
    }

    /// Evaluates the whole forest: writes each group's sum into its output
    /// slot of `frame`. An empty forest produces zeros.
    pub fn eval(&self, frame: &mut Frame) {
        for (group_id, predictors) in self.regular_predictors.iter().enumerate() {
            let value = predictors.predict(frame);
            frame.set(self.output_slots[group_id], value);
        }
        if let Some(bitmask_predictor) = &self.bitmask_predictor {
            bitmask_predictor.incremental_eval(frame);
        }
        self.single_input_predictor.incremental_eval(frame);
    }
}

#[derive(Debug, Default)]
struct RoutingCounts {
    regular: usize,
    bitmask: usize,
    oblivious: usize,
    single_input: usize,
    consts: usize,
}

fn has_only_interval_conditions(tree: &DecisionTree) -> bool {
    tree.split_nodes
        .iter()
        .all(|node| matches!(node.condition.as_ref(), SplitCondition::Interval { .. }))
}

/// Assigns every tree to at most one output group; a tree matched by two
/// filters is an error, a tree matched by none is skipped.
fn split_trees_by_groups(
    trees: &[DecisionTree],
    outputs: &[ForestEvaluatorOutput],
) -> Result<Vec<Option<usize>>> {
    if outputs.is_empty() {
        return Err(ForestError::invalid_argument(
            "at least one output is expected",
        ));
    }
    let mut tree_to_group: Vec<Option<usize>> = vec![None; trees.len()];
    for (group_id, output) in outputs.iter().enumerate() {
        for (tree_id, tree) in trees.iter().enumerate() {
            if !output.filter.accepts(&tree.tag) {
                continue;
            }
            if let Some(other_group) = tree_to_group[tree_id] {
                return Err(ForestError::invalid_argument(format!(
                    "intersection of groups for outputs #{other_group} and #{group_id} \
                     is not empty"
                )));
            }
            tree_to_group[tree_id] = Some(group_id);
        }
    }
    Ok(tree_to_group)
}

/// Returns the single input signature if every condition of the tree reads
/// the same input, `None` otherwise.
fn single_input_signature(tree: &DecisionTree) -> Option<InputSignature> {
    let mut input_signature: Option<InputSignature> = None;
    for node in &tree.split_nodes {
        let signatures = node.condition.input_signatures();
        if signatures.len() != 1 {
            return None;
        }
        if let Some(seen) = &input_signature {
            if seen.id != signatures[0].id {
                return None;
            }
        }
        input_signature = Some(signatures[0]);
    }
    input_signature
}

struct RegularPredictorsBuilder {
    input_slots: Vec<TypedSlot>,
    universal_compilers: Vec<PredictorCompiler<UniversalBoundCondition>>,
    interval_splits_compilers: Vec<PredictorCompiler<IntervalBoundCondition>>,
}

impl RegularPredictorsBuilder {
    fn new(group_count: usize, input_slots: &[TypedSlot]) -> Self {
        RegularPredictorsBuilder {
            input_slots: input_slots.to_vec(),
            universal_compilers: (0..group_count).map(|_| PredictorCompiler::new()).collect(),
            interval_splits_compilers: (0..group_count)
                .map(|_| PredictorCompiler::new())
                .collect(),
        }
    }

    fn add_tree(&mut self, tree: &DecisionTree, group_id: usize) -> Result<()> {
        if has_only_interval_conditions(tree) {
            let flat = flatten_tree(tree, |condition| {
                IntervalBoundCondition::create(condition, &self.input_slots)
            })?;
            self.interval_splits_compilers[group_id].add_tree(flat);
        } else {
            let flat = flatten_tree(tree, |condition| {
                UniversalBoundCondition::create(condition, &self.input_slots)
            })?;
            self.universal_compilers[group_id].add_tree(flat);
        }
        Ok(())
    }

    fn build(self) -> Vec<RegularPredictors> {
        self.universal_compilers
            .into_iter()
            .zip(self.interval_splits_compilers)
            .map(|(universal, interval_splits)| RegularPredictors {
                universal: universal.compile(),
                interval_splits: interval_splits.compile(),
            })
            .collect()
    }
}

/// Flattens a tree into `[internal nodes | leaves]` form: node ids are
/// reindexed so leaves occupy `[split_count, split_count + leaf_count)` and
/// leaf values carry the tree weight.
fn flatten_tree<C: BoundCondition>(
    tree: &DecisionTree,
    mut create_condition: impl FnMut(&Arc<SplitCondition>) -> Result<C>,
) -> Result<FlatTree<C>> {
    let split_count = tree.split_nodes.len();
    let mut splits = Vec::with_capacity(split_count);
    for node in &tree.split_nodes {
        let child = |id: crate::forest::TreeNodeId| {
            if id.is_leaf() {
                (id.adjustment_index() + split_count) as u32
            } else {
                id.split_node_index() as u32
            }
        };
        splits.push(FlatSplit {
            children: [child(node.child_if_false), child(node.child_if_true)],
            condition: create_condition(&node.condition)?,
        });
    }
    let leaves = tree
        .adjustments
        .iter()
        .map(|adjustment| adjustment * tree.weight)
        .collect();
    Ok(FlatTree { splits, leaves })
}
