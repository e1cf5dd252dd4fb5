//! Random forest generators and slot helpers for tests and benchmarks.

use std::sync::Arc;

use rand::Rng;

use crate::collections::DenseArrayBuilder;
use crate::errors::{ForestError, Result};
use crate::forest::decision_forest::DecisionForest;
use crate::forest::decision_tree::{DecisionTree, SplitNode, TreeNodeId};
use crate::forest::split_condition::{
    interval_split, set_of_values_split_i64, SplitCondition,
};
use crate::mem::{Frame, FrameLayoutBuilder, TypedSlot};
use crate::types::ValueType;

const SET_OF_VALUES_SIZE: usize = 10;

/// Creates a tree layer by layer. The condition factory is called once per
/// node in creation order.
fn create_random_tree_impl<R: Rng + ?Sized>(
    rng: &mut R,
    num_features: usize,
    interactions: bool,
    num_splits: usize,
    mut condition_factory: impl FnMut(&mut R, usize) -> Arc<SplitCondition>,
) -> DecisionTree {
    let mut tree = DecisionTree {
        adjustments: (0..num_splits + 1)
            .map(|_| rng.gen_range(0u32..256) as f32)
            .collect(),
        ..Default::default()
    };
    let single_feature_id = rng.gen_range(0..num_features);
    for i in 0..num_splits {
        let child = |index: usize| {
            if index < num_splits {
                TreeNodeId::split_node(index)
            } else {
                TreeNodeId::adjustment(index - num_splits)
            }
        };
        let feature_id = if interactions {
            rng.gen_range(0..num_features)
        } else {
            single_feature_id
        };
        tree.split_nodes.push(SplitNode::new(
            child(i * 2 + 1),
            child(i * 2 + 2),
            condition_factory(rng, feature_id),
        ));
    }
    tree
}

/// Fills a scalar input slot with a random optional value.
pub fn fill_with_random_value<R: Rng + ?Sized>(
    slot: TypedSlot,
    frame: &mut Frame,
    rng: &mut R,
    missed_prob: f64,
) -> Result<()> {
    if slot.is_uninitialized() {
        return Ok(());
    }
    let missed = rng.gen_bool(missed_prob);
    match slot.value_type() {
        ValueType::OptionalFloat => {
            let value = if missed {
                None
            } else {
                Some(rng.gen_range(0.0f32..1.0))
            };
            frame.set(slot.to_slot::<Option<f32>>()?, value);
        }
        ValueType::OptionalLong => {
            let value = if missed {
                None
            } else {
                Some(rng.gen_range(0i64..1000))
            };
            frame.set(slot.to_slot::<Option<i64>>()?, value);
        }
        other => {
            return Err(ForestError::invalid_argument(format!(
                "random fill is not supported for type {other}"
            )));
        }
    }
    Ok(())
}

/// Fills a columnar input slot with a random array of the given size.
pub fn fill_array_with_random_values<R: Rng + ?Sized>(
    size: usize,
    slot: TypedSlot,
    frame: &mut Frame,
    rng: &mut R,
    missed_prob: f64,
) -> Result<()> {
    if slot.is_uninitialized() {
        return Ok(());
    }
    match slot.value_type() {
        ValueType::FloatArray => {
            let mut builder = DenseArrayBuilder::new(size);
            for i in 0..size {
                if !rng.gen_bool(missed_prob) {
                    builder.set(i, rng.gen_range(0.0f32..1.0));
                }
            }
            frame.set(slot.to_slot()?, builder.build());
        }
        ValueType::LongArray => {
            let mut builder = DenseArrayBuilder::new(size);
            for i in 0..size {
                if !rng.gen_bool(missed_prob) {
                    builder.set(i, rng.gen_range(0i64..1000));
                }
            }
            frame.set(slot.to_slot()?, builder.build());
        }
        other => {
            return Err(ForestError::invalid_argument(format!(
                "random fill is not supported for type {other}"
            )));
        }
    }
    Ok(())
}

/// Adds one scalar slot per required forest input; unused input ids get
/// uninitialized placeholders.
pub fn create_slots_for_forest(
    forest: &DecisionForest,
    layout_builder: &mut FrameLayoutBuilder,
    slots: &mut Vec<TypedSlot>,
) {
    for (&id, &value_type) in forest.required_types() {
        while slots.len() <= id {
            slots.push(TypedSlot::uninitialized());
        }
        slots[id] = layout_builder.add_typed_slot(value_type);
    }
}

/// Adds one columnar slot per required forest input. A forest without inputs
/// gets a single float array slot so that batched evaluation can derive the
/// row count.
pub fn create_array_slots_for_forest(
    forest: &DecisionForest,
    layout_builder: &mut FrameLayoutBuilder,
    slots: &mut Vec<TypedSlot>,
) -> Result<()> {
    for (&id, &value_type) in forest.required_types() {
        while slots.len() <= id {
            slots.push(TypedSlot::uninitialized());
        }
        slots[id] = match value_type {
            ValueType::OptionalFloat => layout_builder.add_typed_slot(ValueType::FloatArray),
            ValueType::OptionalLong => layout_builder.add_typed_slot(ValueType::LongArray),
            other => {
                return Err(ForestError::invalid_argument(format!(
                    "batched slots are not supported for type {other}"
                )));
            }
        };
    }
    if slots.is_empty() {
        slots.push(layout_builder.add_typed_slot(ValueType::FloatArray));
    }
    Ok(())
}

fn uniform_split_count<R: Rng + ?Sized>(rng: &mut R, min: usize, max: usize) -> usize {
    if max > min {
        rng.gen_range(min..max)
    } else {
        min
    }
}

/// Creates a random tree with interval conditions only.
pub fn create_random_float_tree<R: Rng + ?Sized>(
    rng: &mut R,
    num_features: usize,
    interactions: bool,
    num_splits: usize,
    range_split_prob: f64,
    equality_split_prob: f64,
) -> DecisionTree {
    create_random_tree_impl(rng, num_features, interactions, num_splits, |rng, feature_id| {
        let split_type: f64 = rng.gen_range(0.0..1.0);
        if split_type < range_split_prob + equality_split_prob {
            let sp0 = rng.gen_range(0u32..256) as f32 / 256.0;
            let sp1 = if split_type < range_split_prob {
                rng.gen_range(0u32..256) as f32 / 256.0
            } else {
                sp0
            };
            interval_split(feature_id, sp0.min(sp1), sp0.max(sp1))
        } else {
            let split_point = rng.gen_range(0u32..256) as f32 / 256.0;
            if rng.gen_bool(0.5) {
                interval_split(feature_id, f32::NEG_INFINITY, split_point)
            } else {
                interval_split(feature_id, split_point, f32::INFINITY)
            }
        }
    })
}

/// Creates a random forest with interval conditions only.
pub fn create_random_float_forest<R: Rng + ?Sized>(
    rng: &mut R,
    num_features: usize,
    interactions: bool,
    min_num_splits: usize,
    max_num_splits: usize,
    num_trees: usize,
) -> DecisionForest {
    let trees = (0..num_trees)
        .map(|_| {
            let num_splits = uniform_split_count(rng, min_num_splits, max_num_splits);
            create_random_float_tree(rng, num_features, interactions, num_splits, 0.0, 0.0)
        })
        .collect();
    DecisionForest::from_trees(trees).expect("generated forest is valid")
}

fn random_condition<R: Rng + ?Sized>(
    rng: &mut R,
    feature_id: usize,
    feature_types: &mut [Option<ValueType>],
) -> Arc<SplitCondition> {
    let value_type = feature_types[feature_id].get_or_insert_with(|| {
        if rng.gen_bool(0.5) {
            ValueType::OptionalFloat
        } else {
            ValueType::OptionalLong
        }
    });
    if *value_type == ValueType::OptionalFloat {
        let split_point = rng.gen_range(0u32..256) as f32 / 256.0;
        if rng.gen_bool(0.5) {
            interval_split(feature_id, f32::NEG_INFINITY, split_point)
        } else {
            interval_split(feature_id, split_point, f32::INFINITY)
        }
    } else {
        let values: Vec<i64> = (0..SET_OF_VALUES_SIZE)
            .map(|_| rng.gen_range(0i64..1000))
            .collect();
        set_of_values_split_i64(feature_id, values, rng.gen_bool(0.5))
    }
}

/// Creates a random tree over mixed float and i64 features. Feature types
/// are chosen lazily and recorded in `feature_types` so subsequent trees
/// agree with earlier ones.
pub fn create_random_tree<R: Rng + ?Sized>(
    rng: &mut R,
    interactions: bool,
    num_splits: usize,
    feature_types: &mut Vec<Option<ValueType>>,
) -> DecisionTree {
    let num_features = feature_types.len();
    create_random_tree_impl(rng, num_features, interactions, num_splits, |rng, feature_id| {
        random_condition(rng, feature_id, feature_types)
    })
}

/// Creates a random oblivious tree of the given depth: every node of one
/// layer shares the same condition.
pub fn create_random_oblivious_tree<R: Rng + ?Sized>(
    rng: &mut R,
    depth: usize,
    feature_types: &mut Vec<Option<ValueType>>,
) -> DecisionTree {
    let conditions: Vec<Arc<SplitCondition>> = (0..depth)
        .map(|_| {
            let feature_id = rng.gen_range(0..feature_types.len());
            random_condition(rng, feature_id, feature_types)
        })
        .collect();
    let mut cond_id = 0;
    let mut node_id = 0usize;
    create_random_tree_impl(
        rng,
        feature_types.len(),
        false,
        (1 << depth) - 1,
        |_rng, _feature_id| {
            node_id += 1;
            let condition = conditions[cond_id].clone();
            // The last node of a layer has node_id = 2^k - 1.
            if node_id & (node_id + 1) == 0 {
                cond_id += 1;
            }
            condition
        },
    )
}

/// Creates a balanced random forest with mixed split-condition kinds.
pub fn create_random_forest<R: Rng + ?Sized>(
    rng: &mut R,
    num_features: usize,
    interactions: bool,
    min_num_splits: usize,
    max_num_splits: usize,
    num_trees: usize,
) -> DecisionForest {
    let mut feature_types = vec![None; num_features];
    let trees = (0..num_trees)
        .map(|_| {
            let num_splits = uniform_split_count(rng, min_num_splits, max_num_splits);
            create_random_tree(rng, interactions, num_splits, &mut feature_types)
        })
        .collect();
    DecisionForest::from_trees(trees).expect("generated forest is valid")
}
