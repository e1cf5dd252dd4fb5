//! Integration tests for the pointwise forest evaluator: scenario suites
//! under every compilation-parameter set that can compile them, plus
//! randomized equivalence tests against the naive reference evaluation.

use std::collections::HashSet;
use std::sync::Arc;

use float_cmp::approx_eq;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use rust_dfe::eval::{CompilationParams, ForestEvaluator, ForestEvaluatorOutput};
use rust_dfe::forest::{
    interval_split, naive_evaluation, set_of_values_split_bytes, set_of_values_split_i64,
    testing, DecisionForest, DecisionTree, SplitCondition, SplitNode, TreeFilter, TreeNodeId,
};
use rust_dfe::mem::{FrameLayout, Slot, TypedSlot};
use rust_dfe::types::{Bytes, ValueType};

const INF: f32 = f32::INFINITY;

const DEFAULT_EVAL: CompilationParams = CompilationParams {
    enable_regular_eval: true,
    enable_bitmask_eval: true,
    enable_single_input_eval: true,
};
const REGULAR_EVAL: CompilationParams = CompilationParams {
    enable_regular_eval: true,
    enable_bitmask_eval: false,
    enable_single_input_eval: false,
};
const BITMASK_EVAL: CompilationParams = CompilationParams {
    enable_regular_eval: false,
    enable_bitmask_eval: true,
    enable_single_input_eval: false,
};
const SINGLE_INPUT_EVAL: CompilationParams = CompilationParams {
    enable_regular_eval: false,
    enable_bitmask_eval: false,
    enable_single_input_eval: true,
};

fn s(index: usize) -> TreeNodeId {
    TreeNodeId::split_node(index)
}

fn a(index: usize) -> TreeNodeId {
    TreeNodeId::adjustment(index)
}

fn submodels(ids: &[usize]) -> TreeFilter {
    TreeFilter {
        submodels: HashSet::from_iter(ids.iter().copied()),
        ..Default::default()
    }
}

#[derive(Clone)]
enum InputColumn {
    Float(Vec<Option<f32>>),
    Long(Vec<Option<i64>>),
    Bytes(Vec<Option<Bytes>>),
}

impl InputColumn {
    fn len(&self) -> usize {
        match self {
            InputColumn::Float(values) => values.len(),
            InputColumn::Long(values) => values.len(),
            InputColumn::Bytes(values) => values.len(),
        }
    }

    fn fill(&self, row: usize, slot: &TypedSlot, frame: &mut rust_dfe::mem::Frame) {
        match self {
            InputColumn::Float(values) => {
                frame.set(slot.to_slot().unwrap(), values[row]);
            }
            InputColumn::Long(values) => {
                frame.set(slot.to_slot().unwrap(), values[row]);
            }
            InputColumn::Bytes(values) => {
                frame.set(slot.to_slot().unwrap(), values[row].clone());
            }
        }
    }
}

/// Compiles the forest with the given params, evaluates every row of
/// `inputs` (one column per forest input id), and compares each group's
/// output with `expected_outputs[row]`.
fn test_cases(
    forest: &DecisionForest,
    groups: &[TreeFilter],
    params: CompilationParams,
    expected_outputs: &[Vec<f32>],
    inputs: &[InputColumn],
    context: &str,
) {
    for column in inputs {
        assert_eq!(column.len(), expected_outputs.len(), "{context}: bad test data");
    }

    let mut layout_builder = FrameLayout::builder();
    let mut input_slots = Vec::new();
    testing::create_slots_for_forest(forest, &mut layout_builder, &mut input_slots);
    let outputs: Vec<ForestEvaluatorOutput> = groups
        .iter()
        .map(|filter| ForestEvaluatorOutput {
            filter: filter.clone(),
            slot: layout_builder.add_slot::<f32>(),
        })
        .collect();
    let layout = layout_builder.build();

    let evaluator = ForestEvaluator::compile(forest, &input_slots, &outputs, params)
        .unwrap_or_else(|e| panic!("{context}: compilation failed: {e}"));

    let mut frame = layout.alloc();
    for row in 0..expected_outputs.len() {
        for (input_id, column) in inputs.iter().enumerate() {
            if input_id >= input_slots.len() || input_slots[input_id].is_uninitialized() {
                continue;
            }
            column.fill(row, &input_slots[input_id], &mut frame);
        }
        evaluator.eval(&mut frame);
        for (group_id, output) in outputs.iter().enumerate() {
            assert_eq!(
                *frame.get(output.slot),
                expected_outputs[row][group_id],
                "{context}: incorrect output for group #{group_id}, row {row}, \
                 params {params:?}"
            );
        }
    }
}

fn two_group_forest() -> DecisionForest {
    let tree0 = DecisionTree {
        split_nodes: vec![
            SplitNode::new(s(1), s(2), interval_split(0, 1.5, INF)),
            SplitNode::new(a(0), a(2), set_of_values_split_i64(1, [1, 2], false)),
            SplitNode::new(a(1), a(3), interval_split(0, -INF, 10.0)),
        ],
        adjustments: vec![0.5, 1.5, 2.5, 3.5],
        ..Default::default()
    };
    let mut tree1 = DecisionTree {
        split_nodes: vec![SplitNode::new(a(0), a(1), interval_split(0, 1.0, 5.0))],
        adjustments: vec![-1.0, 1.0],
        ..Default::default()
    };
    tree1.tag.submodel_id = 1;
    DecisionForest::from_trees(vec![tree0, tree1]).unwrap()
}

#[test]
fn test_groups_validation() {
    let mut trees: Vec<DecisionTree> = Vec::new();
    for submodel_id in [3, 2, 1] {
        let mut tree = DecisionTree {
            adjustments: vec![1.0],
            ..Default::default()
        };
        tree.tag.submodel_id = submodel_id;
        trees.push(tree);
    }
    let forest = DecisionForest::from_trees(trees).unwrap();
    let fake_slot = Slot::<f32>::uninitialized();

    let err = ForestEvaluator::compile(&forest, &[], &[], CompilationParams::default())
        .unwrap_err();
    assert!(err.to_string().contains("at least one output is expected"));

    let err = ForestEvaluator::compile(
        &forest,
        &[],
        &[
            ForestEvaluatorOutput {
                filter: submodels(&[1, 3]),
                slot: fake_slot,
            },
            ForestEvaluatorOutput {
                filter: submodels(&[2, 3]),
                slot: fake_slot,
            },
        ],
        CompilationParams::default(),
    )
    .unwrap_err();
    assert!(err
        .to_string()
        .contains("intersection of groups for outputs #0 and #1 is not empty"));

    assert!(ForestEvaluator::compile(
        &forest,
        &[],
        &[
            ForestEvaluatorOutput {
                filter: submodels(&[1, 3]),
                slot: fake_slot,
            },
            ForestEvaluatorOutput {
                filter: submodels(&[2]),
                slot: fake_slot,
            },
        ],
        CompilationParams::default(),
    )
    .is_ok());

    // submodel_id = 3 is matched by no group and silently skipped.
    assert!(ForestEvaluator::compile(
        &forest,
        &[],
        &[
            ForestEvaluatorOutput {
                filter: submodels(&[1]),
                slot: fake_slot,
            },
            ForestEvaluatorOutput {
                filter: submodels(&[2]),
                slot: fake_slot,
            },
        ],
        CompilationParams::default(),
    )
    .is_ok());
}

#[test]
fn test_empty_forest() {
    let forest = DecisionForest::from_trees(Vec::new()).unwrap();
    for params in [DEFAULT_EVAL, REGULAR_EVAL, BITMASK_EVAL, SINGLE_INPUT_EVAL] {
        test_cases(
            &forest,
            &[submodels(&[0]), submodels(&[1])],
            params,
            &[vec![0.0, 0.0]],
            &[],
            "empty forest",
        );
    }
}

#[test]
fn test_constant_forest() {
    let mut tree0 = DecisionTree {
        adjustments: vec![1.5],
        ..Default::default()
    };
    tree0.tag.submodel_id = 0;
    let mut tree1 = DecisionTree {
        adjustments: vec![2.5],
        ..Default::default()
    };
    tree1.tag.submodel_id = 1;
    let forest = DecisionForest::from_trees(vec![tree0, tree1]).unwrap();
    for params in [DEFAULT_EVAL, REGULAR_EVAL, BITMASK_EVAL] {
        test_cases(
            &forest,
            &[submodels(&[0]), submodels(&[1])],
            params,
            &[vec![1.5, 2.5]],
            &[],
            "constant forest",
        );
    }
}

#[test]
fn test_small_forest() {
    let forest = two_group_forest();
    for params in [DEFAULT_EVAL, REGULAR_EVAL, BITMASK_EVAL] {
        test_cases(
            &forest,
            &[submodels(&[0]), submodels(&[1])],
            params,
            &[
                vec![0.5, -1.0],
                vec![2.5, -1.0],
                vec![2.5, 1.0],
                vec![3.5, 1.0],
                vec![3.5, -1.0],
                vec![1.5, -1.0],
                vec![2.5, -1.0],
                vec![0.5, -1.0],
            ],
            &[
                InputColumn::Float(vec![
                    Some(0.0),
                    Some(0.0),
                    Some(1.2),
                    Some(1.6),
                    Some(7.0),
                    Some(13.5),
                    Some(f32::NAN),
                    None,
                ]),
                InputColumn::Long(vec![
                    Some(3),
                    Some(1),
                    Some(1),
                    Some(1),
                    Some(1),
                    Some(1),
                    Some(1),
                    None,
                ]),
            ],
            "small forest",
        );
    }
}

#[test]
fn test_ranges_splits() {
    let tree = DecisionTree {
        split_nodes: vec![
            SplitNode::new(s(2), s(1), interval_split(0, -1.0, 1.0)),
            SplitNode::new(a(1), a(2), interval_split(0, 0.5, 0.5)),
            SplitNode::new(a(0), a(3), interval_split(0, 2.5, 3.5)),
        ],
        adjustments: vec![0.0, 1.0, 2.0, 3.0],
        ..Default::default()
    };
    let forest = DecisionForest::from_trees(vec![tree]).unwrap();
    for params in [DEFAULT_EVAL, REGULAR_EVAL, BITMASK_EVAL, SINGLE_INPUT_EVAL] {
        test_cases(
            &forest,
            &[TreeFilter::default()],
            params,
            &[
                vec![0.0],
                vec![0.0],
                vec![0.0],
                vec![1.0],
                vec![2.0],
                vec![3.0],
                vec![3.0],
                vec![3.0],
            ],
            &[InputColumn::Float(vec![
                None,
                Some(-5.0),
                Some(5.0),
                Some(-1.0),
                Some(0.5),
                Some(2.5),
                Some(3.0),
                Some(3.5),
            ])],
            "ranges splits",
        );
    }
}

#[test]
fn test_equal_splits() {
    let tree = DecisionTree {
        split_nodes: vec![
            SplitNode::new(s(2), s(1), interval_split(0, 1.0, 1.0)),
            SplitNode::new(a(1), a(2), interval_split(1, 5.0, 5.0)),
            SplitNode::new(a(0), a(3), interval_split(1, -5.0, -5.0)),
        ],
        adjustments: vec![0.0, 1.0, 2.0, 3.0],
        ..Default::default()
    };
    let forest = DecisionForest::from_trees(vec![tree]).unwrap();
    for params in [DEFAULT_EVAL, REGULAR_EVAL, BITMASK_EVAL] {
        test_cases(
            &forest,
            &[TreeFilter::default()],
            params,
            &[
                vec![0.0],
                vec![0.0],
                vec![0.0],
                vec![1.0],
                vec![1.0],
                vec![2.0],
                vec![3.0],
                vec![3.0],
            ],
            &[
                InputColumn::Float(vec![
                    None,
                    Some(0.0),
                    Some(-5.0),
                    Some(1.0),
                    Some(1.0),
                    Some(1.0),
                    Some(0.0),
                    None,
                ]),
                InputColumn::Float(vec![
                    None,
                    None,
                    None,
                    None,
                    Some(-5.0),
                    Some(5.0),
                    Some(-5.0),
                    Some(-5.0),
                ]),
            ],
            "equal splits",
        );
    }
}

#[test]
fn test_bytes_input() {
    let tree = DecisionTree {
        split_nodes: vec![SplitNode::new(
            a(0),
            a(1),
            set_of_values_split_bytes(0, [Bytes::from("X")], false),
        )],
        adjustments: vec![0.0, 1.0],
        ..Default::default()
    };
    let forest = DecisionForest::from_trees(vec![tree]).unwrap();
    for params in [DEFAULT_EVAL, REGULAR_EVAL] {
        test_cases(
            &forest,
            &[TreeFilter::default()],
            params,
            &[vec![0.0], vec![1.0], vec![0.0]],
            &[InputColumn::Bytes(vec![
                None,
                Some(Bytes::from("X")),
                Some(Bytes::from("Y")),
            ])],
            "bytes input",
        );
    }
}

#[test]
fn test_bitmask_not_possible_for_large_tree() {
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let forest = testing::create_random_forest(&mut rng, 10, true, 70, 70, 1);

    let mut layout_builder = FrameLayout::builder();
    let mut input_slots = Vec::new();
    testing::create_slots_for_forest(&forest, &mut layout_builder, &mut input_slots);
    let output = ForestEvaluatorOutput {
        filter: TreeFilter::default(),
        slot: layout_builder.add_slot::<f32>(),
    };
    let layout = layout_builder.build();

    let err = ForestEvaluator::compile(&forest, &input_slots, &[output.clone()], BITMASK_EVAL)
        .unwrap_err();
    assert!(err
        .to_string()
        .contains("No suitable evaluator. Use enable_regular_eval=true."));

    // The default configuration must fall back to the regular evaluator and
    // match the reference implementation.
    let evaluator =
        ForestEvaluator::compile(&forest, &input_slots, &[output.clone()], DEFAULT_EVAL).unwrap();
    let mut frame = layout.alloc();
    for _ in 0..10 {
        for slot in &input_slots {
            testing::fill_with_random_value(*slot, &mut frame, &mut rng, 0.25).unwrap();
        }
        evaluator.eval(&mut frame);
        let reference =
            naive_evaluation(&forest, &frame, &input_slots, &TreeFilter::default());
        let result = *frame.get(output.slot);
        assert!(
            approx_eq!(f32, result, reference, epsilon = 1e-4, ulps = 16),
            "large tree: {result} vs reference {reference}"
        );
    }
}

#[test]
fn test_single_input_eval_not_possible() {
    let tree = DecisionTree {
        split_nodes: vec![
            SplitNode::new(s(2), s(1), interval_split(0, 1.0, 1.0)),
            SplitNode::new(a(1), a(2), interval_split(1, 5.0, 5.0)),
            SplitNode::new(a(0), a(3), interval_split(1, -5.0, -5.0)),
        ],
        adjustments: vec![0.0, 1.0, 2.0, 3.0],
        ..Default::default()
    };
    let forest = DecisionForest::from_trees(vec![tree]).unwrap();
    let mut layout_builder = FrameLayout::builder();
    let mut input_slots = Vec::new();
    testing::create_slots_for_forest(&forest, &mut layout_builder, &mut input_slots);
    let output = ForestEvaluatorOutput {
        filter: TreeFilter::default(),
        slot: layout_builder.add_slot::<f32>(),
    };
    let err = ForestEvaluator::compile(&forest, &input_slots, &[output], SINGLE_INPUT_EVAL)
        .unwrap_err();
    assert!(err
        .to_string()
        .contains("No suitable evaluator. Use enable_regular_eval=true."));
}

#[test]
fn test_oblivious_tree_with_mixed_conditions() {
    let conditions: Vec<Arc<SplitCondition>> = vec![
        interval_split(0, -5.0, 5.0),
        interval_split(1, 0.0, INF),
        set_of_values_split_i64(2, [1, 2], false),
        interval_split(3, -INF, 3.0),
        set_of_values_split_i64(4, [4, 2], true),
        interval_split(5, -1.0, 7.0),
        interval_split(6, -INF, -5.0),
    ];
    let mut tree = DecisionTree::default();
    let mut layer_size = 1usize;
    for (layer, condition) in conditions.iter().enumerate() {
        let layer_offset = tree.split_nodes.len() + layer_size;
        let last_layer = layer == conditions.len() - 1;
        for i in 0..layer_size {
            let left = if last_layer {
                a(i * 2)
            } else {
                s(layer_offset + i * 2)
            };
            let right = if last_layer {
                a(i * 2 + 1)
            } else {
                s(layer_offset + i * 2 + 1)
            };
            tree.split_nodes.push(SplitNode::new(left, right, condition.clone()));
        }
        layer_size *= 2;
    }
    tree.adjustments = (0..layer_size).map(|i| i as f32).collect();
    let forest = DecisionForest::from_trees(vec![tree]).unwrap();

    for params in [DEFAULT_EVAL, REGULAR_EVAL, BITMASK_EVAL] {
        test_cases(
            &forest,
            &[TreeFilter::default()],
            params,
            &[vec![58.0], vec![86.0], vec![12.0], vec![39.0], vec![112.0]],
            &[
                InputColumn::Float(vec![None, Some(3.0), Some(-7.0), Some(15.0), Some(-4.0)]),
                InputColumn::Float(vec![Some(10.0), Some(-1.0), None, Some(25.0), Some(1.0)]),
                InputColumn::Long(vec![Some(2), Some(1), Some(3), None, Some(1)]),
                InputColumn::Float(vec![Some(0.0), None, Some(-5.0), Some(8.0), Some(14.0)]),
                InputColumn::Long(vec![Some(1), Some(2), None, Some(4), Some(5)]),
                InputColumn::Float(vec![Some(0.0), Some(4.0), Some(-3.0), Some(7.0), None]),
                InputColumn::Float(vec![Some(10.0), Some(5.0), Some(-3.0), Some(-8.0), None]),
            ],
            "oblivious tree",
        );
    }
}

#[test]
fn test_group_partition_sums() {
    let forest = two_group_forest();
    let mut layout_builder = FrameLayout::builder();
    let mut input_slots = Vec::new();
    testing::create_slots_for_forest(&forest, &mut layout_builder, &mut input_slots);
    let out0 = layout_builder.add_slot::<f32>();
    let out1 = layout_builder.add_slot::<f32>();
    let out_all = layout_builder.add_slot::<f32>();
    let layout = layout_builder.build();

    let grouped = ForestEvaluator::compile(
        &forest,
        &input_slots,
        &[
            ForestEvaluatorOutput {
                filter: submodels(&[0]),
                slot: out0,
            },
            ForestEvaluatorOutput {
                filter: submodels(&[1]),
                slot: out1,
            },
        ],
        CompilationParams::default(),
    )
    .unwrap();
    let combined = ForestEvaluator::compile(
        &forest,
        &input_slots,
        &[ForestEvaluatorOutput {
            filter: TreeFilter::default(),
            slot: out_all,
        }],
        CompilationParams::default(),
    )
    .unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut frame = layout.alloc();
    for _ in 0..20 {
        for slot in &input_slots {
            testing::fill_with_random_value(*slot, &mut frame, &mut rng, 0.25).unwrap();
        }
        grouped.eval(&mut frame);
        combined.eval(&mut frame);
        let partitioned_sum = *frame.get(out0) + *frame.get(out1);
        let union_sum = *frame.get(out_all);
        assert!(
            approx_eq!(f32, partitioned_sum, union_sum, epsilon = 1e-4, ulps = 16),
            "partitioned {partitioned_sum} vs union {union_sum}"
        );
    }
}

fn random_test_against_reference(
    mut trees: Vec<DecisionTree>,
    params_list: &[CompilationParams],
    rng: &mut ChaCha8Rng,
    context: &str,
) {
    let _ = env_logger::builder().is_test(true).try_init();
    for (i, tree) in trees.iter_mut().enumerate() {
        tree.tag.submodel_id = i % 4;
    }
    let group0 = submodels(&[0, 3]);
    let group1 = submodels(&[1, 2]);
    let forest = DecisionForest::from_trees(trees).unwrap();

    let mut layout_builder = FrameLayout::builder();
    let mut input_slots = Vec::new();
    testing::create_slots_for_forest(&forest, &mut layout_builder, &mut input_slots);
    let out0 = layout_builder.add_slot::<f32>();
    let out1 = layout_builder.add_slot::<f32>();
    let layout = layout_builder.build();

    let outputs = [
        ForestEvaluatorOutput {
            filter: group0.clone(),
            slot: out0,
        },
        ForestEvaluatorOutput {
            filter: group1.clone(),
            slot: out1,
        },
    ];
    let evaluators: Vec<ForestEvaluator> = params_list
        .iter()
        .map(|&params| {
            ForestEvaluator::compile(&forest, &input_slots, &outputs, params)
                .unwrap_or_else(|e| panic!("{context}: compilation failed: {e}"))
        })
        .collect();

    let mut frame = layout.alloc();
    for item_id in 0..15 {
        for slot in &input_slots {
            testing::fill_with_random_value(*slot, &mut frame, rng, 0.25).unwrap();
        }
        let reference0 = naive_evaluation(&forest, &frame, &input_slots, &group0);
        let reference1 = naive_evaluation(&forest, &frame, &input_slots, &group1);
        for (eval_id, evaluator) in evaluators.iter().enumerate() {
            frame.set(out0, 0.0);
            frame.set(out1, 0.0);
            evaluator.eval(&mut frame);
            let result0 = *frame.get(out0);
            let result1 = *frame.get(out1);
            assert!(
                approx_eq!(f32, result0, reference0, epsilon = 1e-4, ulps = 16),
                "{context}: incorrect output #0: {result0} vs {reference0} \
                 (params #{eval_id}, row {item_id})"
            );
            assert!(
                approx_eq!(f32, result1, reference1, epsilon = 1e-4, ulps = 16),
                "{context}: incorrect output #1: {result1} vs {reference1} \
                 (params #{eval_id}, row {item_id})"
            );
        }
    }
}

fn mixed_feature_types() -> Vec<Option<ValueType>> {
    let mut types = vec![Some(ValueType::OptionalFloat); 10];
    types.extend(vec![Some(ValueType::OptionalLong); 5]);
    types
}

#[test]
fn test_against_reference_on_small_trees() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    for iteration in 0..10 {
        let mut types = mixed_feature_types();
        let trees = (0..10)
            .map(|_| {
                let num_splits = rng.gen_range(0..32);
                testing::create_random_tree(&mut rng, true, num_splits, &mut types)
            })
            .collect();
        random_test_against_reference(
            trees,
            &[DEFAULT_EVAL, REGULAR_EVAL, BITMASK_EVAL],
            &mut rng,
            &format!("small trees, iteration {iteration}"),
        );
    }
}

#[test]
fn test_against_reference_on_single_input_trees() {
    let mut rng = ChaCha8Rng::seed_from_u64(43);
    for iteration in 0..10 {
        let mut types = mixed_feature_types();
        let trees = (0..10)
            .map(|_| {
                let num_splits = rng.gen_range(1..1024);
                testing::create_random_tree(&mut rng, false, num_splits, &mut types)
            })
            .collect();
        random_test_against_reference(
            trees,
            &[DEFAULT_EVAL, REGULAR_EVAL, SINGLE_INPUT_EVAL],
            &mut rng,
            &format!("single-input trees, iteration {iteration}"),
        );
    }
}

#[test]
fn test_against_reference_on_mixed_forests() {
    let mut rng = ChaCha8Rng::seed_from_u64(44);
    for iteration in 0..5 {
        let mut types = mixed_feature_types();
        let mut trees: Vec<DecisionTree> = Vec::new();
        // Deep trees.
        for _ in 0..10 {
            let num_splits = rng.gen_range(0..1024);
            trees.push(testing::create_random_tree(&mut rng, true, num_splits, &mut types));
        }
        // Single-feature trees (no interactions).
        for _ in 0..10 {
            let num_splits = rng.gen_range(0..1024);
            trees.push(testing::create_random_tree(&mut rng, false, num_splits, &mut types));
        }
        // Deep float trees with range and equality splits.
        for _ in 0..10 {
            let num_splits = rng.gen_range(0..1024);
            trees.push(testing::create_random_float_tree(
                &mut rng, 10, true, num_splits, 0.4, 0.4,
            ));
        }
        // Small trees that fit the bitmask evaluator.
        for _ in 0..10 {
            let num_splits = rng.gen_range(0..32);
            trees.push(testing::create_random_tree(&mut rng, true, num_splits, &mut types));
        }
        // Oblivious trees.
        for _ in 0..5 {
            let depth = rng.gen_range(1..20);
            trees.push(testing::create_random_oblivious_tree(&mut rng, depth, &mut types));
        }

        random_test_against_reference(
            trees,
            &[DEFAULT_EVAL, REGULAR_EVAL],
            &mut rng,
            &format!("mixed forest, iteration {iteration}"),
        );
    }
}
