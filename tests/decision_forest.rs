//! Integration tests for forest construction, validation, fingerprinting,
//! debug dumps, and the naive reference evaluation.

use std::collections::HashSet;

use rust_dfe::forest::{
    interval_split, naive_evaluation, set_of_values_split_i64, tree_to_debug_string,
    DecisionForest, DecisionTree, SplitNode, TreeFilter, TreeNodeId, TreeTag,
};
use rust_dfe::mem::{FrameLayout, TypedSlot};

const INF: f32 = f32::INFINITY;

fn s(index: usize) -> TreeNodeId {
    TreeNodeId::split_node(index)
}

fn a(index: usize) -> TreeNodeId {
    TreeNodeId::adjustment(index)
}

fn three_node_tree() -> DecisionTree {
    DecisionTree {
        split_nodes: vec![
            SplitNode::new(s(1), s(2), interval_split(0, 1.5, INF)),
            SplitNode::new(a(0), a(1), set_of_values_split_i64(1, [5], false)),
            SplitNode::new(a(2), a(3), interval_split(0, -INF, 10.0)),
        ],
        adjustments: vec![0.5, 1.5, 2.5, 3.5],
        ..Default::default()
    }
}

#[test]
fn test_forest_validation() {
    let tree1 = three_node_tree();

    let tree2 = DecisionTree {
        split_nodes: vec![SplitNode::new(a(0), a(1), interval_split(0, 1.5, INF))],
        adjustments: vec![1.0, 2.0],
        ..Default::default()
    };

    // Incorrect number of regions.
    let tree3 = DecisionTree {
        split_nodes: vec![SplitNode::new(a(0), a(1), interval_split(0, 1.5, INF))],
        adjustments: vec![1.0, 2.0, 3.0],
        ..Default::default()
    };

    // Type of input #1 mismatches tree1.
    let tree4 = DecisionTree {
        split_nodes: vec![SplitNode::new(a(0), a(1), interval_split(1, 1.5, INF))],
        adjustments: vec![1.0, 2.0],
        ..Default::default()
    };

    assert!(DecisionForest::from_trees(vec![tree1.clone(), tree2]).is_ok());
    let err = DecisionForest::from_trees(vec![tree1.clone(), tree3]).unwrap_err();
    assert!(err.to_string().contains("incorrect number of regions"));
    let err = DecisionForest::from_trees(vec![tree1, tree4]).unwrap_err();
    assert!(err.to_string().contains("types mismatch in decision forest"));
}

#[test]
fn test_fingerprint() {
    let tree = three_node_tree();
    let forest1 = DecisionForest::from_trees(vec![tree.clone()]).unwrap();
    let forest2 = DecisionForest::from_trees(vec![tree.clone()]).unwrap();
    assert_eq!(forest1.fingerprint(), forest2.fingerprint());

    let mut changed = tree.clone();
    changed.adjustments[1] += 0.1;
    let forest3 = DecisionForest::from_trees(vec![changed]).unwrap();
    assert_ne!(forest1.fingerprint(), forest3.fingerprint());

    let mut changed = tree.clone();
    changed.weight = 0.5;
    let forest4 = DecisionForest::from_trees(vec![changed]).unwrap();
    assert_ne!(forest1.fingerprint(), forest4.fingerprint());

    let mut changed = tree;
    changed.tag = TreeTag {
        step: 1,
        submodel_id: 0,
    };
    let forest5 = DecisionForest::from_trees(vec![changed]).unwrap();
    assert_ne!(forest1.fingerprint(), forest5.fingerprint());
}

#[test]
fn test_to_debug_string() {
    let mut constant_tree = DecisionTree {
        adjustments: vec![5.0],
        ..Default::default()
    };
    constant_tree.tag.step = 1;
    let forest =
        DecisionForest::from_trees(vec![three_node_tree(), constant_tree]).unwrap();
    assert_eq!(
        forest.to_debug_string(),
        "DecisionForest {\n\
         \x20 input #0: OPTIONAL_FLOAT32\n\
         \x20 input #1: OPTIONAL_INT64\n\
         \x20 DecisionTree {\n\
         \x20   tag { step: 0   submodel_id: 0 }\n\
         \x20   weight: 1.000000\n\
         \x20   split_nodes {\n\
         \x20     0: IF #0 in range [1.500000 inf] THEN goto 2 ELSE goto 1\n\
         \x20     1: IF #1 in set [5] THEN adjustments[1] ELSE adjustments[0]\n\
         \x20     2: IF #0 in range [-inf 10.000000] THEN adjustments[3] ELSE adjustments[2]\n\
         \x20   }\n\
         \x20   adjustments: 0.500000 1.500000 2.500000 3.500000\n\
         \x20 }\n\
         \x20 DecisionTree {\n\
         \x20   tag { step: 1   submodel_id: 0 }\n\
         \x20   weight: 1.000000\n\
         \x20   split_nodes {\n\
         \x20   }\n\
         \x20   adjustments: 5.000000\n\
         \x20 }\n\
         }"
    );
}

#[test]
fn test_tree_to_debug_string() {
    let mut tree = DecisionTree {
        adjustments: vec![5.0],
        ..Default::default()
    };
    tree.tag.step = 1;
    assert_eq!(
        tree_to_debug_string(&tree),
        "DecisionTree {\n\
         \x20 tag { step: 1   submodel_id: 0 }\n\
         \x20 weight: 1.000000\n\
         \x20 split_nodes {\n\
         \x20 }\n\
         \x20 adjustments: 5.000000\n\
         }"
    );
}

#[test]
fn test_trees_copy() {
    let forest = DecisionForest::from_trees(vec![three_node_tree()]).unwrap();
    let copy = forest.trees_copy();
    assert_eq!(copy.len(), forest.trees().len());
    let copied_forest = DecisionForest::from_trees(copy).unwrap();
    assert_eq!(copied_forest.fingerprint(), forest.fingerprint());
}

#[test]
fn test_inputs_validation() {
    let forest = DecisionForest::from_trees(vec![three_node_tree()]).unwrap();

    let mut builder = FrameLayout::builder();
    let slot_float = TypedSlot::from_slot(builder.add_slot::<Option<f32>>());
    let slot_long = TypedSlot::from_slot(builder.add_slot::<Option<i64>>());
    let _layout = builder.build();

    assert!(forest.validate_input_slots(&[slot_float, slot_long]).is_ok());
    let err = forest.validate_input_slots(&[]).unwrap_err();
    assert!(err.to_string().contains("not enough arguments"));
    let err = forest
        .validate_input_slots(&[slot_float, slot_float])
        .unwrap_err();
    assert!(err.to_string().contains("type mismatch"));
}

#[test]
fn test_naive_evaluation() {
    let mut trees = vec![three_node_tree()];
    trees.push(DecisionTree {
        adjustments: vec![5.0],
        tag: TreeTag {
            step: 1,
            submodel_id: 1,
        },
        ..Default::default()
    });
    trees.push(DecisionTree {
        adjustments: vec![2.0],
        tag: TreeTag {
            step: 2,
            submodel_id: 0,
        },
        ..Default::default()
    });
    let forest = DecisionForest::from_trees(trees).unwrap();
    assert_eq!(forest.step_count(), 3);
    assert_eq!(forest.submodel_count(), 2);

    let mut builder = FrameLayout::builder();
    let input1_slot = builder.add_slot::<Option<f32>>();
    let input2_slot = builder.add_slot::<Option<i64>>();
    let slots = vec![
        TypedSlot::from_slot(input1_slot),
        TypedSlot::from_slot(input2_slot),
    ];
    let layout = builder.build();
    let mut frame = layout.alloc();

    let all = TreeFilter::default();

    frame.set(input1_slot, Some(1.0));
    frame.set(input2_slot, Some(5));
    assert_eq!(naive_evaluation(&forest, &frame, &slots, &all), 8.5);

    frame.set(input1_slot, Some(f32::NAN));
    frame.set(input2_slot, None);
    assert_eq!(naive_evaluation(&forest, &frame, &slots, &all), 7.5);

    frame.set(input1_slot, Some(2.0));
    frame.set(input2_slot, Some(4));
    assert_eq!(naive_evaluation(&forest, &frame, &slots, &all), 10.5);

    let by_submodel = |submodels: &[usize]| TreeFilter {
        submodels: HashSet::from_iter(submodels.iter().copied()),
        ..Default::default()
    };
    assert_eq!(
        naive_evaluation(&forest, &frame, &slots, &by_submodel(&[0])),
        5.5
    );
    assert_eq!(
        naive_evaluation(&forest, &frame, &slots, &by_submodel(&[1])),
        5.0
    );
    assert_eq!(
        naive_evaluation(&forest, &frame, &slots, &by_submodel(&[0, 1])),
        10.5
    );

    assert_eq!(
        naive_evaluation(
            &forest,
            &frame,
            &slots,
            &TreeFilter {
                step_range_from: 1,
                ..Default::default()
            }
        ),
        7.0
    );
    assert_eq!(
        naive_evaluation(
            &forest,
            &frame,
            &slots,
            &TreeFilter {
                step_range_to: Some(2),
                ..Default::default()
            }
        ),
        8.5
    );
}
