//! Decision forest representation: split conditions, trees, validated
//! ensembles, tree filters, and the naive reference evaluation.

pub mod decision_forest;
pub mod decision_tree;
pub mod split_condition;
pub mod testing;

pub use decision_forest::{
    naive_evaluation, tree_to_debug_string, DecisionForest,
};
pub use decision_tree::{DecisionTree, SplitNode, TreeFilter, TreeNodeId, TreeTag};
pub use split_condition::{
    interval_split, set_of_values_split_bytes, set_of_values_split_i64, InputSignature,
    SplitCondition,
};
