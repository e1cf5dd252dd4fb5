//! Forest evaluation: pointwise compilation and batched columnar driving.

pub mod batched;
pub mod pointwise;

pub use batched::{
    ArrayValue, BatchedCompilationParams, BatchedForestEvaluator, FrameIterator,
    FrameIteratorOptions,
};
pub use pointwise::{
    to_oblivious_tree, CompilationParams, ForestEvaluator, ForestEvaluatorOutput,
    ObliviousDecisionTree,
};
