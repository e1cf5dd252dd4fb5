//! Batched (columnar) forest evaluation.

pub mod batched_evaluator;
pub mod frame_iterator;

pub use batched_evaluator::{BatchedCompilationParams, BatchedForestEvaluator};
pub use frame_iterator::{ArrayValue, FrameIterator, FrameIteratorOptions};
