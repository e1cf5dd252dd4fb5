//! BatchedForestEvaluator - columnar evaluation of a forest.
//!
//! Wraps the pointwise evaluator: builds a scalar layout with one slot per
//! required input and one float slot per output group, partitions very large
//! forests into sub-forests of bounded split count, and drives rows through
//! a [`FrameIterator`], summing sub-forest outputs element-wise.

use std::sync::Arc;

use log::debug;

use crate::collections::DenseArray;
use crate::concurrency::Threading;
use crate::errors::{ForestError, Result};
use crate::eval::batched::frame_iterator::{ArrayValue, FrameIterator, FrameIteratorOptions};
use crate::eval::pointwise::{
    CompilationParams, ForestEvaluator, ForestEvaluatorOutput,
};
use crate::forest::{DecisionForest, DecisionTree, TreeFilter};
use crate::mem::{Frame, FrameLayout, TypedSlot};
use crate::types::ValueType;

/// Tuning knobs for batched compilation.
#[derive(Debug, Clone, Copy)]
pub struct BatchedCompilationParams {
    /// If the total split count of a forest exceeds this number, the forest
    /// is partitioned and evaluated by several pointwise evaluators. Matters
    /// for forests that do not fit into the processor cache in one piece.
    pub optimal_splits_per_evaluator: usize,
}

impl Default for BatchedCompilationParams {
    fn default() -> Self {
        BatchedCompilationParams {
            optimal_splits_per_evaluator: 500_000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SlotMapping {
    input_index: usize,
    pointwise_slot: TypedSlot,
}

#[derive(Clone)]
struct BatchedThreading {
    threading: Arc<dyn Threading>,
    min_rows_per_thread: usize,
}

/// Optimized batched evaluator for a decision forest.
///
/// Immutable after construction; one instance may evaluate any number of
/// batches, concurrently if desired.
pub struct BatchedForestEvaluator {
    pointwise_layout: FrameLayout,
    input_mapping: Vec<SlotMapping>,
    /// Pointwise slots in `input_mapping` order (dense, no placeholders).
    input_pointwise_slots: Vec<TypedSlot>,
    output_pointwise_slots: Vec<TypedSlot>,
    input_count: usize,
    pointwise_evaluators: Vec<ForestEvaluator>,
    threading: Option<BatchedThreading>,
}

impl BatchedForestEvaluator {
    /// Compiles a batched evaluator. Each filter in `groups` selects the
    /// trees of one output; filters must not intersect. `groups = [default]`
    /// evaluates the whole forest into a single output.
    pub fn compile(
        forest: &DecisionForest,
        groups: &[TreeFilter],
        params: BatchedCompilationParams,
    ) -> Result<BatchedForestEvaluator> {
        let mut layout_builder = FrameLayout::builder();

        let mut input_mapping = Vec::with_capacity(forest.required_types().len());
        let mut padded_pointwise_slots: Vec<TypedSlot> = Vec::new();
        for (&input_id, &value_type) in forest.required_types() {
            let pointwise_slot = layout_builder.add_typed_slot(value_type);
            while padded_pointwise_slots.len() <= input_id {
                padded_pointwise_slots.push(TypedSlot::uninitialized());
            }
            padded_pointwise_slots[input_id] = pointwise_slot;
            input_mapping.push(SlotMapping {
                input_index: input_id,
                pointwise_slot,
            });
        }

        let mut pointwise_outputs = Vec::with_capacity(groups.len());
        let mut output_pointwise_slots = Vec::with_capacity(groups.len());
        for filter in groups {
            let slot = layout_builder.add_slot::<f32>();
            pointwise_outputs.push(ForestEvaluatorOutput {
                filter: filter.clone(),
                slot,
            });
            output_pointwise_slots.push(TypedSlot::from_slot(slot));
        }

        let pointwise_layout = layout_builder.build();

        let pointwise_evaluators = create_pointwise_evaluators(
            &params,
            forest,
            &padded_pointwise_slots,
            &pointwise_outputs,
        )?;

        let input_pointwise_slots: Vec<TypedSlot> = input_mapping
            .iter()
            .map(|mapping| mapping.pointwise_slot)
            .collect();
        let input_count = input_mapping
            .iter()
            .map(|mapping| mapping.input_index + 1)
            .max()
            .unwrap_or(0);

        Ok(BatchedForestEvaluator {
            pointwise_layout,
            input_mapping,
            input_pointwise_slots,
            output_pointwise_slots,
            input_count,
            pointwise_evaluators,
            threading: None,
        })
    }

    /// Enables the multi-threaded row processing policy:
    /// `thread_count = clamp(ceil(row_count / min_rows_per_thread), 1,
    /// recommended)`. Off by default; single-threaded evaluation has been
    /// the faster configuration on typical forests.
    pub fn set_threading(
        &mut self,
        threading: Arc<dyn Threading>,
        min_rows_per_thread: usize,
    ) {
        self.threading = Some(BatchedThreading {
            threading,
            min_rows_per_thread: min_rows_per_thread.max(1),
        });
    }

    /// Evaluates the forest over arrays stored in `frame`.
    ///
    /// `input_slots` hold the columnar inputs (indexed by forest input id),
    /// `output_slots` receive one full float array per group. All arrays
    /// must have `row_count` rows; when `row_count` is `None` it is taken
    /// from the first input array.
    pub fn eval_batch(
        &self,
        input_slots: &[TypedSlot],
        output_slots: &[TypedSlot],
        frame: &mut Frame,
        row_count: Option<usize>,
    ) -> Result<()> {
        if output_slots.len() != self.output_pointwise_slots.len() {
            return Err(ForestError::invalid_argument(format!(
                "incorrect output count: expected {}, got {}",
                self.output_pointwise_slots.len(),
                output_slots.len()
            )));
        }

        let input_arrays = self.input_arrays_from_slots(input_slots, frame)?;

        let mut row_count = row_count;
        if row_count.is_none() {
            if let Some(array) = input_arrays.first() {
                row_count = Some(array.size());
            } else if let Some(slot) = input_slots.first() {
                row_count = array_size_from_slot(slot, frame);
            }
        }

        let (threading, thread_count) = match (&self.threading, row_count) {
            (Some(batched_threading), Some(rows)) => {
                let thread_count = rows
                    .div_ceil(batched_threading.min_rows_per_thread)
                    .clamp(1, batched_threading.threading.recommended_thread_count());
                (Some(batched_threading.threading.as_ref()), thread_count)
            }
            _ => (None, 1),
        };

        if self.pointwise_evaluators.len() == 1 {
            return self.run_evaluator(
                &self.pointwise_evaluators[0],
                &input_arrays,
                output_slots,
                frame,
                row_count,
                threading,
                thread_count,
            );
        }

        let last_id = self.pointwise_evaluators.len() - 1;
        self.run_evaluator(
            &self.pointwise_evaluators[0],
            &input_arrays,
            output_slots,
            frame,
            row_count,
            threading,
            thread_count,
        )?;
        let mut result_sums: Vec<DenseArray<f32>> = Vec::with_capacity(output_slots.len());
        for slot in output_slots {
            result_sums.push(frame.get(slot.to_slot::<DenseArray<f32>>()?).clone());
        }
        for evaluator in &self.pointwise_evaluators[1..last_id] {
            self.run_evaluator(
                evaluator,
                &input_arrays,
                output_slots,
                frame,
                row_count,
                threading,
                thread_count,
            )?;
            for (sum, slot) in result_sums.iter_mut().zip(output_slots) {
                *sum = add_full_float_arrays(sum, frame.get(slot.to_slot()?))?;
            }
        }
        self.run_evaluator(
            &self.pointwise_evaluators[last_id],
            &input_arrays,
            output_slots,
            frame,
            row_count,
            threading,
            thread_count,
        )?;
        for (sum, slot) in result_sums.iter().zip(output_slots) {
            let full_sum = add_full_float_arrays(sum, frame.get(slot.to_slot()?))?;
            frame.set(slot.to_slot()?, full_sum);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn run_evaluator(
        &self,
        evaluator: &ForestEvaluator,
        input_arrays: &[ArrayValue],
        output_slots: &[TypedSlot],
        frame: &mut Frame,
        row_count: Option<usize>,
        threading: Option<&dyn Threading>,
        thread_count: usize,
    ) -> Result<()> {
        let mut frame_iterator = FrameIterator::new(
            input_arrays,
            &self.input_pointwise_slots[..input_arrays.len()],
            output_slots,
            &self.output_pointwise_slots,
            &self.pointwise_layout,
            FrameIteratorOptions {
                row_count,
                frame_buffer_count: 64 * thread_count,
            },
        )?;
        match threading {
            Some(threading) if thread_count > 1 => {
                frame_iterator.for_each_frame_threaded(
                    |frame| evaluator.eval(frame),
                    threading,
                    thread_count,
                );
            }
            _ => frame_iterator.for_each_frame(|frame| evaluator.eval(frame)),
        }
        frame_iterator.store_output(frame)
    }

    /// Reads the arrays for the mapped inputs out of the caller's frame.
    fn input_arrays_from_slots(
        &self,
        input_slots: &[TypedSlot],
        frame: &Frame,
    ) -> Result<Vec<ArrayValue>> {
        if input_slots.len() < self.input_count {
            return Err(ForestError::invalid_argument(format!(
                "not enough arguments for the decision forest: expected at least {}, got {}",
                self.input_count,
                input_slots.len()
            )));
        }
        let mut input_arrays = Vec::with_capacity(self.input_mapping.len());
        for mapping in &self.input_mapping {
            let slot = &input_slots[mapping.input_index];
            let array = match mapping.pointwise_slot.value_type() {
                ValueType::OptionalFloat => {
                    ArrayValue::Float(frame.get(slot.to_slot::<DenseArray<f32>>()?).clone())
                }
                ValueType::OptionalLong => {
                    ArrayValue::Long(frame.get(slot.to_slot::<DenseArray<i64>>()?).clone())
                }
                other => {
                    return Err(ForestError::invalid_argument(format!(
                        "batched evaluation is not supported for input type {other}"
                    )));
                }
            };
            input_arrays.push(array);
        }
        Ok(input_arrays)
    }
}

fn array_size_from_slot(slot: &TypedSlot, frame: &Frame) -> Option<usize> {
    match slot.value_type() {
        ValueType::FloatArray => slot
            .to_slot::<DenseArray<f32>>()
            .ok()
            .map(|s| frame.get(s).size()),
        ValueType::LongArray => slot
            .to_slot::<DenseArray<i64>>()
            .ok()
            .map(|s| frame.get(s).size()),
        _ => None,
    }
}

/// Element-wise sum of two full float arrays. Batched accumulation across
/// sub-evaluators relies on gathered outputs always being full.
fn add_full_float_arrays(
    a: &DenseArray<f32>,
    b: &DenseArray<f32>,
) -> Result<DenseArray<f32>> {
    if a.size() != b.size() || !a.is_full() || !b.is_full() {
        return Err(ForestError::internal(
            "invalid array shape in batched evaluator sum",
        ));
    }
    let values = a
        .values()
        .iter()
        .zip(b.values())
        .map(|(x, y)| x + y)
        .collect();
    Ok(DenseArray::from_values(values))
}

fn create_pointwise_evaluators(
    params: &BatchedCompilationParams,
    forest: &DecisionForest,
    input_slots: &[TypedSlot],
    outputs: &[ForestEvaluatorOutput],
) -> Result<Vec<ForestEvaluator>> {
    let split_count: usize = forest.trees().iter().map(|tree| tree.split_count()).sum();
    let evaluator_count = split_count
        .div_ceil(params.optimal_splits_per_evaluator.max(1))
        .max(1);

    if evaluator_count == 1 {
        return Ok(vec![ForestEvaluator::compile(
            forest,
            input_slots,
            outputs,
            CompilationParams::default(),
        )?]);
    }

    debug!(
        "partitioning forest with {} splits into {} pointwise evaluators",
        split_count, evaluator_count
    );

    let splits_per_evaluator = split_count.div_ceil(evaluator_count);
    let estimated_trees_per_evaluator = forest.trees().len().div_ceil(evaluator_count);
    let mut evaluators = Vec::with_capacity(evaluator_count);
    let mut trees: Vec<DecisionTree> = Vec::with_capacity(estimated_trees_per_evaluator);
    let mut current_split_count = 0;
    for tree in forest.trees() {
        current_split_count += tree.split_count();
        trees.push(tree.clone());
        if current_split_count >= splits_per_evaluator {
            let partial_forest = DecisionForest::from_trees(std::mem::take(&mut trees))?;
            evaluators.push(ForestEvaluator::compile(
                &partial_forest,
                input_slots,
                outputs,
                CompilationParams::default(),
            )?);
            trees.reserve(estimated_trees_per_evaluator);
            current_split_count = 0;
        }
    }
    if !trees.is_empty() {
        let partial_forest = DecisionForest::from_trees(trees)?;
        evaluators.push(ForestEvaluator::compile(
            &partial_forest,
            input_slots,
            outputs,
            CompilationParams::default(),
        )?);
    }
    Ok(evaluators)
}
