//! Single-input evaluation.
//!
//! Trees that read exactly one input collapse to a piecewise-constant
//! function of that input. At build time the split points of all such trees
//! of one (group, input) pair are collected and a reference sub-forest is
//! evaluated at every point and between consecutive points; at eval time
//! the answer is a binary search away.

use std::collections::BTreeMap;

use log::debug;

use crate::errors::{ForestError, Result};
use crate::eval::pointwise::forest_evaluator::{
    CompilationParams, ForestEvaluator, ForestEvaluatorOutput,
};
use crate::forest::{
    DecisionForest, DecisionTree, InputSignature, SplitCondition, TreeFilter,
};
use crate::mem::{Frame, FrameLayout, FrameValue, Slot, TypedSlot};
use crate::types::ValueType;

/// Scalar key of a piecewise-constant function: `f32` or `i64`.
pub(crate) trait PiecewiseScalar: Copy + PartialOrd + std::fmt::Debug + 'static
where
    Option<Self>: FrameValue,
{
    const ZERO: Self;
    const LOWEST: Self;
    const GREATEST: Self;

    fn is_nan(self) -> bool;
    fn midpoint(left: Self, right: Self) -> Self;
    fn sort_and_dedup(points: &mut Vec<Self>);
    /// Collects the split points of a condition, or fails if the condition
    /// kind cannot appear on an input of this type.
    fn add_split_points(condition: &SplitCondition, points: &mut Vec<Self>) -> Result<()>;
}

impl PiecewiseScalar for f32 {
    const ZERO: f32 = 0.0;
    const LOWEST: f32 = f32::MIN;
    const GREATEST: f32 = f32::MAX;

    fn is_nan(self) -> bool {
        f32::is_nan(self)
    }

    fn midpoint(left: f32, right: f32) -> f32 {
        (left + right) / 2.0
    }

    fn sort_and_dedup(points: &mut Vec<f32>) {
        points.sort_by(f32::total_cmp);
        points.dedup();
    }

    fn add_split_points(condition: &SplitCondition, points: &mut Vec<f32>) -> Result<()> {
        match condition {
            SplitCondition::Interval { left, right, .. } => {
                if *left != f32::NEG_INFINITY {
                    points.push(*left);
                }
                if *right != f32::INFINITY && right != left {
                    points.push(*right);
                }
                Ok(())
            }
            other => Err(ForestError::invalid_argument(format!(
                "split condition is not supported: {other}"
            ))),
        }
    }
}

impl PiecewiseScalar for i64 {
    const ZERO: i64 = 0;
    const LOWEST: i64 = i64::MIN;
    const GREATEST: i64 = i64::MAX;

    fn is_nan(self) -> bool {
        false
    }

    fn midpoint(left: i64, right: i64) -> i64 {
        ((left as i128 + right as i128) / 2) as i64
    }

    fn sort_and_dedup(points: &mut Vec<i64>) {
        points.sort_unstable();
        points.dedup();
    }

    fn add_split_points(condition: &SplitCondition, points: &mut Vec<i64>) -> Result<()> {
        match condition {
            SplitCondition::SetOfValuesI64 { values, .. } => {
                points.extend(values.iter().copied());
                Ok(())
            }
            other => Err(ForestError::invalid_argument(format!(
                "split condition is not supported: {other}"
            ))),
        }
    }
}

/// A piecewise-constant function of one optional scalar input.
///
/// `point_values[i]` is the value at `split_points[i]`; `middle_values[i]`
/// is the value strictly between `split_points[i-1]` and `split_points[i]`,
/// with sentinels before the first point and after the last.
#[derive(Debug)]
pub(crate) struct PiecewiseConstantEvaluator<T>
where
    Option<T>: FrameValue,
{
    input_slot: Slot<Option<T>>,
    split_points: Vec<T>,
    point_values: Vec<f32>,
    middle_values: Vec<f32>,
    result_if_value_is_missed: f32,
}

impl<T: PiecewiseScalar> PiecewiseConstantEvaluator<T>
where
    Option<T>: FrameValue,
{
    fn eval(&self, frame: &Frame) -> f32 {
        let Some(value) = *frame.get(self.input_slot) else {
            return self.result_if_value_is_missed;
        };
        if value.is_nan() {
            // The search below would return a well-defined but wrong bucket.
            return self.result_if_value_is_missed;
        }

        let split_point_id = self.split_points.partition_point(|p| *p < value);
        if split_point_id < self.split_points.len() && self.split_points[split_point_id] == value {
            self.point_values[split_point_id]
        } else {
            self.middle_values[split_point_id]
        }
    }
}

/// Scalar evaluator used only while tabulating the piecewise function.
struct InternalEvaluator<T>
where
    Option<T>: FrameValue,
{
    evaluator: ForestEvaluator,
    input_slot: Slot<Option<T>>,
    output_slot: Slot<f32>,
    frame: Frame,
}

impl<T: PiecewiseScalar> InternalEvaluator<T>
where
    Option<T>: FrameValue,
{
    fn create(forest: &DecisionForest, input_id: usize) -> Result<InternalEvaluator<T>> {
        let mut layout_builder = FrameLayout::builder();
        let input_slot = layout_builder.add_slot::<Option<T>>();
        let output_slot = layout_builder.add_slot::<f32>();
        let layout = layout_builder.build();

        let input_slots = vec![TypedSlot::from_slot(input_slot); input_id + 1];
        let evaluator = ForestEvaluator::compile(
            forest,
            &input_slots,
            &[ForestEvaluatorOutput {
                filter: TreeFilter::default(),
                slot: output_slot,
            }],
            // No single-input evaluation inside to avoid recursion.
            CompilationParams {
                enable_regular_eval: true,
                enable_bitmask_eval: true,
                enable_single_input_eval: false,
            },
        )?;

        Ok(InternalEvaluator {
            evaluator,
            input_slot,
            output_slot,
            frame: layout.alloc(),
        })
    }

    fn eval(&mut self, value: Option<T>) -> f32 {
        self.frame.set(self.input_slot, value);
        self.evaluator.eval(&mut self.frame);
        *self.frame.get(self.output_slot)
    }
}

/// Collects the trees of one (group, input) pair.
#[derive(Debug)]
pub(crate) struct PiecewiseConstantCompiler<T> {
    trees: Vec<DecisionTree>,
    _marker: std::marker::PhantomData<T>,
}

impl<T> Default for PiecewiseConstantCompiler<T> {
    fn default() -> Self {
        PiecewiseConstantCompiler {
            trees: Vec::new(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: PiecewiseScalar> PiecewiseConstantCompiler<T>
where
    Option<T>: FrameValue,
{
    fn add_tree(&mut self, tree: DecisionTree) {
        self.trees.push(tree);
    }

    fn build(
        self,
        input_id: usize,
        input_slot: Slot<Option<T>>,
    ) -> Result<PiecewiseConstantEvaluator<T>> {
        let mut split_points = Vec::new();
        for tree in &self.trees {
            for node in &tree.split_nodes {
                T::add_split_points(&node.condition, &mut split_points)?;
            }
        }
        T::sort_and_dedup(&mut split_points);

        let forest = DecisionForest::from_trees(self.trees)?;
        let mut evaluator = InternalEvaluator::<T>::create(&forest, input_id)?;

        let mut point_values = Vec::with_capacity(split_points.len());
        for &point in &split_points {
            point_values.push(evaluator.eval(Some(point)));
        }

        let mut middle_values = Vec::with_capacity(split_points.len() + 1);
        if split_points.is_empty() {
            middle_values.push(evaluator.eval(Some(T::ZERO)));
        } else {
            middle_values.push(evaluator.eval(Some(T::LOWEST)));
            for i in 1..split_points.len() {
                let middle = T::midpoint(split_points[i - 1], split_points[i]);
                middle_values.push(evaluator.eval(Some(middle)));
            }
            middle_values.push(evaluator.eval(Some(T::GREATEST)));
        }

        let result_if_value_is_missed = evaluator.eval(None);

        Ok(PiecewiseConstantEvaluator {
            input_slot,
            split_points,
            point_values,
            middle_values,
            result_if_value_is_missed,
        })
    }
}

/// Per-group piecewise evaluators, one per used input.
#[derive(Debug)]
struct PiecewiseConstantEvaluators {
    output_slot: Slot<f32>,
    float_predictors: Vec<PiecewiseConstantEvaluator<f32>>,
    long_predictors: Vec<PiecewiseConstantEvaluator<i64>>,
}

impl PiecewiseConstantEvaluators {
    fn incremental_eval(&self, frame: &mut Frame) {
        let mut result = 0.0f64;
        for predictor in &self.float_predictors {
            result += predictor.eval(frame) as f64;
        }
        for predictor in &self.long_predictors {
            result += predictor.eval(frame) as f64;
        }
        *frame.get_mut(self.output_slot) += result as f32;
    }
}

/// Optimized evaluator for trees without feature interactions: each tree
/// reads a single input, different trees may read different inputs.
#[derive(Debug, Default)]
pub(crate) struct SingleInputEval {
    evaluators: Vec<PiecewiseConstantEvaluators>,
}

impl SingleInputEval {
    /// Evaluates the trees of every group and adds the results to the
    /// corresponding output slots.
    pub(crate) fn incremental_eval(&self, frame: &mut Frame) {
        for evaluator in &self.evaluators {
            evaluator.incremental_eval(frame);
        }
    }
}

struct PerGroupCompilers {
    output_slot: Slot<f32>,
    float_compilers: BTreeMap<usize, PiecewiseConstantCompiler<f32>>,
    long_compilers: BTreeMap<usize, PiecewiseConstantCompiler<i64>>,
}

pub(crate) struct SingleInputBuilder {
    input_slots: Vec<TypedSlot>,
    compilers: Vec<PerGroupCompilers>,
}

impl SingleInputBuilder {
    pub(crate) fn new(input_slots: &[TypedSlot], output_slots: &[Slot<f32>]) -> Self {
        SingleInputBuilder {
            input_slots: input_slots.to_vec(),
            compilers: output_slots
                .iter()
                .map(|&output_slot| PerGroupCompilers {
                    output_slot,
                    float_compilers: BTreeMap::new(),
                    long_compilers: BTreeMap::new(),
                })
                .collect(),
        }
    }

    pub(crate) fn is_input_type_supported(value_type: ValueType) -> bool {
        matches!(
            value_type,
            ValueType::OptionalFloat | ValueType::OptionalLong
        )
    }

    pub(crate) fn add_tree(
        &mut self,
        tree: &DecisionTree,
        input_signature: InputSignature,
        group_id: usize,
    ) -> Result<()> {
        let Some(group) = self.compilers.get_mut(group_id) else {
            return Err(ForestError::invalid_argument("group_id is out of range"));
        };
        match input_signature.value_type {
            ValueType::OptionalFloat => {
                group
                    .float_compilers
                    .entry(input_signature.id)
                    .or_default()
                    .add_tree(tree.clone());
            }
            ValueType::OptionalLong => {
                group
                    .long_compilers
                    .entry(input_signature.id)
                    .or_default()
                    .add_tree(tree.clone());
            }
            other => {
                return Err(ForestError::invalid_argument(format!(
                    "type is not supported: {other}"
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn build(self) -> Result<SingleInputEval> {
        let mut evaluators = Vec::with_capacity(self.compilers.len());
        for group in self.compilers {
            let mut float_predictors = Vec::with_capacity(group.float_compilers.len());
            for (input_id, compiler) in group.float_compilers {
                let slot = Self::input_slot(&self.input_slots, input_id)?;
                float_predictors.push(compiler.build(input_id, slot)?);
            }
            let mut long_predictors = Vec::with_capacity(group.long_compilers.len());
            for (input_id, compiler) in group.long_compilers {
                let slot = Self::input_slot(&self.input_slots, input_id)?;
                long_predictors.push(compiler.build(input_id, slot)?);
            }
            if !float_predictors.is_empty() || !long_predictors.is_empty() {
                debug!(
                    "single-input evaluator: {} float inputs, {} i64 inputs",
                    float_predictors.len(),
                    long_predictors.len()
                );
            }
            evaluators.push(PiecewiseConstantEvaluators {
                output_slot: group.output_slot,
                float_predictors,
                long_predictors,
            });
        }
        Ok(SingleInputEval { evaluators })
    }

    fn input_slot<T: FrameValue>(
        input_slots: &[TypedSlot],
        input_id: usize,
    ) -> Result<Slot<T>> {
        let Some(slot) = input_slots.get(input_id) else {
            return Err(ForestError::invalid_argument("input_id is out of range"));
        };
        slot.to_slot::<T>()
    }
}
