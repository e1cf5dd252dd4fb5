//! Bound split conditions.
//!
//! A bound condition is a split condition resolved against concrete frame
//! slots, so that evaluation is a direct slot read instead of an input-id
//! lookup. The compiled tree walkers are generic over the bound condition
//! type: interval-only trees get a statically dispatched walker, everything
//! else goes through [`UniversalBoundCondition`].

use std::collections::HashSet;
use std::sync::Arc;

use crate::errors::{ForestError, Result};
use crate::forest::SplitCondition;
use crate::mem::{Frame, Slot, TypedSlot};
use crate::types::Bytes;

pub(crate) trait BoundCondition {
    fn evaluate(&self, frame: &Frame) -> bool;
}

#[derive(Debug, Clone)]
pub(crate) struct IntervalBoundCondition {
    input_slot: Slot<Option<f32>>,
    left: f32,
    right: f32,
}

impl IntervalBoundCondition {
    pub(crate) fn create(
        condition: &SplitCondition,
        input_slots: &[TypedSlot],
    ) -> Result<IntervalBoundCondition> {
        match condition {
            SplitCondition::Interval {
                input_id,
                left,
                right,
            } => Ok(IntervalBoundCondition {
                input_slot: input_slots[*input_id].to_slot()?,
                left: *left,
                right: *right,
            }),
            other => Err(ForestError::internal(format!(
                "expected an interval condition, got {other}"
            ))),
        }
    }
}

impl BoundCondition for IntervalBoundCondition {
    fn evaluate(&self, frame: &Frame) -> bool {
        match *frame.get(self.input_slot) {
            Some(v) => self.left <= v && v <= self.right,
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SetOfValuesI64BoundCondition {
    input_slot: Slot<Option<i64>>,
    values: HashSet<i64>,
    result_if_missed: bool,
}

impl SetOfValuesI64BoundCondition {
    pub(crate) fn create(
        condition: &SplitCondition,
        input_slots: &[TypedSlot],
    ) -> Result<SetOfValuesI64BoundCondition> {
        match condition {
            SplitCondition::SetOfValuesI64 {
                input_id,
                values,
                result_if_missed,
            } => Ok(SetOfValuesI64BoundCondition {
                input_slot: input_slots[*input_id].to_slot()?,
                values: values.clone(),
                result_if_missed: *result_if_missed,
            }),
            other => Err(ForestError::internal(format!(
                "expected a set-of-values condition, got {other}"
            ))),
        }
    }
}

impl BoundCondition for SetOfValuesI64BoundCondition {
    fn evaluate(&self, frame: &Frame) -> bool {
        match frame.get(self.input_slot) {
            Some(v) => self.values.contains(v),
            None => self.result_if_missed,
        }
    }
}

/// Fallback binding that keeps the shared condition and the full input slot
/// table. Slower, but supports every condition kind (byte-set conditions in
/// particular).
#[derive(Debug, Clone)]
pub(crate) struct VirtualBoundCondition {
    condition: Arc<SplitCondition>,
    inputs: Vec<TypedSlot>,
}

impl VirtualBoundCondition {
    pub(crate) fn create(
        condition: &Arc<SplitCondition>,
        input_slots: &[TypedSlot],
    ) -> VirtualBoundCondition {
        VirtualBoundCondition {
            condition: condition.clone(),
            inputs: input_slots.to_vec(),
        }
    }
}

impl BoundCondition for VirtualBoundCondition {
    fn evaluate(&self, frame: &Frame) -> bool {
        self.condition.evaluate(frame, &self.inputs)
    }
}

/// Bound condition for trees that mix condition kinds.
#[derive(Debug, Clone)]
pub(crate) enum UniversalBoundCondition {
    Interval(IntervalBoundCondition),
    SetOfValuesI64(SetOfValuesI64BoundCondition),
    Virtual(VirtualBoundCondition),
}

impl UniversalBoundCondition {
    pub(crate) fn create(
        condition: &Arc<SplitCondition>,
        input_slots: &[TypedSlot],
    ) -> Result<UniversalBoundCondition> {
        match condition.as_ref() {
            SplitCondition::Interval { .. } => Ok(UniversalBoundCondition::Interval(
                IntervalBoundCondition::create(condition, input_slots)?,
            )),
            SplitCondition::SetOfValuesI64 { .. } => Ok(UniversalBoundCondition::SetOfValuesI64(
                SetOfValuesI64BoundCondition::create(condition, input_slots)?,
            )),
            SplitCondition::SetOfValuesBytes { .. } => Ok(UniversalBoundCondition::Virtual(
                VirtualBoundCondition::create(condition, input_slots),
            )),
        }
    }
}

impl BoundCondition for UniversalBoundCondition {
    fn evaluate(&self, frame: &Frame) -> bool {
        match self {
            UniversalBoundCondition::Interval(c) => c.evaluate(frame),
            UniversalBoundCondition::SetOfValuesI64(c) => c.evaluate(frame),
            UniversalBoundCondition::Virtual(c) => c.evaluate(frame),
        }
    }
}
