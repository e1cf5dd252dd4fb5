//! Split conditions - immutable predicates over one input slot
//!
//! Two families of predicates cover the supported forests: interval
//! membership over optional floats and set membership over optional i64 or
//! byte-string values. Conditions are shared immutable (`Arc`), compare
//! structurally, and contribute to forest fingerprints in a canonical
//! order.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::mem::{Frame, TypedSlot};
use crate::types::{Bytes, ValueType};
use crate::util::FingerprintHasher;

/// The input id and type a condition reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSignature {
    pub id: usize,
    pub value_type: ValueType,
}

/// An immutable predicate over a single indexed input.
///
/// * `Interval` evaluates to `present ∧ left ≤ v ∧ v ≤ right`; a missing
///   value or NaN is always false. `left == right` expresses equality.
/// * The set variants evaluate to membership when the value is present and
///   to `result_if_missed` otherwise.
#[derive(Debug, Clone)]
pub enum SplitCondition {
    Interval {
        input_id: usize,
        left: f32,
        right: f32,
    },
    SetOfValuesI64 {
        input_id: usize,
        values: HashSet<i64>,
        result_if_missed: bool,
    },
    SetOfValuesBytes {
        input_id: usize,
        values: HashSet<Bytes>,
        result_if_missed: bool,
    },
}

/// Creates a shared interval condition `left ≤ #input_id ≤ right`.
pub fn interval_split(input_id: usize, left: f32, right: f32) -> Arc<SplitCondition> {
    Arc::new(SplitCondition::Interval {
        input_id,
        left,
        right,
    })
}

/// Creates a shared set-membership condition over i64 values.
pub fn set_of_values_split_i64(
    input_id: usize,
    values: impl IntoIterator<Item = i64>,
    result_if_missed: bool,
) -> Arc<SplitCondition> {
    Arc::new(SplitCondition::SetOfValuesI64 {
        input_id,
        values: values.into_iter().collect(),
        result_if_missed,
    })
}

/// Creates a shared set-membership condition over byte strings.
pub fn set_of_values_split_bytes(
    input_id: usize,
    values: impl IntoIterator<Item = Bytes>,
    result_if_missed: bool,
) -> Arc<SplitCondition> {
    Arc::new(SplitCondition::SetOfValuesBytes {
        input_id,
        values: values.into_iter().collect(),
        result_if_missed,
    })
}

impl SplitCondition {
    pub fn input_id(&self) -> usize {
        match self {
            SplitCondition::Interval { input_id, .. } => *input_id,
            SplitCondition::SetOfValuesI64 { input_id, .. } => *input_id,
            SplitCondition::SetOfValuesBytes { input_id, .. } => *input_id,
        }
    }

    pub fn input_value_type(&self) -> ValueType {
        match self {
            SplitCondition::Interval { .. } => ValueType::OptionalFloat,
            SplitCondition::SetOfValuesI64 { .. } => ValueType::OptionalLong,
            SplitCondition::SetOfValuesBytes { .. } => ValueType::OptionalBytes,
        }
    }

    /// Returns the id/type pair for each used input (always length 1 for the
    /// supported condition kinds).
    pub fn input_signatures(&self) -> Vec<InputSignature> {
        vec![InputSignature {
            id: self.input_id(),
            value_type: self.input_value_type(),
        }]
    }

    /// Returns a functionally identical copy with remapped input ids. Ids
    /// absent from the mapping are kept.
    pub fn remap_inputs(&self, mapping: &HashMap<usize, usize>) -> SplitCondition {
        let mut condition = self.clone();
        let input_id = match &mut condition {
            SplitCondition::Interval { input_id, .. } => input_id,
            SplitCondition::SetOfValuesI64 { input_id, .. } => input_id,
            SplitCondition::SetOfValuesBytes { input_id, .. } => input_id,
        };
        if let Some(new_id) = mapping.get(input_id) {
            *input_id = *new_id;
        }
        condition
    }

    /// Default evaluation: reads the condition's input slot from the frame.
    /// Slot types must have been validated against the forest beforehand.
    pub fn evaluate(&self, frame: &Frame, inputs: &[TypedSlot]) -> bool {
        match self {
            SplitCondition::Interval {
                input_id,
                left,
                right,
            } => {
                let slot = inputs[*input_id].unchecked_to_slot::<Option<f32>>();
                match *frame.get(slot) {
                    Some(v) => *left <= v && v <= *right,
                    None => false,
                }
            }
            SplitCondition::SetOfValuesI64 {
                input_id,
                values,
                result_if_missed,
            } => {
                let slot = inputs[*input_id].unchecked_to_slot::<Option<i64>>();
                match frame.get(slot) {
                    Some(v) => values.contains(v),
                    None => *result_if_missed,
                }
            }
            SplitCondition::SetOfValuesBytes {
                input_id,
                values,
                result_if_missed,
            } => {
                let slot = inputs[*input_id].unchecked_to_slot::<Option<Bytes>>();
                match frame.get(slot) {
                    Some(v) => values.contains(v),
                    None => *result_if_missed,
                }
            }
        }
    }

    /// A hash that is equal for equal conditions and deterministic across
    /// process runs.
    pub fn stable_hash(&self) -> u64 {
        let mut hasher = FingerprintHasher::new("SplitCondition");
        self.combine_to_fingerprint(&mut hasher);
        hasher.finish().0 as u64
    }

    /// Feeds the condition's canonical content into a fingerprint hasher:
    /// kind discriminant, input id, and parameters, with set values sorted
    /// ascending and the element type included.
    pub fn combine_to_fingerprint(&self, hasher: &mut FingerprintHasher) {
        match self {
            SplitCondition::Interval {
                input_id,
                left,
                right,
            } => {
                hasher
                    .combine_str("interval")
                    .combine_usize(*input_id)
                    .combine_f32(*left)
                    .combine_f32(*right);
            }
            SplitCondition::SetOfValuesI64 {
                input_id,
                values,
                result_if_missed,
            } => {
                hasher
                    .combine_str("set_of_values")
                    .combine_usize(*input_id)
                    .combine_bool(*result_if_missed)
                    .combine_str(ValueType::OptionalLong.name())
                    .combine_usize(values.len());
                for v in sorted_values(values) {
                    hasher.combine_i64(v);
                }
            }
            SplitCondition::SetOfValuesBytes {
                input_id,
                values,
                result_if_missed,
            } => {
                hasher
                    .combine_str("set_of_values")
                    .combine_usize(*input_id)
                    .combine_bool(*result_if_missed)
                    .combine_str(ValueType::OptionalBytes.name())
                    .combine_usize(values.len());
                for v in sorted_values(values) {
                    hasher.combine_bytes(v.as_slice());
                }
            }
        }
    }
}

fn sorted_values<T: Ord + Clone>(values: &HashSet<T>) -> Vec<T> {
    let mut vec: Vec<T> = values.iter().cloned().collect();
    vec.sort();
    vec
}

impl PartialEq for SplitCondition {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                SplitCondition::Interval {
                    input_id: id_a,
                    left: l_a,
                    right: r_a,
                },
                SplitCondition::Interval {
                    input_id: id_b,
                    left: l_b,
                    right: r_b,
                },
            ) => id_a == id_b && l_a == l_b && r_a == r_b,
            (
                SplitCondition::SetOfValuesI64 {
                    input_id: id_a,
                    values: v_a,
                    result_if_missed: m_a,
                },
                SplitCondition::SetOfValuesI64 {
                    input_id: id_b,
                    values: v_b,
                    result_if_missed: m_b,
                },
            ) => id_a == id_b && m_a == m_b && v_a == v_b,
            (
                SplitCondition::SetOfValuesBytes {
                    input_id: id_a,
                    values: v_a,
                    result_if_missed: m_a,
                },
                SplitCondition::SetOfValuesBytes {
                    input_id: id_b,
                    values: v_b,
                    result_if_missed: m_b,
                },
            ) => id_a == id_b && m_a == m_b && v_a == v_b,
            _ => false,
        }
    }
}

impl fmt::Display for SplitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitCondition::Interval {
                input_id,
                left,
                right,
            } => {
                write!(f, "#{input_id} in range [{left:.6} {right:.6}]")
            }
            SplitCondition::SetOfValuesI64 {
                input_id,
                values,
                result_if_missed,
            } => {
                write!(f, "#{input_id} in set [")?;
                for (i, v) in sorted_values(values).into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")?;
                if *result_if_missed {
                    f.write_str(" or missed")?;
                }
                Ok(())
            }
            SplitCondition::SetOfValuesBytes {
                input_id,
                values,
                result_if_missed,
            } => {
                write!(f, "#{input_id} in set [")?;
                for (i, v) in sorted_values(values).into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "b'{v}'")?;
                }
                f.write_str("]")?;
                if *result_if_missed {
                    f.write_str(" or missed")?;
                }
                Ok(())
            }
        }
    }
}
