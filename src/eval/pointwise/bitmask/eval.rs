//! Bitmask evaluation.
//!
//! Trees are represented as flat collections of splits. Leaves of a tree are
//! numbered in traversal order with the false child first, and every split
//! carries the bit mask of the leaves reachable through its false branch.
//! Evaluation walks the splits grouped by input, ORs the masks of satisfied
//! splits into a per-tree mask, and then resolves the active leaf of each
//! tree: for regular trees the lowest bit *not* set, for oblivious trees the
//! mask itself read as the per-layer true/false pattern.

use std::collections::HashMap;
use std::ops::{BitOrAssign, Not};

use crate::mem::{Frame, Sequence, Slot};

/// Mask word parameter: `u32` masks unless some tree needs up to 64 leaves
/// or layers.
pub(crate) trait TreeMaskWord:
    Copy + Default + PartialEq + BitOrAssign + Not<Output = Self> + std::fmt::Debug + Send + Sync + 'static
{
    const BITS: usize;
    fn from_u64(v: u64) -> Self;
    fn trailing_zeros(self) -> usize;
    fn to_usize(self) -> usize;
}

impl TreeMaskWord for u32 {
    const BITS: usize = 32;

    fn from_u64(v: u64) -> Self {
        v as u32
    }

    fn trailing_zeros(self) -> usize {
        u32::trailing_zeros(self) as usize
    }

    fn to_usize(self) -> usize {
        self as usize
    }
}

impl TreeMaskWord for u64 {
    const BITS: usize = 64;

    fn from_u64(v: u64) -> Self {
        v
    }

    fn trailing_zeros(self) -> usize {
        u64::trailing_zeros(self) as usize
    }

    fn to_usize(self) -> usize {
        self as usize
    }
}

/// Map key for float equality lookups: collapses `-0.0` onto `0.0` so the
/// bit patterns of equal floats coincide. NaN inputs never reach the map.
pub(crate) fn float_key(v: f32) -> u32 {
    (if v == 0.0 { 0.0f32 } else { v }).to_bits()
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SplitMeta<M> {
    /// ORed into the tree's mask when the split condition holds.
    pub mask: M,
    pub tree_id: u32,
}

#[derive(Debug)]
pub(crate) struct LeftRightSplits<M> {
    pub slot: Slot<Option<f32>>,
    pub metas: Vec<SplitMeta<M>>,
    pub thresholds: Vec<f32>,
}

#[derive(Debug)]
pub(crate) struct EqSplits<M> {
    pub slot: Slot<Option<f32>>,
    pub metas: Vec<SplitMeta<M>>,
    pub values: Vec<f32>,
    /// Value bits to the `[begin, end)` range of `metas`.
    pub value_to_range: HashMap<u32, (u32, u32)>,
}

#[derive(Debug)]
pub(crate) struct RangeSplit<M> {
    pub meta: SplitMeta<M>,
    pub left: f32,
    pub right: f32,
}

#[derive(Debug)]
pub(crate) struct RangeSplits<M> {
    pub slot: Slot<Option<f32>>,
    /// Sorted by increasing `left`.
    pub splits: Vec<RangeSplit<M>>,
}

#[derive(Debug)]
pub(crate) struct SetOfValuesSplits<M> {
    pub slot: Slot<Option<i64>>,
    pub metas: HashMap<i64, Vec<SplitMeta<M>>>,
    pub metas_with_default_true: Vec<SplitMeta<M>>,
}

#[derive(Debug, Default)]
pub(crate) struct SplitsData<M> {
    pub left_splits_by_input: Vec<LeftRightSplits<M>>,
    pub right_splits_by_input: Vec<LeftRightSplits<M>>,
    pub eq_splits_by_input: Vec<EqSplits<M>>,
    pub range_splits_by_input: Vec<RangeSplits<M>>,
    pub set_of_values_i64_by_input: Vec<SetOfValuesSplits<M>>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeMetadata {
    pub adjustments_offset: usize,
}

/// Contiguous ranges of tree ids belonging to one output group.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GroupMetadata {
    pub output_slot: Slot<f32>,
    pub regular_tree_range: (usize, usize),
    pub oblivious_tree_range: (usize, usize),
}

#[derive(Debug)]
pub(crate) struct BitmaskEvalImpl<M> {
    pub trees_metadata: Vec<TreeMetadata>,
    pub groups: Vec<GroupMetadata>,
    pub adjustments: Sequence<f32>,
    pub splits: SplitsData<M>,
}

/// Width-erased bitmask evaluator.
#[derive(Debug)]
pub(crate) enum BitmaskEval {
    Mask32(BitmaskEvalImpl<u32>),
    Mask64(BitmaskEvalImpl<u64>),
}

impl BitmaskEval {
    /// Evaluates the trees of every group and adds the results to the
    /// corresponding output slots.
    pub(crate) fn incremental_eval(&self, frame: &mut Frame) {
        match self {
            BitmaskEval::Mask32(eval) => eval.incremental_eval(frame),
            BitmaskEval::Mask64(eval) => eval.incremental_eval(frame),
        }
    }
}

fn apply_mask_for_range<M: TreeMaskWord>(metas: &[SplitMeta<M>], tree_masks: &mut [M]) {
    for meta in metas {
        tree_masks[meta.tree_id as usize] |= meta.mask;
    }
}

impl<M: TreeMaskWord> BitmaskEvalImpl<M> {
    fn process_left_splits(
        &self,
        splits: &LeftRightSplits<M>,
        frame: &Frame,
        tree_masks: &mut [M],
    ) {
        let Some(v) = *frame.get(splits.slot) else {
            return;
        };
        if v.is_nan() {
            return;
        }
        // Thresholds are sorted descending; the satisfied prefix is t >= v.
        let end = splits.thresholds.partition_point(|&t| t >= v);
        apply_mask_for_range(&splits.metas[..end], tree_masks);
    }

    fn process_right_splits(
        &self,
        splits: &LeftRightSplits<M>,
        frame: &Frame,
        tree_masks: &mut [M],
    ) {
        let Some(v) = *frame.get(splits.slot) else {
            return;
        };
        if v.is_nan() {
            return;
        }
        // Thresholds are sorted ascending; the satisfied prefix is t <= v.
        let end = splits.thresholds.partition_point(|&t| t <= v);
        apply_mask_for_range(&splits.metas[..end], tree_masks);
    }

    fn process_eq_splits(&self, splits: &EqSplits<M>, frame: &Frame, tree_masks: &mut [M]) {
        let Some(v) = *frame.get(splits.slot) else {
            return;
        };
        if v.is_nan() {
            return;
        }
        if let Some(&(begin, end)) = splits.value_to_range.get(&float_key(v)) {
            apply_mask_for_range(&splits.metas[begin as usize..end as usize], tree_masks);
        }
    }

    fn process_range_splits(&self, splits: &RangeSplits<M>, frame: &Frame, tree_masks: &mut [M]) {
        let Some(v) = *frame.get(splits.slot) else {
            return;
        };
        if v.is_nan() {
            return;
        }
        for range_split in &splits.splits {
            if range_split.left > v {
                break;
            }
            if v <= range_split.right {
                tree_masks[range_split.meta.tree_id as usize] |= range_split.meta.mask;
            }
        }
    }

    fn process_set_of_values_splits(
        &self,
        splits: &SetOfValuesSplits<M>,
        frame: &Frame,
        tree_masks: &mut [M],
    ) {
        match frame.get(splits.slot) {
            Some(v) => {
                if let Some(metas) = splits.metas.get(v) {
                    apply_mask_for_range(metas, tree_masks);
                }
            }
            None => {
                apply_mask_for_range(&splits.metas_with_default_true, tree_masks);
            }
        }
    }

    pub(crate) fn find_tree_masks(&self, frame: &Frame) -> Vec<M> {
        let mut tree_masks = vec![M::default(); self.trees_metadata.len()];
        for splits in &self.splits.left_splits_by_input {
            self.process_left_splits(splits, frame, &mut tree_masks);
        }
        for splits in &self.splits.right_splits_by_input {
            self.process_right_splits(splits, frame, &mut tree_masks);
        }
        for splits in &self.splits.eq_splits_by_input {
            self.process_eq_splits(splits, frame, &mut tree_masks);
        }
        for splits in &self.splits.range_splits_by_input {
            self.process_range_splits(splits, frame, &mut tree_masks);
        }
        for splits in &self.splits.set_of_values_i64_by_input {
            self.process_set_of_values_splits(splits, frame, &mut tree_masks);
        }
        tree_masks
    }

    fn sum_tree_range(
        &self,
        tree_masks: &[M],
        range: (usize, usize),
        leaf_id_fn: impl Fn(M) -> usize,
    ) -> f64 {
        let adjustments = self.adjustments.as_span();
        let tree_value = |tree_id: usize| {
            let tree = &self.trees_metadata[tree_id];
            let leaf_id = leaf_id_fn(tree_masks[tree_id]);
            adjustments[tree.adjustments_offset + leaf_id] as f64
        };

        // Two separate accumulators keep the unrolled iterations free of a
        // register dependency chain; f64 accumulation bounds the float error.
        let mut res = [0.0f64; 2];
        let mut tree_id = range.0;
        if (range.1 - range.0) % 2 == 1 {
            res[1] += tree_value(tree_id);
            tree_id += 1;
        }
        while tree_id != range.1 {
            res[0] += tree_value(tree_id);
            res[1] += tree_value(tree_id + 1);
            tree_id += 2;
        }
        res[0] + res[1]
    }

    pub(crate) fn incremental_eval(&self, frame: &mut Frame) {
        let tree_masks = self.find_tree_masks(frame);
        for group in &self.groups {
            let sum = self.sum_tree_range(&tree_masks, group.regular_tree_range, |mask| {
                debug_assert!(!mask != M::default());
                (!mask).trailing_zeros()
            }) + self.sum_tree_range(&tree_masks, group.oblivious_tree_range, |mask| {
                mask.to_usize()
            });
            *frame.get_mut(group.output_slot) += sum as f32;
        }
    }
}
