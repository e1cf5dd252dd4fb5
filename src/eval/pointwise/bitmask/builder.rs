//! Construction of the bitmask evaluator.
//!
//! Small trees are converted to per-split false-branch leaf masks by a
//! depth-first walk; oblivious trees get one power-of-two mask per layer.
//! Splits are then regrouped by input id and split kind, sorted, and
//! duplicate splits within one tree are merged by ORing their masks.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use crate::errors::{ForestError, Result};
use crate::eval::pointwise::bitmask::eval::{
    float_key, BitmaskEval, BitmaskEvalImpl, EqSplits, GroupMetadata, LeftRightSplits,
    RangeSplit, RangeSplits, SetOfValuesSplits, SplitMeta, SplitsData, TreeMaskWord,
    TreeMetadata,
};
use crate::eval::pointwise::oblivious::ObliviousDecisionTree;
use crate::forest::{DecisionTree, SplitCondition, SplitNode, TreeNodeId, TreeTag};
use crate::mem::{MutableSequence, Slot, TypedSlot};

/// Trees with more regions cannot be represented by a single mask word.
pub(crate) const MAX_REGIONS_FOR_BITMASK: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MaskWidth {
    W32,
    W64,
}

#[derive(Debug)]
struct MaskedSplit {
    false_branch_mask: u64,
    condition: Arc<SplitCondition>,
}

#[derive(Debug)]
struct MaskedTree {
    group_id: usize,
    tag: TreeTag,
    splits: Vec<MaskedSplit>,
    /// Leaf values in traversal order, pre-multiplied by the tree weight.
    adjustments: Vec<f32>,
}

#[derive(Debug)]
struct ObliviousWithGroup {
    group_id: usize,
    tree: ObliviousDecisionTree,
}

pub(crate) struct BitmaskBuilder {
    input_slots: Vec<TypedSlot>,
    output_slots: Vec<Slot<f32>>,
    masked_trees: Vec<MaskedTree>,
    oblivious_trees: Vec<ObliviousWithGroup>,
    mask_width: MaskWidth,
    combined_adjustments_size: usize,
}

impl BitmaskBuilder {
    pub(crate) fn new(input_slots: &[TypedSlot], output_slots: &[Slot<f32>]) -> Self {
        BitmaskBuilder {
            input_slots: input_slots.to_vec(),
            output_slots: output_slots.to_vec(),
            masked_trees: Vec::new(),
            oblivious_trees: Vec::new(),
            mask_width: MaskWidth::W32,
            combined_adjustments_size: 0,
        }
    }

    pub(crate) fn is_split_node_supported(node: &SplitNode) -> bool {
        matches!(
            node.condition.as_ref(),
            SplitCondition::Interval { .. } | SplitCondition::SetOfValuesI64 { .. }
        )
    }

    pub(crate) fn add_small_tree(&mut self, tree: &DecisionTree, group_id: usize) {
        debug_assert!(tree.adjustments.len() <= MAX_REGIONS_FOR_BITMASK);
        self.combined_adjustments_size += tree.adjustments.len();
        if tree.adjustments.len() > 32 {
            self.mask_width = MaskWidth::W64;
        }
        let mut masked_tree = MaskedTree {
            group_id,
            tag: tree.tag,
            splits: Vec::with_capacity(tree.split_nodes.len()),
            adjustments: Vec::with_capacity(tree.adjustments.len()),
        };
        let full_tree_mask = add_node(tree, tree.root_id(), &mut masked_tree);
        if tree.adjustments.len() < 64 {
            debug_assert_eq!(full_tree_mask, (1u64 << tree.adjustments.len()) - 1);
        } else {
            debug_assert_eq!(full_tree_mask, u64::MAX);
        }
        debug_assert_eq!(masked_tree.adjustments.len(), tree.adjustments.len());
        debug_assert_eq!(masked_tree.splits.len(), tree.split_nodes.len());
        self.masked_trees.push(masked_tree);
    }

    pub(crate) fn add_oblivious_tree(&mut self, tree: ObliviousDecisionTree, group_id: usize) {
        if tree.layer_splits.len() > 32 {
            self.mask_width = MaskWidth::W64;
        }
        self.combined_adjustments_size += tree.adjustments.len();
        self.oblivious_trees.push(ObliviousWithGroup { group_id, tree });
    }

    pub(crate) fn build(self) -> Result<Option<BitmaskEval>> {
        if self.masked_trees.is_empty() && self.oblivious_trees.is_empty() {
            return Ok(None);
        }
        debug!(
            "bitmask evaluator: {} small trees, {} oblivious trees, {}-bit masks",
            self.masked_trees.len(),
            self.oblivious_trees.len(),
            match self.mask_width {
                MaskWidth::W32 => 32,
                MaskWidth::W64 => 64,
            }
        );
        match self.mask_width {
            MaskWidth::W32 => Ok(Some(BitmaskEval::Mask32(self.build_impl::<u32>()?))),
            MaskWidth::W64 => Ok(Some(BitmaskEval::Mask64(self.build_impl::<u64>()?))),
        }
    }

    fn build_impl<M: TreeMaskWord>(mut self) -> Result<BitmaskEvalImpl<M>> {
        self.masked_trees
            .sort_by_key(|t| (t.group_id, t.tag.submodel_id));
        self.oblivious_trees
            .sort_by_key(|t| (t.group_id, t.tree.tag.submodel_id));

        let mut accumulator = SplitsAccumulator::<M>::default();
        let mut trees_metadata =
            Vec::with_capacity(self.masked_trees.len() + self.oblivious_trees.len());
        let mut adjustments = MutableSequence::make(0);
        let mut groups = Vec::with_capacity(self.output_slots.len());

        let mut masked_iter = self.masked_trees.iter().peekable();
        let mut oblivious_iter = self.oblivious_trees.iter().peekable();
        for (group_id, &output_slot) in self.output_slots.iter().enumerate() {
            let regular_from = trees_metadata.len();
            while let Some(tree) = masked_iter.next_if(|tree| tree.group_id == group_id) {
                let tree_id = trees_metadata.len() as u32;
                for split in &tree.splits {
                    accumulator.add_split(
                        &split.condition,
                        M::from_u64(split.false_branch_mask),
                        tree_id,
                        &self.input_slots,
                    )?;
                }
                trees_metadata.push(TreeMetadata {
                    adjustments_offset: adjustments.len(),
                });
                adjustments.extend_from_slice(&tree.adjustments);
            }
            let regular_to = trees_metadata.len();
            while let Some(entry) = oblivious_iter.next_if(|tree| tree.group_id == group_id) {
                let tree = &entry.tree;
                let tree_id = trees_metadata.len() as u32;
                // The tree is perfect, so adjustments.len() is 2^depth; the
                // layer-k mask is the single bit 2^(depth - 1 - k).
                let mut mask = tree.adjustments.len() as u64;
                for condition in &tree.layer_splits {
                    mask >>= 1;
                    accumulator.add_split(
                        condition,
                        M::from_u64(mask),
                        tree_id,
                        &self.input_slots,
                    )?;
                }
                trees_metadata.push(TreeMetadata {
                    adjustments_offset: adjustments.len(),
                });
                adjustments.extend_from_slice(&tree.adjustments);
            }
            groups.push(GroupMetadata {
                output_slot,
                regular_tree_range: (regular_from, regular_to),
                oblivious_tree_range: (regular_to, trees_metadata.len()),
            });
        }

        debug_assert_eq!(adjustments.len(), self.combined_adjustments_size);

        Ok(BitmaskEvalImpl {
            trees_metadata,
            groups,
            adjustments: adjustments.freeze(),
            splits: accumulator.into_splits_data(),
        })
    }
}

/// Converts the subtree under `node_id` to masked splits, returning the bit
/// mask of all leaves in the subtree. Leaves are numbered in visiting order
/// (false child first), so the false-branch mask of a split is exactly the
/// bits appended while visiting its false subtree.
fn add_node(tree: &DecisionTree, node_id: TreeNodeId, out: &mut MaskedTree) -> u64 {
    if node_id.is_leaf() {
        out.adjustments
            .push(tree.adjustments[node_id.adjustment_index()] * tree.weight);
        1u64 << (out.adjustments.len() - 1)
    } else {
        let node = &tree.split_nodes[node_id.split_node_index()];
        let mask_false = add_node(tree, node.child_if_false, out);
        let mask_true = add_node(tree, node.child_if_true, out);
        out.splits.push(MaskedSplit {
            false_branch_mask: mask_false,
            condition: node.condition.clone(),
        });
        mask_false | mask_true
    }
}

/// Interval splits of one input, regrouped by split shape.
struct IntervalSplitsOfInput<M> {
    left_splits: LeftRightSplits<M>,
    right_splits: LeftRightSplits<M>,
    eq_splits: EqSplits<M>,
    range_splits: RangeSplits<M>,
}

impl<M> IntervalSplitsOfInput<M> {
    fn new(slot: Slot<Option<f32>>) -> Self {
        IntervalSplitsOfInput {
            left_splits: LeftRightSplits {
                slot,
                metas: Vec::new(),
                thresholds: Vec::new(),
            },
            right_splits: LeftRightSplits {
                slot,
                metas: Vec::new(),
                thresholds: Vec::new(),
            },
            eq_splits: EqSplits {
                slot,
                metas: Vec::new(),
                values: Vec::new(),
                value_to_range: Default::default(),
            },
            range_splits: RangeSplits {
                slot,
                splits: Vec::new(),
            },
        }
    }
}

struct SplitsAccumulator<M> {
    interval_by_input: BTreeMap<usize, IntervalSplitsOfInput<M>>,
    set_of_values_by_input: BTreeMap<usize, SetOfValuesSplits<M>>,
}

impl<M> Default for SplitsAccumulator<M> {
    fn default() -> Self {
        SplitsAccumulator {
            interval_by_input: BTreeMap::new(),
            set_of_values_by_input: BTreeMap::new(),
        }
    }
}

impl<M: TreeMaskWord> SplitsAccumulator<M> {
    fn add_split(
        &mut self,
        condition: &SplitCondition,
        mask: M,
        tree_id: u32,
        input_slots: &[TypedSlot],
    ) -> Result<()> {
        let meta = SplitMeta { mask, tree_id };
        match condition {
            SplitCondition::Interval {
                input_id,
                left,
                right,
            } => {
                let splits = self.interval_splits_for_input(*input_id, input_slots)?;
                if *left == f32::NEG_INFINITY {
                    splits.left_splits.metas.push(meta);
                    splits.left_splits.thresholds.push(*right);
                } else if *right == f32::INFINITY {
                    splits.right_splits.metas.push(meta);
                    splits.right_splits.thresholds.push(*left);
                } else if left == right {
                    splits.eq_splits.metas.push(meta);
                    splits.eq_splits.values.push(*left);
                } else {
                    splits.range_splits.splits.push(RangeSplit {
                        meta,
                        left: *left,
                        right: *right,
                    });
                }
                Ok(())
            }
            SplitCondition::SetOfValuesI64 {
                input_id,
                values,
                result_if_missed,
            } => {
                let splits = self.set_of_values_splits_for_input(*input_id, input_slots)?;
                for &v in values {
                    splits.metas.entry(v).or_default().push(meta);
                }
                if *result_if_missed {
                    splits.metas_with_default_true.push(meta);
                }
                Ok(())
            }
            other => Err(ForestError::invalid_argument(format!(
                "split condition is not supported: {other}"
            ))),
        }
    }

    fn interval_splits_for_input(
        &mut self,
        input_id: usize,
        input_slots: &[TypedSlot],
    ) -> Result<&mut IntervalSplitsOfInput<M>> {
        use std::collections::btree_map::Entry;
        match self.interval_by_input.entry(input_id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let slot = input_slots[input_id].to_slot::<Option<f32>>()?;
                Ok(entry.insert(IntervalSplitsOfInput::new(slot)))
            }
        }
    }

    fn set_of_values_splits_for_input(
        &mut self,
        input_id: usize,
        input_slots: &[TypedSlot],
    ) -> Result<&mut SetOfValuesSplits<M>> {
        use std::collections::btree_map::Entry;
        match self.set_of_values_by_input.entry(input_id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let slot = input_slots[input_id].to_slot::<Option<i64>>()?;
                Ok(entry.insert(SetOfValuesSplits {
                    slot,
                    metas: Default::default(),
                    metas_with_default_true: Vec::new(),
                }))
            }
        }
    }

    fn into_splits_data(self) -> SplitsData<M> {
        let mut data = SplitsData::default();
        for (_, mut splits) in self.interval_by_input {
            sort_and_deduplicate(
                false,
                &mut splits.left_splits.metas,
                &mut splits.left_splits.thresholds,
            );
            sort_and_deduplicate(
                true,
                &mut splits.right_splits.metas,
                &mut splits.right_splits.thresholds,
            );
            sort_and_deduplicate(
                true,
                &mut splits.eq_splits.metas,
                &mut splits.eq_splits.values,
            );
            fill_value_to_range(&mut splits.eq_splits);
            splits
                .range_splits
                .splits
                .sort_by(|a, b| a.left.total_cmp(&b.left));

            if !splits.left_splits.thresholds.is_empty() {
                data.left_splits_by_input.push(splits.left_splits);
            }
            if !splits.right_splits.thresholds.is_empty() {
                data.right_splits_by_input.push(splits.right_splits);
            }
            if !splits.eq_splits.value_to_range.is_empty() {
                data.eq_splits_by_input.push(splits.eq_splits);
            }
            if !splits.range_splits.splits.is_empty() {
                data.range_splits_by_input.push(splits.range_splits);
            }
        }
        for (_, splits) in self.set_of_values_by_input {
            data.set_of_values_i64_by_input.push(splits);
        }
        data
    }
}

/// Sorts parallel `(value, meta)` arrays by value (descending when
/// `increasing` is false) with the tree id as tie-breaker, and merges
/// duplicate splits of the same tree by ORing their masks.
fn sort_and_deduplicate<M: TreeMaskWord>(
    increasing: bool,
    metas: &mut Vec<SplitMeta<M>>,
    values: &mut Vec<f32>,
) {
    debug_assert_eq!(values.len(), metas.len());
    if values.len() < 2 {
        return;
    }
    let mut entries: Vec<(f32, SplitMeta<M>)> = values
        .iter()
        .copied()
        .zip(metas.iter().copied())
        .collect();
    entries.sort_by(|a, b| {
        let by_value = if increasing {
            a.0.total_cmp(&b.0)
        } else {
            b.0.total_cmp(&a.0)
        };
        by_value.then(a.1.tree_id.cmp(&b.1.tree_id))
    });

    let mut merged: Vec<(f32, SplitMeta<M>)> = Vec::with_capacity(entries.len());
    for (value, meta) in entries {
        match merged.last_mut() {
            Some(last) if last.0 == value && last.1.tree_id == meta.tree_id => {
                last.1.mask |= meta.mask;
            }
            _ => merged.push((value, meta)),
        }
    }
    *values = merged.iter().map(|e| e.0).collect();
    *metas = merged.iter().map(|e| e.1).collect();
}

/// Indexes ranges of equal consecutive values by their bit pattern.
fn fill_value_to_range<M>(eq_splits: &mut EqSplits<M>) {
    if eq_splits.values.is_empty() {
        return;
    }
    let mut last_pos = 0usize;
    for i in 0..eq_splits.values.len() {
        if eq_splits.values[i] != eq_splits.values[last_pos] {
            eq_splits
                .value_to_range
                .insert(float_key(eq_splits.values[last_pos]), (last_pos as u32, i as u32));
            last_pos = i;
        }
    }
    eq_splits.value_to_range.insert(
        float_key(eq_splits.values[last_pos]),
        (last_pos as u32, eq_splits.values.len() as u32),
    );
}
