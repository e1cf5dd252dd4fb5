//! Compiled tree walkers for the regular sub-evaluator.
//!
//! Each tree is flattened into an array of internal nodes followed by its
//! leaves: node ids are reindexed so that leaves occupy
//! `[split_count, split_count + leaf_count)`. The walk picks the next node
//! by indexing a two-element child array with the condition result, which
//! compiles to a select rather than a branch.

use crate::eval::pointwise::bound_conditions::BoundCondition;
use crate::mem::Frame;

#[derive(Debug, Clone)]
pub(crate) struct FlatSplit<C> {
    /// `children[0]` is taken when the condition is false.
    pub children: [u32; 2],
    pub condition: C,
}

#[derive(Debug, Clone)]
pub(crate) struct FlatTree<C> {
    pub splits: Vec<FlatSplit<C>>,
    /// Leaf values pre-multiplied by the tree weight.
    pub leaves: Vec<f32>,
}

impl<C: BoundCondition> FlatTree<C> {
    fn predict(&self, frame: &Frame) -> f32 {
        let split_count = self.splits.len();
        let mut id = 0usize;
        while id < split_count {
            let split = &self.splits[id];
            id = split.children[split.condition.evaluate(frame) as usize] as usize;
        }
        self.leaves[id - split_count]
    }
}

/// A list of flattened trees whose predictions are summed.
#[derive(Debug, Clone, Default)]
pub(crate) struct Predictor<C> {
    trees: Vec<FlatTree<C>>,
}

impl<C: BoundCondition> Predictor<C> {
    pub(crate) fn predict(&self, frame: &Frame) -> f64 {
        let mut result = 0.0f64;
        for tree in &self.trees {
            result += tree.predict(frame) as f64;
        }
        result
    }
}

#[derive(Debug, Default)]
pub(crate) struct PredictorCompiler<C> {
    trees: Vec<FlatTree<C>>,
}

impl<C> PredictorCompiler<C> {
    pub(crate) fn new() -> Self {
        PredictorCompiler { trees: Vec::new() }
    }

    pub(crate) fn add_tree(&mut self, tree: FlatTree<C>) {
        debug_assert_eq!(tree.leaves.len(), tree.splits.len() + 1);
        self.trees.push(tree);
    }

    pub(crate) fn compile(self) -> Predictor<C> {
        Predictor { trees: self.trees }
    }
}
