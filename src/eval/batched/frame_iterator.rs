//! FrameIterator - streams columnar rows through scalar frames.
//!
//! Rows of the input arrays are copied chunk by chunk into a ring of scalar
//! frames, a per-row callback runs on each filled frame, and the values left
//! in the output scalar slots are gathered into full output arrays. The
//! threaded variant keeps preload and save on the driving thread and hands
//! disjoint stripes of each chunk to the workers.

use crate::collections::DenseArray;
use crate::concurrency::{Task, Threading};
use crate::errors::{ForestError, Result};
use crate::mem::{Frame, FrameLayout, Slot, TypedSlot};
use crate::types::ValueType;

/// A type-erased columnar input. Cloning is cheap: the column storage is
/// shared.
#[derive(Debug, Clone)]
pub enum ArrayValue {
    Float(DenseArray<f32>),
    Long(DenseArray<i64>),
}

impl ArrayValue {
    pub fn size(&self) -> usize {
        match self {
            ArrayValue::Float(array) => array.size(),
            ArrayValue::Long(array) => array.size(),
        }
    }

    /// The optional scalar type of one element.
    pub fn element_value_type(&self) -> ValueType {
        match self {
            ArrayValue::Float(_) => ValueType::OptionalFloat,
            ArrayValue::Long(_) => ValueType::OptionalLong,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrameIteratorOptions {
    /// Size of the input and output arrays. Taken from the input arrays by
    /// default.
    pub row_count: Option<usize>,
    /// The number of frames kept in the ring.
    pub frame_buffer_count: usize,
}

impl Default for FrameIteratorOptions {
    fn default() -> Self {
        FrameIteratorOptions {
            row_count: None,
            frame_buffer_count: 64,
        }
    }
}

#[derive(Debug)]
enum InputCopier {
    Float {
        array: DenseArray<f32>,
        slot: Slot<Option<f32>>,
    },
    Long {
        array: DenseArray<i64>,
        slot: Slot<Option<i64>>,
    },
}

impl InputCopier {
    fn new(array: &ArrayValue, scalar_slot: &TypedSlot) -> Result<InputCopier> {
        if scalar_slot.value_type() != array.element_value_type() {
            return Err(ForestError::invalid_argument(format!(
                "type mismatch between input array and scalar slot: expected {}, got {}",
                array.element_value_type(),
                scalar_slot.value_type()
            )));
        }
        match array {
            ArrayValue::Float(array) => Ok(InputCopier::Float {
                array: array.clone(),
                slot: scalar_slot.to_slot()?,
            }),
            ArrayValue::Long(array) => Ok(InputCopier::Long {
                array: array.clone(),
                slot: scalar_slot.to_slot()?,
            }),
        }
    }

    fn copy_row(&self, row: usize, frame: &mut Frame) {
        match self {
            InputCopier::Float { array, slot } => frame.set(*slot, array.get(row)),
            InputCopier::Long { array, slot } => frame.set(*slot, array.get(row)),
        }
    }
}

#[derive(Debug)]
struct OutputGatherer {
    scalar_slot: Slot<f32>,
    array_slot: Slot<DenseArray<f32>>,
    values: Vec<f32>,
}

/// Iterates over a set of frames: fills input scalar slots from the input
/// arrays, runs a callback per row, and gathers output scalar slots into
/// columnar outputs.
///
/// ```
/// let mut frame_iterator = FrameIterator::new(
///     &input_arrays, &input_scalar_slots,
///     &output_array_slots, &output_scalar_slots,
///     &scalar_layout, FrameIteratorOptions::default())?;
/// frame_iterator.for_each_frame(|frame| evaluator.eval(frame));
/// frame_iterator.store_output(&mut caller_frame)?;
/// ```
#[derive(Debug)]
pub struct FrameIterator {
    row_count: usize,
    input_copiers: Vec<InputCopier>,
    output_gatherers: Vec<OutputGatherer>,
    frames: Vec<Frame>,
}

impl FrameIterator {
    pub fn new(
        input_arrays: &[ArrayValue],
        input_scalar_slots: &[TypedSlot],
        output_array_slots: &[TypedSlot],
        output_scalar_slots: &[TypedSlot],
        scalar_layout: &FrameLayout,
        options: FrameIteratorOptions,
    ) -> Result<FrameIterator> {
        if input_arrays.len() != input_scalar_slots.len() {
            return Err(ForestError::invalid_argument(format!(
                "size of input_arrays and input_scalar_slots should be the same: {} vs {}",
                input_arrays.len(),
                input_scalar_slots.len()
            )));
        }
        if output_array_slots.len() != output_scalar_slots.len() {
            return Err(ForestError::invalid_argument(format!(
                "size of output_array_slots and output_scalar_slots should be the same: \
                 {} vs {}",
                output_array_slots.len(),
                output_scalar_slots.len()
            )));
        }

        let mut row_count = options.row_count;
        for array in input_arrays {
            match row_count {
                None => row_count = Some(array.size()),
                Some(expected) if expected != array.size() => {
                    return Err(ForestError::invalid_argument(
                        "input arrays have different sizes",
                    ));
                }
                _ => {}
            }
        }
        let Some(row_count) = row_count else {
            return Err(ForestError::invalid_argument(
                "options.row_count can not be missed if there is no input arrays",
            ));
        };

        let mut input_copiers = Vec::with_capacity(input_arrays.len());
        for (array, scalar_slot) in input_arrays.iter().zip(input_scalar_slots) {
            input_copiers.push(InputCopier::new(array, scalar_slot)?);
        }

        let mut output_gatherers = Vec::with_capacity(output_array_slots.len());
        for (array_slot, scalar_slot) in output_array_slots.iter().zip(output_scalar_slots) {
            output_gatherers.push(OutputGatherer {
                scalar_slot: scalar_slot.to_slot()?,
                array_slot: array_slot.to_slot()?,
                values: Vec::with_capacity(row_count),
            });
        }

        let frame_buffer_count = options.frame_buffer_count.max(1);
        let frames = (0..frame_buffer_count)
            .map(|_| scalar_layout.alloc())
            .collect();

        Ok(FrameIterator {
            row_count,
            input_copiers,
            output_gatherers,
            frames,
        })
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Applies `f` to every allocated frame buffer. Useful to initialize
    /// values that do not depend on the input arrays; must be called before
    /// iteration.
    pub fn custom_frame_initialization(&mut self, mut f: impl FnMut(&mut Frame)) {
        for frame in &mut self.frames {
            f(frame);
        }
    }

    /// For each row, fills a frame from the input arrays and applies `f`.
    pub fn for_each_frame(&mut self, mut f: impl FnMut(&mut Frame)) {
        let ring = self.frames.len();
        let mut offset = 0;
        while offset < self.row_count {
            let count = ring.min(self.row_count - offset);
            self.preload_frames(offset, count);
            for frame in self.frames[..count].iter_mut() {
                f(frame);
            }
            self.save_outputs(count);
            offset += count;
        }
    }

    /// Same as [`FrameIterator::for_each_frame`], but each chunk is
    /// processed by up to `thread_count` threads over disjoint frame
    /// stripes. Preload and save stay on the calling thread; the two
    /// synchronization points per chunk are the fan-out and the join of the
    /// parallel region.
    pub fn for_each_frame_threaded(
        &mut self,
        f: impl Fn(&mut Frame) + Sync,
        threading: &dyn Threading,
        thread_count: usize,
    ) {
        debug_assert!(thread_count >= 1);
        let ring = self.frames.len();
        let frames_per_worker = ring.div_ceil(thread_count);
        let mut offset = 0;
        while offset < self.row_count {
            let count = ring.min(self.row_count - offset);
            self.preload_frames(offset, count);
            {
                let f = &f;
                let tasks: Vec<Task<'_>> = self.frames[..count]
                    .chunks_mut(frames_per_worker)
                    .map(|stripe| {
                        Box::new(move || {
                            for frame in stripe {
                                f(frame);
                            }
                        }) as Task<'_>
                    })
                    .collect();
                threading.run_parallel(tasks);
            }
            self.save_outputs(count);
            offset += count;
        }
    }

    /// Writes the gathered output arrays into `frame`. Call once, after the
    /// last iteration.
    pub fn store_output(&mut self, frame: &mut Frame) -> Result<()> {
        for gatherer in &mut self.output_gatherers {
            if gatherer.values.len() != self.row_count {
                return Err(ForestError::internal(format!(
                    "gathered {} output rows, expected {}",
                    gatherer.values.len(),
                    self.row_count
                )));
            }
            let values = std::mem::take(&mut gatherer.values);
            frame.set(gatherer.array_slot, DenseArray::from_values(values));
        }
        Ok(())
    }

    fn preload_frames(&mut self, offset: usize, count: usize) {
        for copier in &self.input_copiers {
            for (i, frame) in self.frames[..count].iter_mut().enumerate() {
                copier.copy_row(offset + i, frame);
            }
        }
    }

    fn save_outputs(&mut self, count: usize) {
        for gatherer in &mut self.output_gatherers {
            for frame in &self.frames[..count] {
                gatherer.values.push(*frame.get(gatherer.scalar_slot));
            }
        }
    }
}
