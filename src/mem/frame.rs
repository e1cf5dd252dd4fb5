//! Frame - typed, slot-addressed scalar storage
//!
//! A [`FrameLayout`] describes a fixed set of typed slots; a [`Frame`] is one
//! allocation of that layout. Evaluators are compiled against slots of a
//! layout and then evaluate any number of frames allocated from it. Type
//! checks happen when a [`TypedSlot`] is bound back to a typed [`Slot`];
//! reads and writes on the hot path are plain indexed accesses.

use std::marker::PhantomData;

use crate::collections::DenseArray;
use crate::errors::{ForestError, Result};
use crate::types::{Bytes, ValueType};

const UNINITIALIZED_INDEX: u32 = u32::MAX;

/// Per-type slot counters of a layout.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SlotCounts {
    opt_floats: usize,
    opt_longs: usize,
    opt_bytes: usize,
    floats: usize,
    float_arrays: usize,
    long_arrays: usize,
}

/// Element-type hook for values that can live in a frame: supplies the type
/// tag, default initialization, and storage selection.
pub trait FrameValue: Clone + Default + 'static {
    const VALUE_TYPE: ValueType;

    #[doc(hidden)]
    fn storage(frame: &Frame) -> &Vec<Self>;
    #[doc(hidden)]
    fn storage_mut(frame: &mut Frame) -> &mut Vec<Self>;
    #[doc(hidden)]
    fn slot_count_mut(counts: &mut SlotCounts) -> &mut usize;
}

macro_rules! frame_value_impl {
    ($rust_type:ty, $value_type:ident, $field:ident) => {
        impl FrameValue for $rust_type {
            const VALUE_TYPE: ValueType = ValueType::$value_type;

            fn storage(frame: &Frame) -> &Vec<Self> {
                &frame.$field
            }

            fn storage_mut(frame: &mut Frame) -> &mut Vec<Self> {
                &mut frame.$field
            }

            fn slot_count_mut(counts: &mut SlotCounts) -> &mut usize {
                &mut counts.$field
            }
        }
    };
}

frame_value_impl!(Option<f32>, OptionalFloat, opt_floats);
frame_value_impl!(Option<i64>, OptionalLong, opt_longs);
frame_value_impl!(Option<Bytes>, OptionalBytes, opt_bytes);
frame_value_impl!(f32, Float, floats);
frame_value_impl!(DenseArray<f32>, FloatArray, float_arrays);
frame_value_impl!(DenseArray<i64>, LongArray, long_arrays);

/// A typed handle to one slot of a layout.
///
/// An *uninitialized* slot is a placeholder for input ids the forest never
/// reads; accessing one through a frame is a programming error caught by
/// debug assertions.
pub struct Slot<T> {
    index: u32,
    _marker: PhantomData<T>,
}

impl<T> Slot<T> {
    pub(crate) fn new(index: u32) -> Self {
        Slot {
            index,
            _marker: PhantomData,
        }
    }

    pub fn uninitialized() -> Self {
        Slot::new(UNINITIALIZED_INDEX)
    }

    pub fn is_uninitialized(&self) -> bool {
        self.index == UNINITIALIZED_INDEX
    }

    pub(crate) fn index(&self) -> usize {
        debug_assert!(!self.is_uninitialized(), "access to uninitialized slot");
        self.index as usize
    }
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Slot<T> {}

impl<T> PartialEq for Slot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Slot<T> {}

impl<T> std::fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot").field("index", &self.index).finish()
    }
}

/// A type-erased slot: the type tag plus the index of the typed slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypedSlot {
    value_type: ValueType,
    index: u32,
}

impl TypedSlot {
    pub fn from_slot<T: FrameValue>(slot: Slot<T>) -> Self {
        TypedSlot {
            value_type: T::VALUE_TYPE,
            index: slot.index,
        }
    }

    /// Placeholder used to pad input-slot vectors up to an input id.
    pub fn uninitialized() -> Self {
        TypedSlot {
            value_type: ValueType::Float,
            index: UNINITIALIZED_INDEX,
        }
    }

    pub fn is_uninitialized(&self) -> bool {
        self.index == UNINITIALIZED_INDEX
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Binds the slot back to its typed form, checking the type tag.
    pub fn to_slot<T: FrameValue>(&self) -> Result<Slot<T>> {
        if self.value_type != T::VALUE_TYPE {
            return Err(ForestError::invalid_argument(format!(
                "slot type mismatch: expected {}, got {}",
                T::VALUE_TYPE,
                self.value_type
            )));
        }
        Ok(Slot::new(self.index))
    }

    /// Unchecked variant of [`TypedSlot::to_slot`] for paths where the type
    /// has already been validated.
    pub(crate) fn unchecked_to_slot<T: FrameValue>(&self) -> Slot<T> {
        debug_assert_eq!(self.value_type, T::VALUE_TYPE, "slot type mismatch");
        Slot::new(self.index)
    }
}

/// Builds a [`FrameLayout`] incrementally.
#[derive(Debug, Default)]
pub struct FrameLayoutBuilder {
    counts: SlotCounts,
}

impl FrameLayoutBuilder {
    pub fn add_slot<T: FrameValue>(&mut self) -> Slot<T> {
        let count = T::slot_count_mut(&mut self.counts);
        let slot = Slot::new(*count as u32);
        *count += 1;
        slot
    }

    /// Adds a slot of a runtime-selected type.
    pub fn add_typed_slot(&mut self, value_type: ValueType) -> TypedSlot {
        match value_type {
            ValueType::OptionalFloat => TypedSlot::from_slot(self.add_slot::<Option<f32>>()),
            ValueType::OptionalLong => TypedSlot::from_slot(self.add_slot::<Option<i64>>()),
            ValueType::OptionalBytes => TypedSlot::from_slot(self.add_slot::<Option<Bytes>>()),
            ValueType::Float => TypedSlot::from_slot(self.add_slot::<f32>()),
            ValueType::FloatArray => TypedSlot::from_slot(self.add_slot::<DenseArray<f32>>()),
            ValueType::LongArray => TypedSlot::from_slot(self.add_slot::<DenseArray<i64>>()),
        }
    }

    pub fn build(self) -> FrameLayout {
        FrameLayout {
            counts: self.counts,
        }
    }
}

/// An immutable description of the typed slots of a frame.
///
/// # Examples
///
/// ```
/// use rust_dfe::mem::FrameLayout;
///
/// let mut builder = FrameLayout::builder();
/// let input = builder.add_slot::<Option<f32>>();
/// let output = builder.add_slot::<f32>();
/// let layout = builder.build();
///
/// let mut frame = layout.alloc();
/// frame.set(input, Some(1.5));
/// frame.set(output, 3.0);
/// assert_eq!(*frame.get(input), Some(1.5));
/// ```
#[derive(Debug, Clone)]
pub struct FrameLayout {
    counts: SlotCounts,
}

impl FrameLayout {
    pub fn builder() -> FrameLayoutBuilder {
        FrameLayoutBuilder::default()
    }

    /// Allocates a default-initialized frame of this layout.
    pub fn alloc(&self) -> Frame {
        Frame {
            opt_floats: vec![None; self.counts.opt_floats],
            opt_longs: vec![None; self.counts.opt_longs],
            opt_bytes: vec![None; self.counts.opt_bytes],
            floats: vec![0.0; self.counts.floats],
            float_arrays: vec![DenseArray::default(); self.counts.float_arrays],
            long_arrays: vec![DenseArray::default(); self.counts.long_arrays],
        }
    }

    /// Total number of slots across all types.
    pub fn total_slot_count(&self) -> usize {
        self.counts.opt_floats
            + self.counts.opt_longs
            + self.counts.opt_bytes
            + self.counts.floats
            + self.counts.float_arrays
            + self.counts.long_arrays
    }
}

/// One allocation of a [`FrameLayout`]: typed, addressable scalar storage.
#[derive(Debug, Clone)]
pub struct Frame {
    opt_floats: Vec<Option<f32>>,
    opt_longs: Vec<Option<i64>>,
    opt_bytes: Vec<Option<Bytes>>,
    floats: Vec<f32>,
    float_arrays: Vec<DenseArray<f32>>,
    long_arrays: Vec<DenseArray<i64>>,
}

impl Frame {
    pub fn get<T: FrameValue>(&self, slot: Slot<T>) -> &T {
        &T::storage(self)[slot.index()]
    }

    pub fn get_mut<T: FrameValue>(&mut self, slot: Slot<T>) -> &mut T {
        &mut T::storage_mut(self)[slot.index()]
    }

    pub fn set<T: FrameValue>(&mut self, slot: Slot<T>, value: T) {
        T::storage_mut(self)[slot.index()] = value;
    }

    /// Copies the value in `slot` into `other_slot` of `other`.
    pub fn copy_to<T: FrameValue>(&self, slot: Slot<T>, other_slot: Slot<T>, other: &mut Frame) {
        other.set(other_slot, self.get(slot).clone());
    }

    /// Re-initializes the slot to its default value.
    pub fn reset<T: FrameValue>(&mut self, slot: Slot<T>) {
        self.set(slot, T::default());
    }
}
