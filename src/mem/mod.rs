//! Typed scalar storage: frame layouts, slots, and immutable sequences.

pub mod frame;
pub mod sequence;

pub use frame::{Frame, FrameLayout, FrameLayoutBuilder, FrameValue, Slot, TypedSlot};
pub use sequence::{MutableSequence, Sequence};
