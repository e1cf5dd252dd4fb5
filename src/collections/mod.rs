//! Columnar containers used by batched evaluation.

pub mod dense_array;

pub use dense_array::{DenseArray, DenseArrayBuilder};
