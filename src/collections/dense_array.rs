//! DenseArray - immutable columnar array with optional per-row presence
//!
//! The columnar counterpart of an optional scalar: row `i` either holds a
//! value or is missing. Arrays are frozen at construction and cheap to
//! clone (the storage is shared), which lets batched evaluation pass them
//! around without copying column data.

use std::sync::Arc;

/// An immutable columnar array of `T` with optional missing-value tracking.
///
/// A *full* array has no missing rows; gathered evaluator outputs are always
/// full, which the batched accumulation step relies on.
///
/// # Examples
///
/// ```
/// use rust_dfe::collections::DenseArray;
///
/// let full = DenseArray::from_values(vec![1.0f32, 2.0, 3.0]);
/// assert!(full.is_full());
/// assert_eq!(full.get(1), Some(2.0));
///
/// let mut builder = rust_dfe::collections::DenseArrayBuilder::new(2);
/// builder.set(0, 5i64);
/// let sparse = builder.build();
/// assert_eq!(sparse.get(0), Some(5));
/// assert_eq!(sparse.get(1), None);
/// ```
#[derive(Debug, Clone)]
pub struct DenseArray<T> {
    values: Arc<[T]>,
    /// `None` means every row is present.
    presence: Option<Arc<[bool]>>,
}

impl<T: Copy + Default> DenseArray<T> {
    /// Creates a full array from the given values.
    pub fn from_values(values: Vec<T>) -> Self {
        DenseArray {
            values: values.into(),
            presence: None,
        }
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns `true` if no row is missing.
    pub fn is_full(&self) -> bool {
        match &self.presence {
            None => true,
            Some(presence) => presence.iter().all(|&p| p),
        }
    }

    /// Returns the value at `row`, or `None` if the row is missing.
    ///
    /// # Panics
    ///
    /// Panics if `row >= size()`.
    pub fn get(&self, row: usize) -> Option<T> {
        match &self.presence {
            Some(presence) if !presence[row] => None,
            _ => Some(self.values[row]),
        }
    }

    /// Direct access to the value storage. Missing rows hold `T::default()`;
    /// only meaningful for full arrays.
    pub fn values(&self) -> &[T] {
        &self.values
    }
}

impl<T: Copy + Default> Default for DenseArray<T> {
    fn default() -> Self {
        DenseArray {
            values: Vec::new().into(),
            presence: None,
        }
    }
}

/// Row-by-row construction of a [`DenseArray`]. Unset rows are missing.
pub struct DenseArrayBuilder<T> {
    values: Vec<T>,
    presence: Vec<bool>,
    missing: usize,
}

impl<T: Copy + Default> DenseArrayBuilder<T> {
    pub fn new(size: usize) -> Self {
        DenseArrayBuilder {
            values: vec![T::default(); size],
            presence: vec![false; size],
            missing: size,
        }
    }

    pub fn set(&mut self, row: usize, value: T) {
        if !self.presence[row] {
            self.missing -= 1;
        }
        self.values[row] = value;
        self.presence[row] = true;
    }

    pub fn build(self) -> DenseArray<T> {
        DenseArray {
            values: self.values.into(),
            presence: if self.missing == 0 {
                None
            } else {
                Some(self.presence.into())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_values_is_full() {
        let array = DenseArray::from_values(vec![1.5f32, -2.0]);
        assert_eq!(array.size(), 2);
        assert!(array.is_full());
        assert_eq!(array.get(0), Some(1.5));
        assert_eq!(array.get(1), Some(-2.0));
    }

    #[test]
    fn test_builder_tracks_missing_rows() {
        let mut builder = DenseArrayBuilder::new(3);
        builder.set(0, 7i64);
        builder.set(2, 9i64);
        let array = builder.build();
        assert!(!array.is_full());
        assert_eq!(array.get(0), Some(7));
        assert_eq!(array.get(1), None);
        assert_eq!(array.get(2), Some(9));
    }

    #[test]
    fn test_builder_with_all_rows_set_is_full() {
        let mut builder = DenseArrayBuilder::new(2);
        builder.set(0, 1.0f32);
        builder.set(1, 2.0f32);
        assert!(builder.build().is_full());
    }

    #[test]
    fn test_clone_shares_storage() {
        let array = DenseArray::from_values(vec![1.0f32; 1024]);
        let copy = array.clone();
        assert!(std::ptr::eq(array.values(), copy.values()));
    }
}
