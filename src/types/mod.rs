//! Scalar type tags and auxiliary value types shared across the crate.

pub mod bytes;
pub mod value_type;

pub use bytes::Bytes;
pub use value_type::ValueType;
