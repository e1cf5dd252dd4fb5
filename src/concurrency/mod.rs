//! Thread fan-out used by the batched evaluator's optional parallel mode.

pub mod threading;

pub use threading::{StdThreading, Task, Threading};
