//! Validation metrics.

mod average_precision;
mod meter;
mod validation;

pub use average_precision::*;
pub use meter::*;
pub use validation::*;
