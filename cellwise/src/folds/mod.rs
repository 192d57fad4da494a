//! Cross-validation folds over segmented cells.

mod assignment;
mod kfold;
mod partition;
mod shard;

pub use assignment::*;
pub use kfold::*;
pub use partition::*;
pub use shard::*;
