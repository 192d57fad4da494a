//! Test-time-augmented inference over the cells of images.

mod pipeline;
mod table;

pub use pipeline::*;
pub use table::*;
