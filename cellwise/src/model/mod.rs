//! The cell classifier network.

mod architecture;
mod classifier;
mod encoder;

pub use architecture::*;
pub use classifier::*;
pub use encoder::*;
