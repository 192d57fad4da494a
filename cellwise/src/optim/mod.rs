//! Optimizer and learning rate schedules.

mod adam;
mod lr_scheduler;

pub use adam::*;
pub use lr_scheduler::*;
