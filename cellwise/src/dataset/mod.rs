//! Image manifests, cell boxes, crop loading and batching.

mod cell_boxes;
mod cell_dataset;
mod cell_labels;
mod crop_cache;
mod crop_loader;
mod dataset_;
mod loader;
mod manifest;
mod record;

pub use cell_boxes::*;
pub use cell_dataset::*;
pub use cell_labels::*;
pub use crop_cache::*;
pub use crop_loader::*;
pub use dataset_::*;
pub use loader::*;
pub use manifest::*;
pub use record::*;
