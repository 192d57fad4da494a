//! The building blocks of cell-level protein localization: fold partitioning,
//! cell datasets, the classifier network, checkpoints, validation metrics and
//! the test-time-augmented inference pipeline.

mod common;
pub mod augment;
pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod error;
pub mod folds;
pub mod inference;
pub mod label;
pub mod loss;
pub mod metrics;
pub mod model;
pub mod optim;
pub mod utils;
