//! Network blocks and multi-label loss functions built on [tch].

mod common;

pub mod bce_with_logits_loss;
pub mod conv_bn_2d;
pub mod focal_loss;
pub mod hard_log_loss;
pub mod lovasz_loss;

pub use bce_with_logits_loss::*;
pub use conv_bn_2d::*;
pub use focal_loss::*;
pub use hard_log_loss::*;
pub use lovasz_loss::*;
