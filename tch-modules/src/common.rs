pub use anyhow::{bail, ensure, format_err, Error, Result};
pub use derivative::Derivative;
pub use std::borrow::Borrow;
pub use tch::{
    nn::{self, Module as _, ModuleT as _, OptimizerConfig as _},
    Device, IndexOp, Kind, Reduction, Tensor,
};
pub use tch_act::Activation;

pub type Fallible<T> = Result<T, Error>;
