pub use anyhow::{ensure, format_err, Context, Error, Result};
pub use futures::future::FutureExt;
pub use log::{info, warn};
pub use serde::{Deserialize, Serialize};
pub use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
pub use structopt::StructOpt;
pub use tch::{nn, Device};

pub type Fallible<T> = Result<T, Error>;
