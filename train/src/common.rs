//! Common imports from external crates.

pub use anyhow::{bail, ensure, format_err, Context, Error, Result};
pub use chrono::Local;
pub use futures::future::FutureExt;
pub use log::{info, warn};
pub use serde::{Deserialize, Serialize};
pub use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
pub use structopt::StructOpt;
pub use tch::{nn, Device};
pub use tfrecord::{EventWriter, EventWriterInit};
pub use tokio::sync::mpsc;

pub type Fallible<T> = Result<T, Error>;
