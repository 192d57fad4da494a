use anyhow::{Context, Result};
use std::{env, sync::Arc};
use structopt::StructOpt;
use train::config::{Config, TrainingOptions};

#[tokio::main]
pub async fn main() -> Result<()> {
    // setup logger
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init();

    // parse arguments
    let options = TrainingOptions::from_args();

    // must be set before libtorch initializes CUDA
    env::set_var("CUDA_VISIBLE_DEVICES", &options.gpu_id);

    let data_config = options.data_config.clone();
    let config = Arc::new(Config::new(options).with_context(|| {
        format!(
            "failed to load data config '{}'",
            data_config.display()
        )
    })?);

    // start training program
    train::start(config).await?;

    Ok(())
}
