use anyhow::{Context, Result};
use predict::config::{Config, PredictOptions};
use std::{env, sync::Arc};
use structopt::StructOpt;

#[tokio::main]
pub async fn main() -> Result<()> {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init();

    // parse arguments
    let options = PredictOptions::from_args();
    env::set_var("CUDA_VISIBLE_DEVICES", &options.gpu_id);

    let data_config = options.data_config.clone();
    let config = Arc::new(Config::new(options).with_context(|| {
        format!("failed to load data config '{}'", data_config.display())
    })?);

    // start inference
    predict::start(config).await?;

    Ok(())
}
