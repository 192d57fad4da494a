//! The training program of the cell classifier.

pub mod common;
pub mod config;
pub mod logging;
pub mod trainer;

use crate::{common::*, config::Config, logging::LoggingMessage, trainer::Trainer};
use cellwise::{
    augment::RandomFlipRotate,
    dataset::{CellCropLoaderInit, CellDataset, DataLoader, DataLoaderInit},
    folds::FoldAssignment,
};

/// The entry of training program.
pub async fn start(config: Arc<Config>) -> Result<()> {
    let log_dir = config.log_dir();
    let model_dir = config.model_dir();

    // create dirs and save config
    {
        tokio::fs::create_dir_all(&log_dir).await?;
        tokio::fs::create_dir_all(&model_dir).await?;
        let path = log_dir.join("config.json");
        let text = serde_json::to_string_pretty(&*config)?;
        tokio::fs::write(&path, text).await?;
    }

    // start logger
    let (logging_tx, logging_rx) = mpsc::channel(16);
    let class_names = config.data.class_names(config.options.num_classes)?;
    let logging_future = logging::logging_worker(&log_dir, class_names, logging_rx).await?;

    logging_tx
        .send(LoggingMessage::text(format!(
            "--- [START {}] {}\n>> Creating directory if it does not exist:\n>> '{}'",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            "-".repeat(64),
            model_dir.display()
        )))
        .await
        .map_err(|_| format_err!("the logging worker stopped"))?;

    // load dataset
    info!("loading dataset");
    let (train_loader, valid_loader) = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || load_datasets(&config)).await??
    };

    // training worker
    let training_worker_future = {
        let config = config.clone();
        let runtime = tokio::runtime::Handle::current();

        tokio::task::spawn_blocking(move || {
            let device = Device::cuda_if_available();
            info!("use device {:?}", device);
            let trainer = Trainer::new(
                config,
                device,
                train_loader,
                valid_loader,
                runtime,
                logging_tx,
            )?;
            let progress = trainer.run()?;
            info!(
                "training finished at epoch {}, best epoch {} with focal loss {:.4}",
                progress.epoch, progress.best_epoch, progress.best_metric
            );
            Fallible::Ok(())
        })
        .map(|result| Fallible::Ok(result??))
    };

    futures::try_join!(training_worker_future, logging_future)?;

    Ok(())
}

/// Loads the training and validation sets of the configured fold.
fn load_datasets(config: &Config) -> Result<(DataLoader, DataLoader)> {
    let Config {
        ref options,
        ref data,
    } = *config;

    let manifest = data.load_manifest(options.num_classes, options.in_channels)?;
    let label_source = data.label_source(options.image_level_labels, options.num_classes)?;

    let folds = FoldAssignment::load(&data.folds_file)?;
    folds.log_sizes();
    let (train_pairs, valid_pairs) = folds.train_val_split(options.fold)?;

    let crop_loader = CellCropLoaderInit {
        image_size: options.img_size,
        in_channels: options.in_channels,
        normalize: options.normalize,
        boxes: data.cell_box_index(),
    }
    .build()?;

    let mut train_set = CellDataset::new(
        &train_pairs,
        &manifest,
        &label_source,
        crop_loader.clone(),
        options.num_classes,
    )?;
    let mut valid_set = CellDataset::new(
        &valid_pairs,
        &manifest,
        &label_source,
        crop_loader,
        options.num_classes,
    )?;
    if let Some(cache_dir) = config.crop_cache_dir() {
        info!("cache cell crops in '{}'", cache_dir.display());
        train_set = train_set.with_crop_cache(&cache_dir)?;
        valid_set = valid_set.with_crop_cache(&cache_dir)?;
    }
    info!(
        "fold {}: {} training cells, {} validation cells",
        options.fold,
        train_set.samples().len(),
        valid_set.samples().len()
    );
    ensure!(
        !train_set.samples().is_empty(),
        "no training cells in fold {}",
        options.fold
    );

    let train_loader = DataLoaderInit {
        batch_size: options.batch_size,
        num_workers: options.workers,
        shuffle: true,
        augmentation: Some(RandomFlipRotate::default()),
    }
    .build(Arc::new(train_set))?;
    let valid_loader = DataLoaderInit {
        batch_size: options.batch_size,
        num_workers: options.workers,
        shuffle: false,
        augmentation: None,
    }
    .build(Arc::new(valid_set))?;

    Ok((train_loader, valid_loader))
}
