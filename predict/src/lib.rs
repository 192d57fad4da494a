//! Test-time-augmented cell prediction with the models of each fold.

mod common;
pub mod config;

use crate::{common::*, config::Config};
use cellwise::{
    checkpoint::load_state_dict,
    dataset::{CellCropLoader, CellCropLoaderInit, ImageManifest, ImageRecord},
    folds::{one_fifth_shard, FoldAssignment},
    inference::{InferencePipeline, InferenceSummary, OutputDirs},
    model::CellClassifierInit,
};

pub async fn start(config: Arc<Config>) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        let device = Device::cuda_if_available();
        info!("use device {:?}", device);
        tch::manual_seed(0);

        let Config {
            ref options,
            ref data,
        } = *config;

        // load dataset
        let manifest = data.load_manifest(options.num_classes, options.in_channels)?;
        let folds = FoldAssignment::load(&data.folds_file)?;
        folds.log_sizes();
        let crop_loader = CellCropLoaderInit {
            image_size: options.img_size,
            in_channels: options.in_channels,
            normalize: options.normalize,
            boxes: data.cell_box_index(),
        }
        .build()?;

        for fold in config.folds() {
            let summary = predict_fold(&config, &manifest, &folds, &crop_loader, fold, device)?;
            info!(
                "fold {}: {} images written with {} cells, {} already computed, {} without cells",
                fold,
                summary.num_written,
                summary.num_cells,
                summary.num_already_computed,
                summary.num_without_cells
            );
        }

        Fallible::Ok(())
    })
    .map(|result| Fallible::Ok(result??))
    .await
}

/// Lists the images of a fold to predict, in fold order.
///
/// Only the selected fifth is kept when a shard number is configured, and
/// images absent from the manifest are dropped.
pub fn fold_images(
    folds: &FoldAssignment,
    manifest: &ImageManifest,
    fold: usize,
    one_fifth_number: Option<usize>,
) -> Result<Vec<Arc<ImageRecord>>> {
    let image_ids = folds.image_ids(fold)?;
    let image_ids = match one_fifth_number {
        Some(number) => one_fifth_shard(&image_ids, number)?,
        None => &image_ids[..],
    };

    let images: Vec<_> = image_ids
        .iter()
        .filter_map(|&image_id| manifest.get(image_id).cloned())
        .collect();
    let num_unknown = image_ids.len() - images.len();
    if num_unknown > 0 {
        warn!(
            "{} images of fold {} are not in the manifests",
            num_unknown, fold
        );
    }
    Ok(images)
}

fn predict_fold(
    config: &Config,
    manifest: &ImageManifest,
    folds: &FoldAssignment,
    crop_loader: &CellCropLoader,
    fold: usize,
    device: Device,
) -> Result<InferenceSummary> {
    let options = &config.options;

    // load model
    let mut vs = nn::VarStore::new(device);
    let model = CellClassifierInit {
        architecture: options.arch,
        in_channels: options.in_channels,
        num_classes: options.num_classes,
    }
    .build(&vs.root())?;
    let model_path = config.model_path(fold);
    load_state_dict(&mut vs, &model_path)?;
    info!("loaded model '{}'", model_path.display());

    let images = fold_images(folds, manifest, fold, options.fold_one_fifth_number)?;
    info!("fold {}: {} images to predict", fold, images.len());

    let dirs = OutputDirs::for_fold(&options.output_dir, fold);
    let pipeline = InferencePipeline::new(&model, crop_loader, dirs, device);
    pipeline.run(&images)
}
