//! Training program configuration.

use crate::common::*;
use cellwise::{
    config::DataConfig, loss::LossKind, model::Architecture, optim::SchedulerKind,
};

#[derive(Debug, Clone, StructOpt, Serialize, Deserialize)]
/// Train the cell classifier on one fold
pub struct TrainingOptions {
    #[structopt(long, default_value = "cellnet_m_dropout")]
    /// network architecture, `<backbone>[_dropout]`
    pub arch: Architecture,
    #[structopt(long, default_value = "19")]
    pub num_classes: usize,
    #[structopt(long, default_value = "4")]
    /// number of image channels
    pub in_channels: usize,
    #[structopt(long, default_value = "512")]
    /// side length of the cell crops
    pub img_size: usize,
    #[structopt(long, default_value = "32")]
    pub batch_size: usize,
    #[structopt(long, default_value = "3")]
    /// number of data loading workers
    pub workers: usize,
    #[structopt(long, default_value = "0")]
    /// index of the validation fold
    pub fold: usize,
    #[structopt(long, default_value = "FocalSymmetricLovaszHardLogLoss")]
    pub loss: LossKind,
    #[structopt(long, default_value = "Adam20WarmUp")]
    pub scheduler: SchedulerKind,
    #[structopt(long, default_value = "1.0")]
    pub scheduler_lr_multiplier: f64,
    #[structopt(long, default_value = "0")]
    pub scheduler_epoch_offset: i64,
    #[structopt(long, default_value = "10")]
    /// the last epoch to train
    pub epochs: usize,
    #[structopt(long, default_value = "50")]
    /// number of batches whose gradients are accumulated before an update
    pub gradient_accumulation_steps: usize,
    #[structopt(long, default_value = "1.0")]
    /// maximum global gradient norm
    pub clipnorm: f64,
    #[structopt(long)]
    /// checkpoint file name in the model directory to resume from
    pub resume: Option<PathBuf>,
    #[structopt(long)]
    /// checkpoint whose weights are loaded before training
    pub load_state_dict_path: Option<PathBuf>,
    #[structopt(long)]
    /// label every cell with the label of its image
    pub image_level_labels: bool,
    #[structopt(long)]
    /// standardize each crop channel
    pub normalize: bool,
    #[structopt(long)]
    /// run a validation pass before training
    pub eval_at_start: bool,
    #[structopt(long, default_value = "0")]
    /// value of CUDA_VISIBLE_DEVICES
    pub gpu_id: String,
    #[structopt(long, default_value = "cellwise")]
    /// name of the experiment directory
    pub out_dir: String,
    #[structopt(long, default_value = "result")]
    pub result_dir: PathBuf,
    #[structopt(long)]
    /// directory of cached cell crops, `<result_dir>/crop_cache` by default
    pub crop_cache_dir: Option<PathBuf>,
    #[structopt(long)]
    /// decode the channel images for every cell instead of caching crops
    pub no_crop_cache: bool,
    #[structopt(long, default_value = "data.json5")]
    /// json5 data configuration file
    pub data_config: PathBuf,
}

/// The complete training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub options: TrainingOptions,
    pub data: DataConfig,
}

impl Config {
    pub fn new(options: TrainingOptions) -> Result<Self> {
        let TrainingOptions {
            num_classes,
            in_channels,
            img_size,
            batch_size,
            workers,
            epochs,
            gradient_accumulation_steps,
            clipnorm,
            ref data_config,
            ..
        } = options;

        ensure!(num_classes > 0, "--num-classes must be positive");
        ensure!(
            (1..=4).contains(&in_channels),
            "--in-channels must be in 1..=4"
        );
        ensure!(img_size > 0, "--img-size must be positive");
        ensure!(batch_size > 0, "--batch-size must be positive");
        ensure!(workers > 0, "--workers must be positive");
        ensure!(epochs > 0, "--epochs must be positive");
        ensure!(
            gradient_accumulation_steps > 0,
            "--gradient-accumulation-steps must be positive"
        );
        ensure!(clipnorm > 0.0, "--clipnorm must be positive");

        let data = DataConfig::open(data_config)?;
        Ok(Self { options, data })
    }

    /// `<result_dir>/logs/<out_dir>/fold<k>`
    pub fn log_dir(&self) -> PathBuf {
        self.fold_dir("logs")
    }

    /// `<result_dir>/models/<out_dir>/fold<k>`
    pub fn model_dir(&self) -> PathBuf {
        self.fold_dir("models")
    }

    /// The checkpoint to resume from, relative to the model directory.
    pub fn resume_path(&self) -> Option<PathBuf> {
        self.options
            .resume
            .as_ref()
            .map(|name| self.model_dir().join(name))
    }

    /// The crop cache directory, unless caching is disabled.
    pub fn crop_cache_dir(&self) -> Option<PathBuf> {
        let TrainingOptions {
            ref result_dir,
            ref crop_cache_dir,
            no_crop_cache,
            ..
        } = self.options;
        if no_crop_cache {
            return None;
        }
        Some(
            crop_cache_dir
                .clone()
                .unwrap_or_else(|| result_dir.join("crop_cache")),
        )
    }

    fn fold_dir(&self, kind: &str) -> PathBuf {
        let TrainingOptions {
            ref result_dir,
            ref out_dir,
            fold,
            ..
        } = self.options;
        result_dir
            .join(kind)
            .join(out_dir)
            .join(format!("fold{}", fold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_options() -> Result<()> {
        let options = TrainingOptions::from_iter_safe(&[
            "train",
            "--arch",
            "cellnet_s_dropout",
            "--loss",
            "focal",
            "--scheduler",
            "adam45",
            "--fold",
            "2",
            "--resume",
            "005.ckpt",
            "--eval-at-start",
        ])?;

        assert_eq!(options.arch.to_string(), "cellnet_s_dropout");
        assert_eq!(options.loss, LossKind::Focal);
        assert_eq!(options.scheduler, SchedulerKind::Adam45);
        assert_eq!(options.fold, 2);
        assert!(options.eval_at_start);
        assert!(!options.normalize);
        assert_eq!(options.gradient_accumulation_steps, 50);
        Ok(())
    }

    #[test]
    fn unknown_loss_is_rejected() {
        let result = TrainingOptions::from_iter_safe(&["train", "--loss", "DiceLoss"]);
        assert!(result.is_err());
    }

    fn config(args: &[&str]) -> Result<Config> {
        Ok(Config {
            options: TrainingOptions::from_iter_safe(args)?,
            data: DataConfig {
                manifests: vec![],
                cell_boxes_dirs: vec![],
                folds_file: PathBuf::from("folds.json"),
                cell_labels_file: None,
                class_names_file: None,
            },
        })
    }

    #[test]
    fn output_dirs() -> Result<()> {
        let config = config(&[
            "train",
            "--out-dir",
            "exp1",
            "--result-dir",
            "/tmp/result",
            "--fold",
            "1",
            "--resume",
            "003.ckpt",
        ])?;

        assert_eq!(config.log_dir(), Path::new("/tmp/result/logs/exp1/fold1"));
        assert_eq!(config.model_dir(), Path::new("/tmp/result/models/exp1/fold1"));
        assert_eq!(
            config.resume_path(),
            Some(PathBuf::from("/tmp/result/models/exp1/fold1/003.ckpt"))
        );
        Ok(())
    }

    #[test]
    fn crop_cache_location() -> Result<()> {
        let default = config(&["train", "--result-dir", "/tmp/result"])?;
        assert_eq!(
            default.crop_cache_dir(),
            Some(PathBuf::from("/tmp/result/crop_cache"))
        );

        let custom = config(&["train", "--crop-cache-dir", "/scratch/crops"])?;
        assert_eq!(custom.crop_cache_dir(), Some(PathBuf::from("/scratch/crops")));

        let disabled = config(&["train", "--no-crop-cache"])?;
        assert_eq!(disabled.crop_cache_dir(), None);
        Ok(())
    }
}
