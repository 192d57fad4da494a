use crate::common::*;
use cellwise::{config::DataConfig, model::Architecture};

#[derive(Debug, Clone, StructOpt, Serialize, Deserialize)]
/// Predict cell classes and embeddings with the fold models
pub struct PredictOptions {
    #[structopt(long, default_value = "result/models/cellwise")]
    /// directory containing `fold<k>/final.ckpt`
    pub model_folds_dir: PathBuf,
    #[structopt(long, default_value = "0")]
    /// value of CUDA_VISIBLE_DEVICES
    pub gpu_id: String,
    #[structopt(long, default_value = "cellnet_m_dropout")]
    pub arch: Architecture,
    #[structopt(long, default_value = "19")]
    pub num_classes: usize,
    #[structopt(long, default_value = "4")]
    pub in_channels: usize,
    #[structopt(long, default_value = "1024")]
    /// side length of the cell crops
    pub img_size: usize,
    #[structopt(long)]
    /// standardize each crop channel
    pub normalize: bool,
    #[structopt(long, default_value = "5")]
    pub num_folds: usize,
    #[structopt(long)]
    /// only predict the given fold
    pub fold_single: Option<usize>,
    #[structopt(long)]
    /// only predict the given fifth of each fold, 0..=4
    pub fold_one_fifth_number: Option<usize>,
    #[structopt(long, default_value = "output")]
    pub output_dir: PathBuf,
    #[structopt(long, default_value = "data.json5")]
    /// json5 data configuration file
    pub data_config: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub options: PredictOptions,
    pub data: DataConfig,
}

impl Config {
    pub fn new(options: PredictOptions) -> Result<Self> {
        let PredictOptions {
            num_classes,
            in_channels,
            img_size,
            num_folds,
            fold_single,
            fold_one_fifth_number,
            ref data_config,
            ..
        } = options;

        ensure!(num_classes > 0, "--num-classes must be positive");
        ensure!(
            (1..=4).contains(&in_channels),
            "--in-channels must be in 1..=4"
        );
        ensure!(img_size > 0, "--img-size must be positive");
        ensure!(num_folds > 0, "--num-folds must be positive");
        if let Some(fold) = fold_single {
            ensure!(
                fold < num_folds,
                "--fold-single {} exceeds the number of folds {}",
                fold,
                num_folds
            );
        }
        if let Some(number) = fold_one_fifth_number {
            ensure!(number < 5, "--fold-one-fifth-number must be in 0..=4");
        }

        let data = DataConfig::open(data_config)?;
        Ok(Self { options, data })
    }

    /// The folds to predict, either the single given one or all of them.
    pub fn folds(&self) -> Vec<usize> {
        match self.options.fold_single {
            Some(fold) => vec![fold],
            None => (0..self.options.num_folds).collect(),
        }
    }

    pub fn model_path(&self, fold: usize) -> PathBuf {
        cellwise::checkpoint::final_checkpoint_path(
            &self.options.model_folds_dir.join(format!("fold{}", fold)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(args: &[&str]) -> Result<Config> {
        Ok(Config {
            options: PredictOptions::from_iter_safe(args)?,
            data: DataConfig {
                manifests: vec![],
                cell_boxes_dirs: vec![],
                folds_file: "folds.json".into(),
                cell_labels_file: None,
                class_names_file: None,
            },
        })
    }

    #[test]
    fn fold_selection() -> Result<()> {
        let all = config(&["predict", "--num-folds", "3"])?;
        assert_eq!(all.folds(), vec![0, 1, 2]);

        let single = config(&["predict", "--fold-single", "1"])?;
        assert_eq!(single.folds(), vec![1]);
        Ok(())
    }

    #[test]
    fn model_path_of_fold() -> Result<()> {
        let config = config(&["predict", "--model-folds-dir", "models/exp"])?;
        assert_eq!(
            config.model_path(2),
            Path::new("models/exp/fold2/final.ckpt")
        );
        Ok(())
    }
}
