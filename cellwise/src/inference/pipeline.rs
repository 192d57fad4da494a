use super::CellTable;
use crate::{
    augment::{augmented_views, Transform, TTA_TRANSFORMS},
    common::*,
    dataset::{CellCropSource, ImageRecord},
    model::CellEncoder,
    utils::{self, RateCounter},
};

/// The prediction and embedding directories of one fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDirs {
    pub predictions: PathBuf,
    pub embeddings: PathBuf,
}

impl OutputDirs {
    /// Returns `<output_dir>/fold<k>/{predictions,embeddings}`.
    pub fn for_fold(output_dir: &Path, fold: usize) -> Self {
        let fold_dir = output_dir.join(format!("fold{}", fold));
        Self {
            predictions: fold_dir.join("predictions"),
            embeddings: fold_dir.join("embeddings"),
        }
    }

    pub fn create(&self) -> Result<()> {
        for dir in [&self.predictions, &self.embeddings] {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory '{}'", dir.display()))?;
        }
        Ok(())
    }

    pub fn prediction_path(&self, image: &ImageRecord) -> Result<PathBuf> {
        let name = utils::base_name(&image.base_path)?;
        Ok(self.predictions.join(format!("{}.csv", name)))
    }

    pub fn embedding_path(&self, image: &ImageRecord) -> Result<PathBuf> {
        let name = utils::base_name(&image.base_path)?;
        Ok(self.embeddings.join(format!("{}.csv", name)))
    }
}

/// What happened to an image in an inference pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOutcome {
    Written { num_cells: usize },
    /// The prediction table already exists.
    AlreadyComputed,
    NoCells,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferenceSummary {
    pub num_written: usize,
    pub num_already_computed: usize,
    pub num_without_cells: usize,
    pub num_cells: usize,
}

/// Predicts every cell of an image under test-time augmentation.
///
/// Each cell is fed as a batch of its augmented views, and the class
/// probabilities and embeddings are averaged over the views. The embedding
/// table is written before the prediction table, so an existing prediction
/// table marks a finished image.
#[derive(Debug)]
pub struct InferencePipeline<'a, E, S>
where
    E: CellEncoder,
    S: CellCropSource,
{
    encoder: &'a E,
    source: &'a S,
    dirs: OutputDirs,
    device: Device,
    transforms: Vec<Transform>,
}

impl<'a, E, S> InferencePipeline<'a, E, S>
where
    E: CellEncoder,
    S: CellCropSource,
{
    pub fn new(encoder: &'a E, source: &'a S, dirs: OutputDirs, device: Device) -> Self {
        Self {
            encoder,
            source,
            dirs,
            device,
            transforms: TTA_TRANSFORMS.to_vec(),
        }
    }

    pub fn dirs(&self) -> &OutputDirs {
        &self.dirs
    }

    pub fn is_computed(&self, image: &ImageRecord) -> Result<bool> {
        Ok(self.dirs.prediction_path(image)?.exists())
    }

    /// Returns the `[num_cells, num_classes]` probabilities and
    /// `[num_cells, embedding_dim]` embeddings of the crops.
    pub fn predict_cells(&self, crops: &[Tensor]) -> Result<(Tensor, Tensor)> {
        ensure!(!crops.is_empty(), "no cell crop to predict");

        let (probs, embeddings): (Vec<_>, Vec<_>) = crops
            .iter()
            .map(|crop| -> Result<_> {
                let views = augmented_views(crop, &self.transforms)?.to_device(self.device);
                let (probs, embeddings) = self.encoder.predict_and_embed(&views);
                let probs = probs.mean_dim(&[0], false, Kind::Float);
                let embeddings = embeddings.mean_dim(&[0], false, Kind::Float);
                Ok((probs.to_device(Device::Cpu), embeddings.to_device(Device::Cpu)))
            })
            .process_results(|iter| iter.unzip())?;

        Ok((Tensor::stack(&probs, 0), Tensor::stack(&embeddings, 0)))
    }

    pub fn process_image(&self, image: &ImageRecord) -> Result<ImageOutcome> {
        let prediction_path = self.dirs.prediction_path(image)?;
        if prediction_path.exists() {
            return Ok(ImageOutcome::AlreadyComputed);
        }

        let crops = self
            .source
            .cell_crops(image)
            .with_context(|| format!("failed to extract cells of image '{}'", image.id))?;
        if crops.is_empty() {
            return Ok(ImageOutcome::NoCells);
        }

        let (probs, embeddings) = self.predict_cells(&crops)?;
        CellTable::from_tensor(&embeddings)?.write(&self.dirs.embedding_path(image)?)?;
        CellTable::from_tensor(&probs)?.write(&prediction_path)?;

        Ok(ImageOutcome::Written {
            num_cells: crops.len(),
        })
    }

    /// Processes the images from the last one to the first one.
    pub fn run(&self, images: &[Arc<ImageRecord>]) -> Result<InferenceSummary> {
        self.dirs.create()?;

        let mut summary = InferenceSummary::default();
        let mut rate_counter = RateCounter::new(Duration::from_secs(30));
        let num_images = images.len();

        for (count, image) in images.iter().rev().enumerate() {
            match self.process_image(image)? {
                ImageOutcome::Written { num_cells } => {
                    summary.num_written += 1;
                    summary.num_cells += num_cells;
                    rate_counter.add(1.0);
                }
                ImageOutcome::AlreadyComputed => summary.num_already_computed += 1,
                ImageOutcome::NoCells => {
                    debug!("image '{}' has no cells", image.id);
                    summary.num_without_cells += 1;
                }
            }

            if let Some(rate) = rate_counter.rate() {
                info!(
                    "processed {}/{} images ({:.2} images/s)",
                    count + 1,
                    num_images,
                    rate
                );
            }
        }

        info!(
            "wrote {} images with {} cells, {} already computed, {} without cells",
            summary.num_written,
            summary.num_cells,
            summary.num_already_computed,
            summary.num_without_cells
        );
        Ok(summary)
    }
}
