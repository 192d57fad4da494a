use super::{
    CellBox, CellCropCache, CellCropLoader, CellKey, CellSample, GenericDataset, ImageManifest, LabelSource,
    RandomAccessDataset,
};
use crate::common::*;

/// Cells of labeled images, cropped on access.
#[derive(Debug)]
pub struct CellDataset {
    samples: Vec<CellSample>,
    boxes: HashMap<String, HashMap<usize, CellBox>>,
    loader: CellCropLoader,
    cache: Option<CellCropCache>,
    num_classes: usize,
}

impl CellDataset {
    /// Builds the dataset from `(image_id, cell_index)` pairs.
    ///
    /// Pairs whose image is not in the manifest, whose cell has no box, or
    /// which have no cell-level label are skipped.
    pub fn new(
        pairs: &[(String, usize)],
        manifest: &ImageManifest,
        label_source: &LabelSource,
        loader: CellCropLoader,
        num_classes: usize,
    ) -> Result<Self> {
        let mut boxes: HashMap<String, HashMap<usize, CellBox>> = HashMap::new();
        let mut samples = Vec::with_capacity(pairs.len());
        let mut num_unknown_images = 0;
        let mut num_missing_boxes = 0;
        let mut num_unlabeled = 0;

        for (image_id, cell_index) in pairs {
            let image = match manifest.get(image_id) {
                Some(image) => image,
                None => {
                    num_unknown_images += 1;
                    continue;
                }
            };

            if !boxes.contains_key(image_id) {
                let image_boxes = loader
                    .boxes()
                    .load(image_id)?
                    .into_iter()
                    .map(|cell| (cell.cell_index, cell))
                    .collect();
                boxes.insert(image_id.clone(), image_boxes);
            }
            if !boxes[image_id].contains_key(cell_index) {
                num_missing_boxes += 1;
                continue;
            }

            let label = match label_source {
                LabelSource::ImageLevel => image.label.clone(),
                LabelSource::CellLevel(labels) => match labels.get(image_id, *cell_index) {
                    Some(label) => label.clone(),
                    None => {
                        num_unlabeled += 1;
                        continue;
                    }
                },
            };
            ensure!(
                label.num_classes() == num_classes,
                "label of cell {} in image '{}' has {} classes, expect {}",
                cell_index,
                image_id,
                label.num_classes(),
                num_classes
            );

            samples.push(CellSample {
                image: image.clone(),
                cell_index: *cell_index,
                label,
            });
        }

        if num_unknown_images > 0 {
            warn!("skipped {} cells of unlisted images", num_unknown_images);
        }
        if num_missing_boxes > 0 {
            warn!("skipped {} cells without boxes", num_missing_boxes);
        }
        if num_unlabeled > 0 {
            warn!("skipped {} cells without cell-level labels", num_unlabeled);
        }

        Ok(Self {
            samples,
            boxes,
            loader,
            cache: None,
            num_classes,
        })
    }

    /// Reads crops through an on-disk cache, so that each image is decoded
    /// once rather than once per cell.
    pub fn with_crop_cache<P>(self, cache_dir: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let cache = CellCropCache::new(cache_dir, self.loader.clone())?;
        Ok(Self {
            cache: Some(cache),
            ..self
        })
    }

    pub fn samples(&self) -> &[CellSample] {
        &self.samples
    }
}

impl GenericDataset for CellDataset {
    fn input_channels(&self) -> usize {
        self.loader.in_channels()
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

impl RandomAccessDataset for CellDataset {
    fn num_samples(&self) -> usize {
        self.samples.len()
    }

    fn nth(&self, index: usize) -> Result<(CellKey, Tensor, Tensor)> {
        let sample = self.samples.get(index).ok_or_else(|| {
            format_err!(
                "sample index {} is out of range, the dataset has {} samples",
                index,
                self.samples.len()
            )
        })?;
        let boxes = self
            .boxes
            .get(&sample.image.id)
            .ok_or_else(|| format_err!("no boxes for sample {:?}", sample.key()))?;

        let crop = match &self.cache {
            Some(cache) => cache.load_cell(&sample.image, sample.cell_index, boxes)?,
            None => {
                let cell = boxes
                    .get(&sample.cell_index)
                    .ok_or_else(|| format_err!("no box for sample {:?}", sample.key()))?;
                let pixels = self.loader.load_image(&sample.image.base_path)?;
                self.loader.crop(&pixels, cell)?
            }
        };
        Ok((sample.key(), crop, sample.label.to_tensor()))
    }
}
