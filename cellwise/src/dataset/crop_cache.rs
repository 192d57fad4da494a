//! On-disk cache of resized cell crops.

use super::{CellBox, CellCropLoader, ImageRecord};
use crate::common::*;

/// Keeps the resized uint8 crop of every cell on disk.
///
/// On a miss, the image is decoded once and the crops of all its cells are
/// written, so the other cells of the image hit the cache afterwards. Crops
/// are stored as `<cache_dir>/c<channels>-s<size>/<image_id>/<cell_index>.pt`.
#[derive(Debug, Clone)]
pub struct CellCropCache {
    cache_dir: PathBuf,
    loader: CellCropLoader,
}

impl CellCropCache {
    pub fn new<P>(cache_dir: P, loader: CellCropLoader) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let cache_dir = cache_dir.as_ref().join(format!(
            "c{}-s{}",
            loader.in_channels(),
            loader.image_size()
        ));
        fs::create_dir_all(&cache_dir).with_context(|| {
            format!("failed to create crop cache dir '{}'", cache_dir.display())
        })?;

        Ok(Self { cache_dir, loader })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn cell_path(&self, image_id: &str, cell_index: usize) -> PathBuf {
        self.cache_dir
            .join(image_id)
            .join(format!("{}.pt", cell_index))
    }

    /// Returns the float crop of a cell, given the boxes of its image.
    pub fn load_cell(
        &self,
        image: &ImageRecord,
        cell_index: usize,
        boxes: &HashMap<usize, CellBox>,
    ) -> Result<Tensor> {
        let path = self.cell_path(&image.id, cell_index);
        let raw = if path.is_file() {
            Tensor::load(&path)
                .with_context(|| format!("failed to load cached crop '{}'", path.display()))?
        } else {
            self.fill(image, cell_index, boxes)?
        };
        Ok(self.loader.finish(&raw))
    }

    /// Decodes the image, caches the crops of all its cells and returns the
    /// raw crop of the requested one.
    fn fill(
        &self,
        image: &ImageRecord,
        cell_index: usize,
        boxes: &HashMap<usize, CellBox>,
    ) -> Result<Tensor> {
        let requested = boxes
            .get(&cell_index)
            .ok_or_else(|| format_err!("image '{}' has no cell {}", image.id, cell_index))?;
        let pixels = self.loader.load_image(&image.base_path)?;
        let requested = self.loader.crop_raw(&pixels, requested)?;

        let image_dir = self.cache_dir.join(&image.id);
        fs::create_dir_all(&image_dir)?;
        debug!("caching {} cell crops of image '{}'", boxes.len(), image.id);

        for (&index, cell) in boxes {
            let raw = if index == cell_index {
                requested.shallow_clone()
            } else {
                match self.loader.crop_raw(&pixels, cell) {
                    Ok(raw) => raw,
                    Err(err) => {
                        warn!("skip caching cell {} of '{}': {:#}", index, image.id, err);
                        continue;
                    }
                }
            };

            // workers may fill the same image concurrently
            let path = self.cell_path(&image.id, index);
            let tmp_path = image_dir.join(format!(".{}.{:016x}.tmp", index, rand::random::<u64>()));
            raw.save(&tmp_path)
                .with_context(|| format!("failed to write '{}'", tmp_path.display()))?;
            fs::rename(&tmp_path, &path).with_context(|| {
                format!(
                    "failed to rename '{}' to '{}'",
                    tmp_path.display(),
                    path.display()
                )
            })?;
        }

        Ok(requested)
    }
}
