use super::{CellBox, CellBoxIndex, ImageRecord};
use crate::common::*;

/// File name suffixes of the channel images, in channel order.
pub const CHANNEL_SUFFIXES: [&str; 4] = ["red", "green", "blue", "yellow"];

/// Produces the cell crops of an image in extraction order.
pub trait CellCropSource
where
    Self: Debug + Send + Sync,
{
    /// Returns a `[C, S, S]` float crop for every cell of the image.
    fn cell_crops(&self, image: &ImageRecord) -> Result<Vec<Tensor>>;
}

#[derive(Debug, Clone)]
pub struct CellCropLoaderInit {
    pub image_size: usize,
    pub in_channels: usize,
    /// Standardize each channel of a crop to zero mean and unit variance.
    pub normalize: bool,
    pub boxes: CellBoxIndex,
}

impl CellCropLoaderInit {
    pub fn build(self) -> Result<CellCropLoader> {
        let Self {
            image_size,
            in_channels,
            normalize,
            boxes,
        } = self;

        ensure!(image_size > 0, "image_size must be positive");
        ensure!(
            (1..=CHANNEL_SUFFIXES.len()).contains(&in_channels),
            "in_channels must be in range 1..={}, but get {}",
            CHANNEL_SUFFIXES.len(),
            in_channels
        );

        Ok(CellCropLoader {
            image_size: image_size as i64,
            in_channels,
            normalize,
            boxes,
        })
    }
}

/// Loads channel images from `<base>_<color>.png` files and crops cells out of them.
#[derive(Debug, Clone)]
pub struct CellCropLoader {
    image_size: i64,
    in_channels: usize,
    normalize: bool,
    boxes: CellBoxIndex,
}

impl CellCropLoader {
    pub fn image_size(&self) -> usize {
        self.image_size as usize
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn boxes(&self) -> &CellBoxIndex {
        &self.boxes
    }

    /// Returns the path of each channel file of an image.
    pub fn channel_paths(&self, base_path: &Path) -> Result<Vec<PathBuf>> {
        let base_name = crate::utils::base_name(base_path)?;
        Ok(CHANNEL_SUFFIXES[..self.in_channels]
            .iter()
            .map(|suffix| base_path.with_file_name(format!("{}_{}.png", base_name, suffix)))
            .collect())
    }

    /// Loads the channels of an image into a `[C, H, W]` uint8 tensor.
    pub fn load_image(&self, base_path: &Path) -> Result<Tensor> {
        let channels: Vec<Tensor> = self
            .channel_paths(base_path)?
            .iter()
            .map(|path| load_gray_channel(path))
            .try_collect()?;

        let shape = channels[0].size();
        for (channel, path) in izip!(&channels, self.channel_paths(base_path)?) {
            ensure!(
                channel.size() == shape,
                "channel '{}' has shape {:?}, expect {:?}",
                path.display(),
                channel.size(),
                shape
            );
        }

        Ok(Tensor::stack(&channels, 0))
    }

    /// Crops a cell out of a `[C, H, W]` uint8 image.
    ///
    /// The box is clamped to the image bounds, then the crop is resized to
    /// the target size and scaled to `[0, 1]`.
    pub fn crop(&self, image: &Tensor, cell: &CellBox) -> Result<Tensor> {
        let raw = self.crop_raw(image, cell)?;
        Ok(self.finish(&raw))
    }

    /// Crops and resizes a cell, keeping the uint8 pixels.
    pub fn crop_raw(&self, image: &Tensor, cell: &CellBox) -> Result<Tensor> {
        let (_, height, width) = image.size3()?;
        let top = (cell.top as i64).min(height);
        let left = (cell.left as i64).min(width);
        let bottom = (cell.bottom as i64).min(height);
        let right = (cell.right as i64).min(width);
        ensure!(
            bottom > top && right > left,
            "cell {} lies outside of the {}x{} image",
            cell.cell_index,
            height,
            width
        );

        let crop = image.i((.., top..bottom, left..right)).contiguous();
        let resized = tch::vision::image::resize(&crop, self.image_size, self.image_size)?;
        Ok(resized)
    }

    /// Converts a uint8 crop from [crop_raw](Self::crop_raw) to the float model input.
    pub fn finish(&self, raw: &Tensor) -> Tensor {
        let crop = raw.to_kind(Kind::Float) / 255.0;
        if self.normalize {
            standardize_channels(&crop)
        } else {
            crop
        }
    }

    /// Loads the crop of one cell.
    pub fn load_cell(&self, image: &ImageRecord, cell_index: usize) -> Result<Tensor> {
        let boxes = self.boxes.load(&image.id)?;
        let cell = boxes
            .iter()
            .find(|cell| cell.cell_index == cell_index)
            .ok_or_else(|| {
                format_err!("image '{}' has no cell {}", image.id, cell_index)
            })?;
        let pixels = self.load_image(&image.base_path)?;
        self.crop(&pixels, cell)
    }
}

impl CellCropSource for CellCropLoader {
    fn cell_crops(&self, image: &ImageRecord) -> Result<Vec<Tensor>> {
        let boxes = self.boxes.load(&image.id)?;
        if boxes.is_empty() {
            return Ok(vec![]);
        }

        let pixels = self.load_image(&image.base_path)?;
        boxes.iter().map(|cell| self.crop(&pixels, cell)).try_collect()
    }
}

fn load_gray_channel(path: &Path) -> Result<Tensor> {
    let image = image::open(path)
        .with_context(|| format!("failed to open image '{}'", path.display()))?
        .to_luma8();
    let (width, height) = image.dimensions();
    let pixels = Tensor::of_slice(&image.into_raw()).view([height as i64, width as i64]);
    Ok(pixels)
}

fn standardize_channels(crop: &Tensor) -> Tensor {
    let mean = crop.mean_dim(&[-2, -1], true, Kind::Float);
    let std = crop.std_dim(&[-2, -1], false, true);
    (crop - mean) / (std + 1e-6)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::save_cell_boxes;
    use image::{GrayImage, Luma};

    fn write_channels(base_path: &Path, width: u32, height: u32) -> Result<()> {
        let base_name = crate::utils::base_name(base_path)?;
        for (index, suffix) in CHANNEL_SUFFIXES.iter().enumerate() {
            let image = GrayImage::from_fn(width, height, |x, y| {
                Luma([((x + y) as u8).wrapping_mul(index as u8 + 1)])
            });
            let path = base_path.with_file_name(format!("{}_{}.png", base_name, suffix));
            image.save(&path)?;
        }
        Ok(())
    }

    #[test]
    fn crop_cells_from_channel_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let image_dir = dir.path().join("images");
        let boxes_dir = dir.path().join("boxes");
        fs::create_dir_all(&image_dir)?;
        fs::create_dir_all(&boxes_dir)?;

        let base_path = image_dir.join("img");
        write_channels(&base_path, 20, 16)?;
        save_cell_boxes(
            &boxes_dir.join("img.csv"),
            &[
                CellBox {
                    cell_index: 1,
                    top: 0,
                    left: 0,
                    bottom: 8,
                    right: 8,
                },
                CellBox {
                    cell_index: 2,
                    top: 10,
                    left: 12,
                    bottom: 40,
                    right: 40,
                },
            ],
        )?;

        let loader = CellCropLoaderInit {
            image_size: 6,
            in_channels: 4,
            normalize: false,
            boxes: CellBoxIndex::new([&boxes_dir]),
        }
        .build()?;

        let record = ImageRecord {
            id: "img".into(),
            base_path,
            label: crate::label::LabelVector::empty(2),
            channels: 4,
        };

        let image = loader.load_image(&record.base_path)?;
        assert_eq!(image.size(), vec![4, 16, 20]);
        assert_eq!(image.kind(), Kind::Uint8);

        let crops = loader.cell_crops(&record)?;
        assert_eq!(crops.len(), 2);
        for crop in &crops {
            assert_eq!(crop.size(), vec![4, 6, 6]);
            let max = f64::from(crop.max());
            assert!((0.0..=1.0).contains(&max));
        }

        assert!(loader.load_cell(&record, 3).is_err());
        Ok(())
    }

    #[test]
    fn invalid_channel_count_is_rejected() {
        let init = CellCropLoaderInit {
            image_size: 8,
            in_channels: 5,
            normalize: false,
            boxes: CellBoxIndex::new(Vec::<PathBuf>::new()),
        };
        assert!(init.build().is_err());
    }
}
