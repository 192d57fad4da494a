use crate::{common::*, label::LabelVector};

/// A labeled multi-channel image, identified by the base path of its channel files.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRecord {
    pub id: String,
    pub base_path: PathBuf,
    pub label: LabelVector,
    pub channels: usize,
}

/// The pixel rectangle of one segmented cell. `bottom` and `right` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellBox {
    pub cell_index: usize,
    pub top: usize,
    pub left: usize,
    pub bottom: usize,
    pub right: usize,
}

impl CellBox {
    pub fn height(&self) -> usize {
        self.bottom.saturating_sub(self.top)
    }

    pub fn width(&self) -> usize {
        self.right.saturating_sub(self.left)
    }
}

/// Identifies a cell across the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellKey {
    pub image_id: String,
    pub cell_index: usize,
}

/// A cell of an image with its training label.
#[derive(Debug, Clone)]
pub struct CellSample {
    pub image: Arc<ImageRecord>,
    pub cell_index: usize,
    pub label: LabelVector,
}

impl CellSample {
    pub fn key(&self) -> CellKey {
        CellKey {
            image_id: self.image.id.clone(),
            cell_index: self.cell_index,
        }
    }
}

/// A batch of cell crops with labels.
#[derive(Debug, TensorLike)]
pub struct CellBatch {
    /// Crops in shape `[batch, channels, size, size]`.
    pub images: Tensor,
    /// Labels in shape `[batch, num_classes]`.
    pub labels: Tensor,
    #[tensor_like(clone)]
    pub keys: Vec<CellKey>,
}

impl CellBatch {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
