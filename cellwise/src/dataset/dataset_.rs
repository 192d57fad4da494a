use super::CellKey;
use crate::common::*;

/// The generic dataset trait.
pub trait GenericDataset
where
    Self: Debug + Send + Sync,
{
    /// The number of color channels of the crops.
    fn input_channels(&self) -> usize;

    /// The length of label vectors.
    fn num_classes(&self) -> usize;
}

/// The dataset of cells that can be random accessed.
pub trait RandomAccessDataset
where
    Self: GenericDataset,
{
    /// Get number of cells in the dataset.
    fn num_samples(&self) -> usize;

    /// Get the nth cell with its `[C, S, S]` crop and `[num_classes]` label.
    fn nth(&self, index: usize) -> Result<(CellKey, Tensor, Tensor)>;
}
