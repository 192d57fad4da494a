use super::{kfold_groups, FoldAssignment};
use crate::common::*;

/// The seed of the per-image K-fold split, shared by every image.
pub const DEFAULT_KFOLD_SEED: u64 = 41;

/// Fold weights of single-cell images when there are three folds.
pub const DEFAULT_SINGLE_CELL_WEIGHTS: [u32; 3] = [3, 7, 10];

#[derive(Debug, Clone)]
pub struct FoldPartitionerInit {
    pub num_folds: usize,
    pub kfold_seed: u64,
    /// Relative odds of each fold receiving a single-cell image.
    pub single_cell_weights: Option<Vec<u32>>,
}

impl FoldPartitionerInit {
    pub fn new(num_folds: usize) -> Self {
        Self {
            num_folds,
            kfold_seed: DEFAULT_KFOLD_SEED,
            single_cell_weights: None,
        }
    }

    pub fn build(self) -> Result<FoldPartitioner> {
        let Self {
            num_folds,
            kfold_seed,
            single_cell_weights,
        } = self;

        ensure!(num_folds > 0, "num_folds must be positive");

        let weights = match single_cell_weights {
            Some(weights) => weights,
            None if num_folds == DEFAULT_SINGLE_CELL_WEIGHTS.len() => {
                DEFAULT_SINGLE_CELL_WEIGHTS.to_vec()
            }
            None => bail!(
                "single-cell fold weights must be given explicitly for {} folds",
                num_folds
            ),
        };
        ensure!(
            weights.len() == num_folds,
            "expect {} single-cell fold weights, but get {}",
            num_folds,
            weights.len()
        );
        let single_cell_dist = WeightedIndex::new(&weights)
            .map_err(|err| format_err!("invalid single-cell fold weights {:?}: {}", weights, err))?;

        Ok(FoldPartitioner {
            num_folds,
            kfold_seed,
            single_cell_dist,
        })
    }
}

/// Distributes the cells of every image into cross-validation folds.
#[derive(Debug, Clone)]
pub struct FoldPartitioner {
    num_folds: usize,
    kfold_seed: u64,
    single_cell_dist: WeightedIndex<u32>,
}

impl FoldPartitioner {
    pub fn num_folds(&self) -> usize {
        self.num_folds
    }

    /// Partitions the cell indices of each image.
    ///
    /// Images without cells are left out. A single-cell image goes to one
    /// fold drawn from the weighted distribution. Other images are split into
    /// `min(num_folds, num_cells)` groups, which are assigned to consecutive
    /// folds, starting from fold 0 when every fold can get a group and from a
    /// random fold otherwise. The fold index saturates at the last fold.
    pub fn partition<R>(&self, masks: &IndexMap<String, Vec<usize>>, rng: &mut R) -> FoldAssignment
    where
        R: Rng,
    {
        let num_folds = self.num_folds;
        let mut assignment = FoldAssignment::new(num_folds);

        for (image_id, cell_indices) in masks {
            match cell_indices.len() {
                0 => continue,
                1 => {
                    let fold_index = self.single_cell_dist.sample(rng);
                    assignment.insert(fold_index, image_id, cell_indices.iter().copied());
                }
                num_cells => {
                    let mut split_rng = StdRng::seed_from_u64(self.kfold_seed);
                    let groups = kfold_groups(num_cells, num_folds, &mut split_rng);

                    let mut fold_index = if num_cells >= num_folds {
                        0
                    } else {
                        rng.gen_range(0..num_folds)
                    };

                    for group in groups {
                        let cells = group.into_iter().map(|pos| cell_indices[pos]);
                        assignment.insert(fold_index, image_id, cells);
                        fold_index = (fold_index + 1).min(num_folds - 1);
                    }
                }
            }
        }

        assignment
    }
}
