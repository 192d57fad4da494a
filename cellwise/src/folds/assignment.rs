use crate::{common::*, utils};

/// The cell indices of every image, grouped by fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FoldAssignment {
    folds: Vec<IndexMap<String, Vec<usize>>>,
}

impl FoldAssignment {
    pub fn new(num_folds: usize) -> Self {
        Self {
            folds: vec![IndexMap::new(); num_folds],
        }
    }

    pub(crate) fn insert<I>(&mut self, fold_index: usize, image_id: &str, cells: I)
    where
        I: IntoIterator<Item = usize>,
    {
        self.folds[fold_index]
            .entry(image_id.to_string())
            .or_default()
            .extend(cells);
    }

    pub fn num_folds(&self) -> usize {
        self.folds.len()
    }

    pub fn folds(&self) -> &[IndexMap<String, Vec<usize>>] {
        &self.folds
    }

    pub fn fold(&self, fold_index: usize) -> Result<&IndexMap<String, Vec<usize>>> {
        self.folds.get(fold_index).ok_or_else(|| {
            format_err!(
                "fold {} is out of range, the assignment has {} folds",
                fold_index,
                self.folds.len()
            )
        })
    }

    /// The total number of cells in each fold.
    pub fn fold_sizes(&self) -> Vec<usize> {
        self.folds
            .iter()
            .map(|fold| fold.values().map(|cells| cells.len()).sum())
            .collect()
    }

    pub fn log_sizes(&self) {
        for (fold_index, (fold, num_cells)) in izip!(&self.folds, self.fold_sizes()).enumerate() {
            info!(
                "fold {}: {} images, {} cells",
                fold_index,
                fold.len(),
                num_cells
            );
        }
    }

    /// The ids of images having at least one cell in the fold.
    pub fn image_ids(&self, fold_index: usize) -> Result<Vec<&str>> {
        Ok(self
            .fold(fold_index)?
            .keys()
            .map(|image_id| image_id.as_str())
            .collect())
    }

    /// Returns the `(image_id, cell_index)` pairs for training and validation.
    ///
    /// The validation pairs come from the given fold and the training pairs
    /// from all the other folds.
    pub fn train_val_split(
        &self,
        fold_index: usize,
    ) -> Result<(Vec<(String, usize)>, Vec<(String, usize)>)> {
        let val_fold = self.fold(fold_index)?;
        let pairs = |fold: &IndexMap<String, Vec<usize>>| {
            fold.iter()
                .flat_map(|(image_id, cells)| {
                    cells
                        .iter()
                        .map(move |&cell_index| (image_id.clone(), cell_index))
                })
                .collect::<Vec<_>>()
        };

        let train_pairs = self
            .folds
            .iter()
            .enumerate()
            .filter(|&(index, _)| index != fold_index)
            .flat_map(|(_, fold)| pairs(fold))
            .collect();
        let val_pairs = pairs(val_fold);

        Ok((train_pairs, val_pairs))
    }

    /// Checks that no cell is assigned to more than one fold.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (fold_index, fold) in self.folds.iter().enumerate() {
            for (image_id, cells) in fold {
                for &cell_index in cells {
                    ensure!(
                        seen.insert((image_id.as_str(), cell_index)),
                        "cell {} of image '{}' is assigned more than once, found again in fold {}",
                        cell_index,
                        image_id,
                        fold_index
                    );
                }
            }
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read fold file '{}'", path.display()))?;
        let assignment: Self = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse fold file '{}'", path.display()))?;
        assignment.validate()?;
        Ok(assignment)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string(self)?;
        utils::write_atomic(path, |tmp_path| {
            fs::write(tmp_path, &text)?;
            Ok(())
        })
        .with_context(|| format!("failed to write fold file '{}'", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FoldAssignment {
        let mut assignment = FoldAssignment::new(2);
        assignment.insert(0, "a", [1, 2]);
        assignment.insert(1, "a", [3]);
        assignment.insert(1, "b", [7]);
        assignment
    }

    #[test]
    fn split_pairs_by_fold() -> Result<()> {
        let assignment = sample();
        let (train, val) = assignment.train_val_split(1)?;

        assert_eq!(train, vec![("a".to_string(), 1), ("a".to_string(), 2)]);
        assert_eq!(val, vec![("a".to_string(), 3), ("b".to_string(), 7)]);
        assert!(assignment.train_val_split(2).is_err());
        Ok(())
    }

    #[test]
    fn fold_sizes_count_cells() {
        assert_eq!(sample().fold_sizes(), vec![2, 2]);
    }

    #[test]
    fn save_and_load() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("folds.json");

        let assignment = sample();
        assignment.save(&path)?;
        let loaded = FoldAssignment::load(&path)?;
        assert_eq!(loaded, assignment);

        let text = fs::read_to_string(&path)?;
        assert_eq!(text, r#"[{"a":[1,2]},{"a":[3],"b":[7]}]"#);
        Ok(())
    }

    #[test]
    fn duplicated_cells_are_rejected() {
        let mut assignment = sample();
        assignment.insert(1, "a", [2]);
        assert!(assignment.validate().is_err());
    }
}
