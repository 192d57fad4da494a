use super::CellBox;
use crate::common::*;

/// Reads the cell boxes of one image from a CSV file with columns
/// `cell_index,top,left,bottom,right`, keeping the file order.
pub fn load_cell_boxes(path: &Path) -> Result<Vec<CellBox>> {
    let boxes: Vec<CellBox> = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("failed to open cell box file '{}'", path.display()))?
        .deserialize()
        .try_collect()
        .with_context(|| format!("failed to parse cell box file '{}'", path.display()))?;

    for cell in &boxes {
        ensure!(
            cell.bottom > cell.top && cell.right > cell.left,
            "empty box for cell {} in '{}'",
            cell.cell_index,
            path.display()
        );
    }

    Ok(boxes)
}

/// Writes the cell boxes of one image.
pub fn save_cell_boxes(path: &Path, boxes: &[CellBox]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create cell box file '{}'", path.display()))?;
    for cell in boxes {
        writer.serialize(cell)?;
    }
    writer.flush()?;
    Ok(())
}

/// Cell box files spread over several directories, one `<image_id>.csv` per image.
///
/// When an image id appears in more than one directory, the last directory wins.
#[derive(Debug, Clone)]
pub struct CellBoxIndex {
    dirs: Vec<PathBuf>,
}

impl CellBoxIndex {
    pub fn new<P>(dirs: impl IntoIterator<Item = P>) -> Self
    where
        P: AsRef<Path>,
    {
        Self {
            dirs: dirs.into_iter().map(|dir| dir.as_ref().to_owned()).collect(),
        }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Locates the box file of an image.
    pub fn find(&self, image_id: &str) -> Option<PathBuf> {
        self.dirs
            .iter()
            .rev()
            .map(|dir| dir.join(format!("{}.csv", image_id)))
            .find(|path| path.is_file())
    }

    /// Loads the boxes of an image. An image without a box file has no cells.
    pub fn load(&self, image_id: &str) -> Result<Vec<CellBox>> {
        match self.find(image_id) {
            Some(path) => load_cell_boxes(&path),
            None => {
                debug!("no cell box file for image '{}'", image_id);
                Ok(vec![])
            }
        }
    }

    /// Scans all box files and maps each image id to its ordered cell indices.
    ///
    /// Image ids are sorted within each directory.
    pub fn mask_indices(&self) -> Result<IndexMap<String, Vec<usize>>> {
        let mut masks = IndexMap::new();

        for dir in &self.dirs {
            let pattern = dir.join("*.csv");
            let pattern = pattern
                .to_str()
                .ok_or_else(|| format_err!("non-UTF-8 path '{}'", dir.display()))?;

            let paths: Vec<PathBuf> = glob::glob(pattern)?
                .try_collect()
                .with_context(|| format!("failed to scan '{}'", dir.display()))?;
            let paths = paths.into_iter().sorted();
            let mut count = 0;

            for path in paths {
                let image_id = path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .ok_or_else(|| format_err!("invalid file name '{}'", path.display()))?
                    .to_string();
                let indices: Vec<usize> = load_cell_boxes(&path)?
                    .into_iter()
                    .map(|cell| cell.cell_index)
                    .collect();
                masks.insert(image_id, indices);
                count += 1;
            }

            info!("loaded cell boxes of {} images from '{}'", count, dir.display());
        }

        Ok(masks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(cell_index: usize) -> CellBox {
        CellBox {
            cell_index,
            top: 0,
            left: 0,
            bottom: 4,
            right: 4,
        }
    }

    #[test]
    fn later_directories_override() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        fs::create_dir_all(&first)?;
        fs::create_dir_all(&second)?;

        save_cell_boxes(&first.join("b.csv"), &[cell(1), cell(2)])?;
        save_cell_boxes(&first.join("a.csv"), &[cell(5)])?;
        save_cell_boxes(&second.join("b.csv"), &[cell(3)])?;
        save_cell_boxes(&second.join("c.csv"), &[])?;

        let index = CellBoxIndex::new([&first, &second]);
        let masks = index.mask_indices()?;

        let entries: Vec<_> = masks
            .iter()
            .map(|(id, cells)| (id.as_str(), cells.clone()))
            .collect();
        assert_eq!(
            entries,
            vec![("a", vec![5]), ("b", vec![3]), ("c", vec![])]
        );

        assert_eq!(index.load("b")?, vec![cell(3)]);
        assert!(index.load("missing")?.is_empty());
        Ok(())
    }

    #[test]
    fn empty_box_is_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("x.csv");
        fs::write(&path, "cell_index,top,left,bottom,right\n1,5,5,5,9\n")?;
        assert!(load_cell_boxes(&path).is_err());
        Ok(())
    }
}
