//! The data configuration shared by the training and prediction programs.

use crate::{
    common::*,
    dataset::{CellBoxIndex, CellLabels, ImageManifest, LabelSource, ManifestSource},
};

/// Locations of labels, cell boxes and the fold assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Label files and image directories. Later entries override earlier ones.
    pub manifests: Vec<ManifestSource>,
    /// Directories of per-image cell box CSV files, searched from the last one.
    pub cell_boxes_dirs: Vec<PathBuf>,
    pub folds_file: PathBuf,
    /// Optional per-cell labels with `image_id,cell_index,Label` columns.
    #[serde(default)]
    pub cell_labels_file: Option<PathBuf>,
    /// Optional text file with one class name per line.
    #[serde(default)]
    pub class_names_file: Option<PathBuf>,
}

impl DataConfig {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read data config '{}'", path.display()))?;
        let config: Self = json5::from_str(&text)
            .with_context(|| format!("failed to parse data config '{}'", path.display()))?;
        ensure!(
            !config.manifests.is_empty(),
            "at least one manifest is required"
        );
        Ok(config)
    }

    pub fn load_manifest(&self, num_classes: usize, in_channels: usize) -> Result<ImageManifest> {
        ImageManifest::load_all(&self.manifests, num_classes, in_channels)
    }

    pub fn cell_box_index(&self) -> CellBoxIndex {
        CellBoxIndex::new(&self.cell_boxes_dirs)
    }

    /// Decides where cell labels come from.
    ///
    /// Image-level labels are used when requested or when no cell label file
    /// is configured.
    pub fn label_source(&self, image_level_labels: bool, num_classes: usize) -> Result<LabelSource> {
        match (&self.cell_labels_file, image_level_labels) {
            (Some(path), false) => {
                let labels = CellLabels::load(path, num_classes)?;
                info!("loaded {} cell labels", labels.len());
                Ok(LabelSource::CellLevel(labels))
            }
            (None, false) => {
                warn!("no cell label file is configured, fall back to image-level labels");
                Ok(LabelSource::ImageLevel)
            }
            (_, true) => Ok(LabelSource::ImageLevel),
        }
    }

    /// Returns the class names, or the class ids when no name file is configured.
    pub fn class_names(&self, num_classes: usize) -> Result<Vec<String>> {
        let path = match &self.class_names_file {
            Some(path) => path,
            None => return Ok((0..num_classes).map(|id| id.to_string()).collect()),
        };

        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read class names '{}'", path.display()))?;
        let names: Vec<String> = text
            .lines()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .map(|line| line.to_string())
            .collect();
        ensure!(
            names.len() == num_classes,
            "expect {} class names in '{}', but get {}",
            num_classes,
            path.display(),
            names.len()
        );
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_json5_config() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("data.json5");
        fs::write(
            &path,
            r#"{
                // later manifests override earlier ones
                manifests: [
                    { label_file: "input/train.csv", image_dir: "input/train" },
                    { label_file: "input/extra.csv", image_dir: "input/extra" },
                ],
                cell_boxes_dirs: ["input/boxes"],
                folds_file: "input/folds.json",
            }"#,
        )?;

        let config = DataConfig::open(&path)?;
        assert_eq!(config.manifests.len(), 2);
        assert_eq!(config.cell_boxes_dirs, vec![PathBuf::from("input/boxes")]);
        assert!(config.cell_labels_file.is_none());
        assert_eq!(config.class_names(3)?, vec!["0", "1", "2"]);
        assert!(matches!(
            config.label_source(false, 3)?,
            LabelSource::ImageLevel
        ));
        Ok(())
    }

    #[test]
    fn class_names_must_match_class_count() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let names_path = dir.path().join("classes.txt");
        fs::write(&names_path, "Nucleoplasm\nCytosol\n\n")?;

        let config = DataConfig {
            manifests: vec![],
            cell_boxes_dirs: vec![],
            folds_file: dir.path().join("folds.json"),
            cell_labels_file: None,
            class_names_file: Some(names_path),
        };
        assert_eq!(config.class_names(2)?, vec!["Nucleoplasm", "Cytosol"]);
        assert!(config.class_names(3).is_err());
        Ok(())
    }
}
