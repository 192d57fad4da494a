use crate::{common::*, label::LabelVector};

#[derive(Debug, Clone, Deserialize)]
struct CellLabelRow {
    image_id: String,
    cell_index: usize,
    #[serde(rename = "Label")]
    label: String,
}

/// Per-cell labels read from a CSV file with columns `image_id,cell_index,Label`.
#[derive(Debug, Clone, Default)]
pub struct CellLabels {
    labels: HashMap<(String, usize), LabelVector>,
}

impl CellLabels {
    pub fn load(path: &Path, num_classes: usize) -> Result<Self> {
        let rows: Vec<CellLabelRow> = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .with_context(|| format!("failed to open cell label file '{}'", path.display()))?
            .deserialize()
            .try_collect()
            .with_context(|| format!("failed to parse cell label file '{}'", path.display()))?;

        let labels: HashMap<_, _> = rows
            .into_iter()
            .map(|row| -> Result<_> {
                let CellLabelRow {
                    image_id,
                    cell_index,
                    label,
                } = row;
                let label = LabelVector::parse(&label, num_classes).with_context(|| {
                    format!("invalid label of cell {} in image '{}'", cell_index, image_id)
                })?;
                Ok(((image_id, cell_index), label))
            })
            .try_collect()?;

        info!("loaded labels of {} cells", labels.len());
        Ok(Self { labels })
    }

    pub fn get(&self, image_id: &str, cell_index: usize) -> Option<&LabelVector> {
        // the tuple key cannot be borrowed as (&str, usize)
        self.labels.get(&(image_id.to_string(), cell_index))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Where the training label of a cell comes from.
#[derive(Debug, Clone)]
pub enum LabelSource {
    /// Every cell inherits the label of its image.
    ImageLevel,
    /// Cells are labeled individually. Cells without a label are dropped.
    CellLevel(CellLabels),
}
