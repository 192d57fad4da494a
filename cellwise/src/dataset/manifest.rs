use super::ImageRecord;
use crate::{common::*, label::LabelVector};

/// A label file and the directory holding its images.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManifestSource {
    pub label_file: PathBuf,
    pub image_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
struct ManifestRow {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Label")]
    label: String,
}

/// Labeled images indexed by image id.
#[derive(Debug, Clone, Default)]
pub struct ImageManifest {
    records: IndexMap<String, Arc<ImageRecord>>,
}

impl ImageManifest {
    /// Loads a CSV label file with `ID` and `Label` columns.
    ///
    /// A repeated id within the file keeps its first row.
    pub fn load(source: &ManifestSource, num_classes: usize, channels: usize) -> Result<Self> {
        let ManifestSource {
            label_file,
            image_dir,
        } = source;

        let rows: Vec<ManifestRow> = csv::ReaderBuilder::new()
            .has_headers(true)
            .comment(Some(b'#'))
            .from_path(label_file)
            .with_context(|| format!("failed to open label file '{}'", label_file.display()))?
            .deserialize()
            .try_collect()
            .with_context(|| format!("failed to parse label file '{}'", label_file.display()))?;

        let mut records = IndexMap::with_capacity(rows.len());
        let mut num_duplicates = 0;

        for ManifestRow { id, label } in rows {
            if records.contains_key(&id) {
                num_duplicates += 1;
                continue;
            }

            let label = LabelVector::parse(&label, num_classes)
                .with_context(|| format!("invalid label of image '{}'", id))?;
            let record = ImageRecord {
                base_path: image_dir.join(&id),
                id: id.clone(),
                label,
                channels,
            };
            records.insert(id, Arc::new(record));
        }

        if num_duplicates > 0 {
            warn!(
                "ignored {} duplicated image ids in '{}'",
                num_duplicates,
                label_file.display()
            );
        }

        Ok(Self { records })
    }

    /// Loads and merges the label files in order.
    pub fn load_all(
        sources: &[ManifestSource],
        num_classes: usize,
        channels: usize,
    ) -> Result<Self> {
        let mut manifest = Self::default();
        for source in sources {
            manifest.merge(Self::load(source, num_classes, channels)?);
        }
        info!("loaded {} labeled images", manifest.len());
        Ok(manifest)
    }

    /// Adds the records of another manifest, which win over existing ids.
    pub fn merge(&mut self, other: Self) {
        self.records.extend(other.records);
    }

    pub fn insert(&mut self, record: ImageRecord) {
        self.records.insert(record.id.clone(), Arc::new(record));
    }

    pub fn get(&self, image_id: &str) -> Option<&Arc<ImageRecord>> {
        self.records.get(image_id)
    }

    pub fn contains(&self, image_id: &str) -> bool {
        self.records.contains_key(image_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &Arc<ImageRecord>> {
        self.records.values()
    }
}
