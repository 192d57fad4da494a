use crate::{common::*, utils};

/// The name of the cell ordinal column.
pub const CELL_NUMBER_COLUMN: &str = "img_cell_number";

/// Per-cell vectors of one image keyed by cell ordinal.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CellTable {
    rows: Vec<(usize, Vec<f32>)>,
}

impl CellTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from a `[num_cells, width]` tensor, numbering rows from zero.
    pub fn from_tensor(values: &Tensor) -> Result<Self> {
        let (num_rows, _) = values.size2()?;
        let values = values.to_device(Device::Cpu).to_kind(Kind::Float);
        let rows = (0..num_rows)
            .map(|index| {
                let row = Vec::<f32>::from(&values.select(0, index).contiguous());
                (index as usize, row)
            })
            .collect();
        Ok(Self { rows })
    }

    /// Appends a row numbered after the last one.
    pub fn push(&mut self, values: Vec<f32>) {
        let cell_number = self.rows.len();
        self.rows.push((cell_number, values));
    }

    pub fn rows(&self) -> &[(usize, Vec<f32>)] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The length of row vectors, if any row exists.
    pub fn width(&self) -> Option<usize> {
        self.rows.first().map(|(_, values)| values.len())
    }

    /// Writes the table as CSV with an `img_cell_number,0,1,...` header.
    ///
    /// The file appears complete or not at all.
    pub fn write(&self, path: &Path) -> Result<()> {
        let width = self.width().unwrap_or(0);
        ensure!(
            self.rows.iter().all(|(_, values)| values.len() == width),
            "rows of table '{}' have different lengths",
            path.display()
        );

        utils::write_atomic(path, |tmp_path| {
            let mut writer = csv::Writer::from_path(tmp_path)?;
            let header = iter::once(CELL_NUMBER_COLUMN.to_string())
                .chain((0..width).map(|index| index.to_string()));
            writer.write_record(header)?;

            for (cell_number, values) in &self.rows {
                let record = iter::once(cell_number.to_string())
                    .chain(values.iter().map(|value| value.to_string()));
                writer.write_record(record)?;
            }
            writer.flush()?;
            Ok(())
        })
        .with_context(|| format!("failed to write table '{}'", path.display()))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .with_context(|| format!("failed to open table '{}'", path.display()))?;

        let header = reader.headers()?.clone();
        ensure!(
            header.get(0) == Some(CELL_NUMBER_COLUMN),
            "table '{}' does not start with the '{}' column",
            path.display(),
            CELL_NUMBER_COLUMN
        );

        let rows = reader
            .records()
            .map(|record| -> Result<_> {
                let record = record?;
                let mut fields = record.iter();
                let cell_number: usize = fields
                    .next()
                    .ok_or_else(|| format_err!("empty row"))?
                    .parse()?;
                let values: Vec<f32> = fields.map(|field| field.parse()).try_collect()?;
                Ok((cell_number, values))
            })
            .try_collect()
            .with_context(|| format!("failed to parse table '{}'", path.display()))?;

        Ok(Self { rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_table_layout() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("img.csv");

        let mut table = CellTable::new();
        table.push(vec![0.5, 0.25]);
        table.push(vec![1.0, 0.125]);
        table.write(&path)?;

        let text = fs::read_to_string(&path)?;
        assert_eq!(text, "img_cell_number,0,1\n0,0.5,0.25\n1,1,0.125\n");
        assert_eq!(CellTable::read(&path)?, table);
        Ok(())
    }

    #[test]
    fn table_from_tensor() -> Result<()> {
        let values = Tensor::of_slice(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]).view([3, 2]);
        let table = CellTable::from_tensor(&values)?;
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows()[2], (2, vec![5.0, 6.0]));
        Ok(())
    }

    #[test]
    fn ragged_rows_are_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("img.csv");

        let mut table = CellTable::new();
        table.push(vec![0.5, 0.25]);
        table.push(vec![1.0]);
        assert!(table.write(&path).is_err());
        assert!(!path.exists());
        Ok(())
    }
}
