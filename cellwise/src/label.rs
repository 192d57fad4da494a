//! Multi-label class presence vectors.

use crate::common::*;

/// The separator of class ids in label strings, e.g. `"0|5|16"`.
pub const LABEL_SEPARATOR: char = '|';

/// A fixed-length vector of per-class presence flags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelVector {
    bits: Vec<bool>,
}

impl LabelVector {
    /// Creates a vector with no class present.
    pub fn empty(num_classes: usize) -> Self {
        Self {
            bits: vec![false; num_classes],
        }
    }

    /// Creates a vector from a list of present class ids.
    pub fn from_class_ids<I>(class_ids: I, num_classes: usize) -> Result<Self>
    where
        I: IntoIterator<Item = usize>,
    {
        let mut bits = vec![false; num_classes];
        for class_id in class_ids {
            ensure!(
                class_id < num_classes,
                "class id {} exceeds the number of classes {}",
                class_id,
                num_classes
            );
            bits[class_id] = true;
        }
        Ok(Self { bits })
    }

    /// Parses a label string of separated class ids. An empty string has no class.
    pub fn parse(text: &str, num_classes: usize) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Self::empty(num_classes));
        }

        let class_ids: Vec<usize> = text
            .split(LABEL_SEPARATOR)
            .map(|token| {
                token
                    .trim()
                    .parse::<usize>()
                    .with_context(|| format!("invalid class id '{}' in label '{}'", token, text))
            })
            .try_collect()?;
        Self::from_class_ids(class_ids, num_classes)
    }

    pub fn num_classes(&self) -> usize {
        self.bits.len()
    }

    pub fn contains(&self, class_id: usize) -> bool {
        self.bits.get(class_id).copied().unwrap_or(false)
    }

    pub fn class_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter_map(|(class_id, &present)| present.then(|| class_id))
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.bits
    }

    /// Converts to a float tensor of shape `[num_classes]` with values in {0, 1}.
    pub fn to_tensor(&self) -> Tensor {
        let values: Vec<f32> = self
            .bits
            .iter()
            .map(|&present| if present { 1.0 } else { 0.0 })
            .collect();
        Tensor::of_slice(&values)
    }
}

impl fmt::Display for LabelVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.class_ids().map(|id| id.to_string()).join("|");
        f.write_str(&text)
    }
}
