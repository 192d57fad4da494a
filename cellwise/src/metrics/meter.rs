use crate::common::*;

/// Running mean of per-batch values.
#[derive(Debug, Clone, Default)]
pub struct AverageMeter {
    sum: f64,
    count: usize,
    last: Option<f64>,
}

impl AverageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        self.last = Some(value);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn last(&self) -> Option<f64> {
        self.last
    }

    /// The mean of all values, or NaN if nothing is recorded.
    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.sum / self.count as f64
        }
    }
}

/// The fraction of elements whose thresholded probability matches the label.
pub fn multi_label_accuracy(probs: &Tensor, labels: &Tensor, threshold: f64) -> f64 {
    let preds = probs.gt(threshold);
    let targets = labels.gt(0.5);
    f64::from(preds.eq_tensor(&targets).to_kind(Kind::Float).mean(Kind::Float))
}
