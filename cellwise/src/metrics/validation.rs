use super::{multi_label_accuracy, nan_mean, per_class_average_precision, AverageMeter};
use crate::common::*;
use tch_modules::FocalLoss;

/// The probability threshold of the accuracy metric.
pub const ACCURACY_THRESHOLD: f64 = 0.5;

const DIAGNOSTIC_BATCH_PROB: f64 = 0.005;
const DIAGNOSTIC_SAMPLE_PROB: f64 = 0.001;

/// The metrics of one validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Mean of the per-batch training criterion.
    pub loss: f64,
    /// Mean of the per-batch thresholded accuracy.
    pub accuracy: f64,
    /// Mean average precision over classes having positives.
    pub map: f64,
    /// Focal loss over the logits of the whole pass.
    pub focal_loss: f64,
    pub class_aps: Vec<f64>,
    pub num_samples: usize,
}

/// Collects the outputs of validation batches.
#[derive(Debug)]
pub struct ValidationAccumulator {
    loss: AverageMeter,
    accuracy: AverageMeter,
    logits: Vec<Tensor>,
    labels: Vec<Tensor>,
    rng: StdRng,
}

impl ValidationAccumulator {
    /// Creates an accumulator. The seed only drives the diagnostic printing.
    pub fn new(seed: u64) -> Self {
        Self {
            loss: AverageMeter::new(),
            accuracy: AverageMeter::new(),
            logits: vec![],
            labels: vec![],
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn num_batches(&self) -> usize {
        self.loss.count()
    }

    /// Records the `[N, num_classes]` logits and labels of a batch with its loss.
    pub fn add_batch(&mut self, logits: &Tensor, labels: &Tensor, loss: f64) {
        let logits = logits.detach().to_device(Device::Cpu).to_kind(Kind::Float);
        let labels = labels.detach().to_device(Device::Cpu).to_kind(Kind::Float);
        let probs = logits.sigmoid();

        if self.rng.gen_bool(DIAGNOSTIC_BATCH_PROB) {
            self.print_samples(&probs, &labels);
        }

        self.loss.update(loss);
        self.accuracy
            .update(multi_label_accuracy(&probs, &labels, ACCURACY_THRESHOLD));
        self.logits.push(logits);
        self.labels.push(labels);
    }

    fn print_samples(&mut self, probs: &Tensor, labels: &Tensor) {
        let batch_size = probs.size()[0];
        for index in 0..batch_size {
            if !self.rng.gen_bool(DIAGNOSTIC_SAMPLE_PROB) {
                continue;
            }
            let probs = Vec::<f32>::from(&probs.select(0, index));
            let labels = Vec::<f32>::from(&labels.select(0, index));
            let pairs = izip!(probs, labels)
                .map(|(prob, label)| format!("{:.4} {}", prob, label))
                .join("\n");
            info!("prediction vs. label\n{}", pairs);
        }
    }

    /// Computes the metrics of all recorded batches.
    ///
    /// Without any batch, every metric is NaN.
    pub fn finish(self) -> Result<ValidationReport> {
        let Self {
            loss,
            accuracy,
            logits,
            labels,
            ..
        } = self;

        if logits.is_empty() {
            return Ok(ValidationReport {
                loss: f64::NAN,
                accuracy: f64::NAN,
                map: f64::NAN,
                focal_loss: f64::NAN,
                class_aps: vec![],
                num_samples: 0,
            });
        }

        let logits = Tensor::cat(&logits, 0);
        let labels = Tensor::cat(&labels, 0);
        let num_samples = logits.size()[0] as usize;

        let focal = FocalLoss::bce(Reduction::Mean, Device::Cpu)?;
        let focal_loss = tch::no_grad(|| f64::from(focal.forward(&logits, &labels)));
        let class_aps = per_class_average_precision(&logits.sigmoid(), &labels)?;
        let map = nan_mean(&class_aps);

        Ok(ValidationReport {
            loss: loss.avg(),
            accuracy: accuracy.avg(),
            map,
            focal_loss,
            class_aps,
            num_samples,
        })
    }
}
