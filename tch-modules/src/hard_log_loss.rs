use crate::{bce_with_logits_loss::BceWithLogitsLossInit, common::*};

/// Per-class binary cross entropy over positives and the hardest negatives.
///
/// For every class, all positive samples are kept. Negatives are ranked by
/// logit and the top `max(num_pos * neg_more, num_neg * neg_least_ratio)`
/// ones are kept, capped at `num_neg * neg_max_ratio`. The per-class losses
/// are averaged over the number of classes.
#[derive(Debug, Clone)]
pub struct HardLogLossInit {
    pub neg_more: f64,
    pub neg_least_ratio: f64,
    pub neg_max_ratio: f64,
}

impl Default for HardLogLossInit {
    fn default() -> Self {
        Self {
            neg_more: 2.0,
            neg_least_ratio: 0.5,
            neg_max_ratio: 0.7,
        }
    }
}

impl HardLogLossInit {
    pub fn build(self) -> Result<HardLogLoss> {
        let Self {
            neg_more,
            neg_least_ratio,
            neg_max_ratio,
        } = self;

        ensure!(neg_more >= 0.0, "neg_more must be non-negative");
        ensure!(
            (0.0..=1.0).contains(&neg_least_ratio) && (0.0..=1.0).contains(&neg_max_ratio),
            "negative ratios must be in range [0.0, 1.0]"
        );

        Ok(HardLogLoss {
            neg_more,
            neg_least_ratio,
            neg_max_ratio,
        })
    }
}

#[derive(Debug)]
pub struct HardLogLoss {
    neg_more: f64,
    neg_least_ratio: f64,
    neg_max_ratio: f64,
}

impl HardLogLoss {
    pub fn forward(&self, input: &Tensor, target: &Tensor) -> Tensor {
        debug_assert_eq!(
            input.size2().unwrap(),
            target.size2().unwrap(),
            "input and target shape must be equal"
        );

        let device = input.device();
        let num_classes = input.size()[1];
        let bce = BceWithLogitsLossInit::default(Reduction::Mean).build(device);

        let total = (0..num_classes)
            .filter_map(|class| {
                let (logits, labels) =
                    self.hard_samples(&input.select(1, class), &target.select(1, class));
                (logits.numel() > 0).then(|| bce.forward(&logits, &labels))
            })
            .fold(
                Tensor::zeros(&[], (Kind::Float, device)),
                |total, loss| total + loss,
            );

        total / num_classes.max(1) as f64
    }

    fn hard_samples(&self, logits: &Tensor, labels: &Tensor) -> (Tensor, Tensor) {
        let pos_mask = labels.gt(0.0);
        let neg_mask = labels.le(0.0);

        let pos_logits = logits.masked_select(&pos_mask);
        let pos_labels = labels.masked_select(&pos_mask);
        let neg_logits = logits.masked_select(&neg_mask);
        let neg_labels = labels.masked_select(&neg_mask);

        let num_pos = pos_logits.size()[0];
        let num_neg = neg_logits.size()[0];

        let num_hard = {
            let lower = ((num_pos as f64 * self.neg_more) as i64)
                .max((num_neg as f64 * self.neg_least_ratio) as i64);
            lower.min((num_neg as f64 * self.neg_max_ratio) as i64)
        };

        let (neg_logits, neg_labels) = if num_hard > 0 {
            let (_, indexes) = neg_logits.topk(num_hard, -1, true, true);
            (
                neg_logits.index_select(0, &indexes),
                neg_labels.index_select(0, &indexes),
            )
        } else {
            (neg_logits.narrow(0, 0, 0), neg_labels.narrow(0, 0, 0))
        };

        (
            Tensor::cat(&[pos_logits, neg_logits], 0),
            Tensor::cat(&[pos_labels, neg_labels], 0),
        )
    }
}
