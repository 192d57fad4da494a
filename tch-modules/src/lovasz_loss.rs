use crate::common::*;

/// Lovasz hinge loss averaged over the rows of a `[batch_size, num_classes]`
/// input, applied symmetrically to the positive and the negative labels.
#[derive(Debug, Clone, Default)]
pub struct SymmetricLovaszLoss {
    _private: (),
}

impl SymmetricLovaszLoss {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&self, input: &Tensor, target: &Tensor) -> Tensor {
        debug_assert_eq!(
            input.size2().unwrap(),
            target.size2().unwrap(),
            "input and target shape must be equal"
        );

        if input.numel() == 0 {
            return Tensor::zeros(&[], (Kind::Float, input.device())).set_requires_grad(false);
        }

        let positive = lovasz_hinge_per_row(input, target);
        let negative = lovasz_hinge_per_row(&-input, &(1.0 - target));
        (positive + negative) / 2.0
    }
}

fn lovasz_hinge_per_row(input: &Tensor, target: &Tensor) -> Tensor {
    let batch_size = input.size()[0];
    let losses: Vec<_> = (0..batch_size)
        .map(|index| lovasz_hinge_flat(&input.select(0, index), &target.select(0, index)))
        .collect();
    Tensor::stack(&losses, 0).mean(Kind::Float)
}

fn lovasz_hinge_flat(logits: &Tensor, labels: &Tensor) -> Tensor {
    let signs = labels * 2.0 - 1.0;
    let errors = 1.0 - logits * &signs;
    let (errors_sorted, perm) = errors.sort(0, true);
    let labels_sorted = labels.index_select(0, &perm);
    let grad = lovasz_grad(&labels_sorted);
    errors_sorted.relu().dot(&grad)
}

/// Gradient of the Lovasz extension w.r.t. sorted errors.
fn lovasz_grad(labels_sorted: &Tensor) -> Tensor {
    let len = labels_sorted.size()[0];
    let num_positives = labels_sorted.sum(Kind::Float);
    let intersection = &num_positives - labels_sorted.cumsum(0, Kind::Float);
    let union = &num_positives + (1.0 - labels_sorted).cumsum(0, Kind::Float);
    let jaccard = 1.0 - intersection / union;

    if len > 1 {
        let diff = jaccard.narrow(0, 1, len - 1) - jaccard.narrow(0, 0, len - 1);
        Tensor::cat(&[jaccard.narrow(0, 0, 1), diff], 0)
    } else {
        jaccard
    }
}
