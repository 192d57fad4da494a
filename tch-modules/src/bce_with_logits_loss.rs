use crate::common::*;

/// Initializer of [BceWithLogitsLoss].
#[derive(Debug)]
pub struct BceWithLogitsLossInit {
    /// Per-class rescaling weight.
    pub weight: Option<Vec<f64>>,
    /// Per-class weight of positive examples.
    pub pos_weight: Option<Vec<f64>>,
    pub reduction: Reduction,
}

impl BceWithLogitsLossInit {
    pub fn default(reduction: Reduction) -> Self {
        Self {
            weight: None,
            pos_weight: None,
            reduction,
        }
    }

    pub fn build(self, device: Device) -> BceWithLogitsLoss {
        let Self {
            weight,
            pos_weight,
            reduction,
        } = self;

        let to_tensor = |values: Vec<f64>| {
            Tensor::of_slice(&values)
                .to_kind(Kind::Float)
                .to_device(device)
                .set_requires_grad(false)
        };

        BceWithLogitsLoss {
            weight: weight.map(to_tensor),
            pos_weight: pos_weight.map(to_tensor),
            reduction,
        }
    }
}

/// Binary cross entropy on logits for `[batch_size, num_classes]` inputs.
#[derive(Debug)]
pub struct BceWithLogitsLoss {
    weight: Option<Tensor>,
    pos_weight: Option<Tensor>,
    reduction: Reduction,
}

impl BceWithLogitsLoss {
    pub fn forward(&self, input: &Tensor, target: &Tensor) -> Tensor {
        debug_assert_eq!(
            input.size(),
            target.size(),
            "input and target tensors must have equal shape"
        );
        debug_assert!(
            bool::from(target.ge(0.0).logical_and(&target.le(1.0)).all()),
            "target values must be in range of [0.0, 1.0]"
        );

        // return zero tensor if (1) input is empty and (2) using mean reduction
        if input.numel() == 0 && self.reduction == Reduction::Mean {
            return Tensor::zeros(&[], (Kind::Float, input.device())).set_requires_grad(false);
        }

        input.binary_cross_entropy_with_logits(
            target,
            self.weight.as_ref(),
            self.pos_weight.as_ref(),
            self.reduction,
        )
    }
}
