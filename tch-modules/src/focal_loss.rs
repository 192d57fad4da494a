use crate::{bce_with_logits_loss::BceWithLogitsLossInit, common::*};

/// Focal loss initializer.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct FocalLossInit<F>
where
    F: 'static + Fn(&Tensor, &Tensor) -> Tensor + Send,
{
    /// The wrapped element-wise loss function.
    #[derivative(Debug = "ignore")]
    pub loss_fn: F,
    /// The gamma coefficient.
    pub gamma: f64,
    /// The optional alpha balancing coefficient.
    pub alpha: Option<f64>,
    /// The reduction method applied on output loss.
    pub reduction: Reduction,
}

impl<F> FocalLossInit<F>
where
    F: 'static + Fn(&Tensor, &Tensor) -> Tensor + Send,
{
    pub fn default(reduction: Reduction, loss_fn: F) -> Self {
        Self {
            loss_fn,
            gamma: 2.0,
            alpha: None,
            reduction,
        }
    }

    /// Build a focal loss calculator.
    ///
    /// Only the none, sum and mean reductions are supported.
    pub fn build(self) -> Result<FocalLoss> {
        let Self {
            loss_fn,
            gamma,
            alpha,
            reduction,
        } = self;

        let reduction = match reduction {
            Reduction::None => FocalReduction::None,
            Reduction::Sum => FocalReduction::Sum,
            Reduction::Mean => FocalReduction::Mean,
            Reduction::Other(code) => bail!("unsupported reduction code {}", code),
        };

        Ok(FocalLoss {
            loss_fn: Box::new(loss_fn),
            gamma,
            alpha,
            reduction,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FocalReduction {
    None,
    Sum,
    Mean,
}

/// Focal loss calculator.
///
/// With [Reduction::Mean], the loss is summed over the class dimension and
/// averaged over samples. The result thus depends on how many samples are
/// pooled into one call.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct FocalLoss {
    #[derivative(Debug = "ignore")]
    loss_fn: Box<dyn Fn(&Tensor, &Tensor) -> Tensor + Send>,
    gamma: f64,
    alpha: Option<f64>,
    reduction: FocalReduction,
}

impl FocalLoss {
    /// Focal loss on top of element-wise binary cross entropy.
    pub fn bce(reduction: Reduction, device: Device) -> Result<Self> {
        let bce = BceWithLogitsLossInit::default(Reduction::None).build(device);
        FocalLossInit::default(reduction, move |input, target| bce.forward(input, target)).build()
    }

    /// Compute focal loss from an input against to a ground truth.
    pub fn forward(&self, input: &Tensor, target: &Tensor) -> Tensor {
        debug_assert_eq!(
            input.size2().unwrap(),
            target.size2().unwrap(),
            "input and target shape must be equal"
        );
        debug_assert!(
            bool::from(target.ge(0.0).logical_and(&target.le(1.0)).all()),
            "target values must be in range of [0.0, 1.0]"
        );

        // return zero tensor if (1) input is empty and (2) using mean reduction
        if input.numel() == 0 && self.reduction == FocalReduction::Mean {
            return Tensor::zeros(&[], (Kind::Float, input.device())).set_requires_grad(false);
        }

        let Self {
            ref loss_fn,
            gamma,
            alpha,
            reduction,
        } = *self;

        let orig_loss = loss_fn(input, target);
        debug_assert_eq!(
            orig_loss.size2().unwrap(),
            target.size2().unwrap(),
            "the contained loss function must not apply reduction"
        );

        // log(1 - p_t) = logsigmoid(-x * (2t - 1)), stable for large logits
        let log_inv_prob = (-input * (target * 2.0 - 1.0)).log_sigmoid();
        let modulating_factor = (log_inv_prob * gamma).exp();
        let loss: Tensor = match alpha {
            Some(alpha) => {
                let alpha_factor = target * alpha + (1.0 - target) * (1.0 - alpha);
                &orig_loss * &alpha_factor * &modulating_factor
            }
            None => &orig_loss * &modulating_factor,
        };

        match reduction {
            FocalReduction::None => loss,
            FocalReduction::Sum => loss.sum(Kind::Float),
            FocalReduction::Mean => loss.sum_dim_intlist(&[1], false, Kind::Float).mean(Kind::Float),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn focal_loss_down_weights_easy_examples() -> Result<()> {
        let focal = FocalLoss::bce(Reduction::None, Device::Cpu)?;
        let bce = BceWithLogitsLossInit::default(Reduction::None).build(Device::Cpu);

        let input = Tensor::of_slice(&[6.0f32, 0.0]).view([1, 2]);
        let target = Tensor::of_slice(&[1.0f32, 1.0]).view([1, 2]);

        let focal = Vec::<f32>::from(&focal.forward(&input, &target).view([-1]));
        let bce = Vec::<f32>::from(&bce.forward(&input, &target).view([-1]));

        // confident correct prediction shrinks by far more than an uncertain one
        assert!(focal[0] / bce[0] < 1e-4);
        assert!((focal[1] / bce[1] - 0.25).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn focal_loss_mean_sums_over_classes() -> Result<()> {
        let none = FocalLoss::bce(Reduction::None, Device::Cpu)?;
        let mean = FocalLoss::bce(Reduction::Mean, Device::Cpu)?;

        let input = Tensor::of_slice(&[0.3f32, -1.2, 2.0, 0.7, -0.1, 1.5]).view([2, 3]);
        let target = Tensor::of_slice(&[1.0f32, 0.0, 1.0, 0.0, 0.0, 1.0]).view([2, 3]);

        let elementwise = f64::from(&none.forward(&input, &target).sum(Kind::Float));
        let reduced = f64::from(&mean.forward(&input, &target));

        assert!((reduced - elementwise / 2.0).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn custom_reduction_is_rejected() {
        assert!(FocalLoss::bce(Reduction::Other(3), Device::Cpu).is_err());
    }

    #[test]
    fn focal_loss_converges() -> Result<()> {
        let device = Device::Cpu;
        let vs = nn::VarStore::new(device);
        let root = vs.root();
        let loss_fn = FocalLoss::bce(Reduction::Mean, device)?;

        let input = root.randn("input", &[16, 4], 0.0, 1.0);
        let target = Tensor::rand(&[16, 4], (Kind::Float, device))
            .ge(0.5)
            .to_kind(Kind::Float)
            .set_requires_grad(false);

        let mut optimizer = nn::Adam::default().build(&vs, 0.1)?;

        for _ in 0..2000 {
            let loss = loss_fn.forward(&input, &target);
            optimizer.backward_step(&loss);
        }

        ensure!(
            bool::from((input.sigmoid() - &target).abs().le(5e-2).all()),
            "the loss does not coverage"
        );

        Ok(())
    }
}
