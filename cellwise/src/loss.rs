//! Training criteria selectable by name.

use crate::{common::*, error::UnsupportedKind};
use tch_modules::{
    BceWithLogitsLoss, BceWithLogitsLossInit, FocalLoss, HardLogLoss, HardLogLossInit,
    SymmetricLovaszLoss,
};

/// The training criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LossKind {
    Bce,
    Focal,
    /// Half-weighted sum of focal, symmetric Lovasz and hard-negative log losses.
    FocalSymmetricLovaszHardLog,
}

impl LossKind {
    pub const ALL: [Self; 3] = [Self::Bce, Self::Focal, Self::FocalSymmetricLovaszHardLog];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Bce => "BceLoss",
            Self::Focal => "FocalLoss",
            Self::FocalSymmetricLovaszHardLog => "FocalSymmetricLovaszHardLogLoss",
        }
    }

    pub fn build(&self, device: Device) -> Result<CellLoss> {
        let kind = *self;
        let loss = match kind {
            Self::Bce => CellLoss {
                kind,
                bce: Some(BceWithLogitsLossInit::default(Reduction::Mean).build(device)),
                focal: None,
                lovasz: None,
                hard_log: None,
            },
            Self::Focal => CellLoss {
                kind,
                bce: None,
                focal: Some(FocalLoss::bce(Reduction::Mean, device)?),
                lovasz: None,
                hard_log: None,
            },
            Self::FocalSymmetricLovaszHardLog => CellLoss {
                kind,
                bce: None,
                focal: Some(FocalLoss::bce(Reduction::Mean, device)?),
                lovasz: Some(SymmetricLovaszLoss::new()),
                hard_log: Some(HardLogLossInit::default().build()?),
            },
        };
        Ok(loss)
    }
}

impl Default for LossKind {
    fn default() -> Self {
        Self::FocalSymmetricLovaszHardLog
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LossKind {
    type Err = UnsupportedKind;

    /// Parses a name case-insensitively, with or without the `Loss` suffix.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let normalized = name.to_ascii_lowercase();
        let normalized = normalized.strip_suffix("loss").unwrap_or(&normalized);

        Self::ALL
            .iter()
            .find(|kind| {
                let lower = kind.name().to_ascii_lowercase();
                lower.strip_suffix("loss") == Some(normalized)
            })
            .copied()
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|kind| kind.name()).collect();
                UnsupportedKind::new("loss", name, &names)
            })
    }
}

impl TryFrom<String> for LossKind {
    type Error = UnsupportedKind;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl From<LossKind> for String {
    fn from(kind: LossKind) -> Self {
        kind.name().to_string()
    }
}

/// A criterion on `[batch_size, num_classes]` logits and labels.
#[derive(Debug)]
pub struct CellLoss {
    kind: LossKind,
    bce: Option<BceWithLogitsLoss>,
    focal: Option<FocalLoss>,
    lovasz: Option<SymmetricLovaszLoss>,
    hard_log: Option<HardLogLoss>,
}

impl CellLoss {
    pub fn kind(&self) -> LossKind {
        self.kind
    }

    pub fn forward(&self, logits: &Tensor, labels: &Tensor) -> Tensor {
        let Self {
            kind,
            ref bce,
            ref focal,
            ref lovasz,
            ref hard_log,
        } = *self;

        match (kind, bce, focal, lovasz, hard_log) {
            (LossKind::Bce, Some(bce), _, _, _) => bce.forward(logits, labels),
            (LossKind::Focal, _, Some(focal), _, _) => focal.forward(logits, labels),
            (LossKind::FocalSymmetricLovaszHardLog, _, Some(focal), Some(lovasz), Some(hard_log)) => {
                focal.forward(logits, labels) * 0.5
                    + lovasz.forward(logits, labels) * 0.5
                    + hard_log.forward(logits, labels) * 0.5
            }
            _ => unreachable!("loss components do not match the loss kind"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_loss_names() -> Result<()> {
        assert_eq!(
            "FocalSymmetricLovaszHardLogLoss".parse::<LossKind>()?,
            LossKind::FocalSymmetricLovaszHardLog
        );
        assert_eq!("focal".parse::<LossKind>()?, LossKind::Focal);
        assert_eq!("BceLoss".parse::<LossKind>()?, LossKind::Bce);

        let err = "HingeLoss".parse::<LossKind>().unwrap_err();
        assert_eq!(err.kind, "loss");
        assert_eq!(err.name, "HingeLoss");
        Ok(())
    }

    #[test]
    fn combined_loss_is_finite_and_differentiable() -> Result<()> {
        let loss_fn = LossKind::FocalSymmetricLovaszHardLog.build(Device::Cpu)?;

        let logits = Tensor::randn(&[4, 5], (Kind::Float, Device::Cpu)).set_requires_grad(true);
        let labels = Tensor::rand(&[4, 5], (Kind::Float, Device::Cpu))
            .ge(0.5)
            .to_kind(Kind::Float);

        let loss = loss_fn.forward(&logits, &labels);
        assert!(f64::from(&loss).is_finite());

        loss.backward();
        assert!(logits.grad().defined());
        Ok(())
    }

    #[test]
    fn every_kind_builds() -> Result<()> {
        let logits = Tensor::randn(&[2, 3], (Kind::Float, Device::Cpu));
        let labels = Tensor::of_slice(&[1.0f32, 0.0, 0.0, 0.0, 1.0, 1.0]).view([2, 3]);

        for kind in LossKind::ALL {
            let loss = kind.build(Device::Cpu)?.forward(&logits, &labels);
            assert!(f64::from(&loss) > 0.0, "{} is not positive", kind);
        }
        Ok(())
    }
}
