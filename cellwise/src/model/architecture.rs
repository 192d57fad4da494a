use crate::{common::*, error::UnsupportedKind};
use tch_act::Activation;

const DROPOUT_SUFFIX: &str = "_dropout";

/// The backbone width of a classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backbone {
    CellNetS,
    CellNetM,
    CellNetL,
}

impl Backbone {
    pub const ALL: [Self; 3] = [Self::CellNetS, Self::CellNetM, Self::CellNetL];

    pub fn name(&self) -> &'static str {
        match self {
            Self::CellNetS => "cellnet_s",
            Self::CellNetM => "cellnet_m",
            Self::CellNetL => "cellnet_l",
        }
    }

    /// Output channels of each stage. Every stage halves the resolution.
    pub fn stage_channels(&self) -> &'static [usize] {
        match self {
            Self::CellNetS => &[32, 64, 128, 256],
            Self::CellNetM => &[48, 96, 192, 384],
            Self::CellNetL => &[64, 128, 256, 512],
        }
    }

    pub fn activation(&self) -> Activation {
        match self {
            Self::CellNetS => Activation::Relu,
            Self::CellNetM => Activation::Mish,
            Self::CellNetL => Activation::Swish,
        }
    }
}

/// A backbone with an optional dropout before the classification head,
/// written as `<backbone>` or `<backbone>_dropout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Architecture {
    pub backbone: Backbone,
    pub dropout: bool,
}

impl Architecture {
    pub const DROPOUT_PROB: f64 = 0.5;

    pub fn dropout_prob(&self) -> f64 {
        if self.dropout {
            Self::DROPOUT_PROB
        } else {
            0.0
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = if self.dropout { DROPOUT_SUFFIX } else { "" };
        write!(f, "{}{}", self.backbone.name(), suffix)
    }
}

impl FromStr for Architecture {
    type Err = UnsupportedKind;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let (backbone_name, dropout) = match name.strip_suffix(DROPOUT_SUFFIX) {
            Some(prefix) => (prefix, true),
            None => (name, false),
        };
        let backbone = Backbone::ALL
            .iter()
            .find(|backbone| backbone.name() == backbone_name)
            .copied()
            .ok_or_else(|| {
                let names: Vec<_> = Backbone::ALL.iter().map(|backbone| backbone.name()).collect();
                UnsupportedKind::new("architecture", name, &names)
            })?;
        Ok(Self { backbone, dropout })
    }
}

impl TryFrom<String> for Architecture {
    type Error = UnsupportedKind;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl From<Architecture> for String {
    fn from(arch: Architecture) -> Self {
        arch.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_architecture_names() -> Result<()> {
        let arch: Architecture = "cellnet_m_dropout".parse()?;
        assert_eq!(arch.backbone, Backbone::CellNetM);
        assert!(arch.dropout);
        assert_eq!(arch.to_string(), "cellnet_m_dropout");

        let arch: Architecture = "cellnet_s".parse()?;
        assert!(!arch.dropout);
        assert_eq!(arch.dropout_prob(), 0.0);

        assert!("densenet121".parse::<Architecture>().is_err());
        Ok(())
    }

    #[test]
    fn architecture_serializes_as_name() -> Result<()> {
        let arch: Architecture = "cellnet_l_dropout".parse()?;
        let text = serde_json::to_string(&arch)?;
        assert_eq!(text, r#""cellnet_l_dropout""#);
        assert_eq!(serde_json::from_str::<Architecture>(&text)?, arch);
        Ok(())
    }
}
