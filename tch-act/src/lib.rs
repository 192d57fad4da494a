//! Activation functions of the convolution blocks.

#[cfg(feature = "tch")]
pub use impls::*;
#[cfg(feature = "tch")]
mod impls;

use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Activation {
    Linear,
    Relu,
    LRelu,
    Mish,
    Swish,
    Logistic,
}

impl Activation {
    pub const ALL: [Activation; 6] = [
        Self::Linear,
        Self::Relu,
        Self::LRelu,
        Self::Mish,
        Self::Swish,
        Self::Logistic,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Relu => "relu",
            Self::LRelu => "lrelu",
            Self::Mish => "mish",
            Self::Swish => "swish",
            Self::Logistic => "logistic",
        }
    }
}

impl Default for Activation {
    fn default() -> Self {
        Self::Relu
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Activation {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|act| act.name() == text)
            .ok_or_else(|| format!("unknown activation '{}'", text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_names() {
        for act in Activation::ALL {
            assert_eq!(act.name().parse::<Activation>(), Ok(act));
        }
        assert!("plse".parse::<Activation>().is_err());
    }
}
