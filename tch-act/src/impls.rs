use crate::Activation;
use tch::{nn, Tensor};

impl nn::Module for Activation {
    fn forward(&self, xs: &Tensor) -> Tensor {
        use Activation::*;

        match *self {
            Linear => xs.shallow_clone(),
            Relu => xs.relu(),
            LRelu => lrelu(xs),
            Mish => xs.mish(),
            Swish => swish(xs),
            Logistic => xs.sigmoid(),
        }
    }
}

pub fn swish(tensor: &Tensor) -> Tensor {
    tensor * tensor.sigmoid()
}

/// Leaky ReLU with slope 0.2.
pub fn lrelu(tensor: &Tensor) -> Tensor {
    tensor.maximum(&(tensor * 0.2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::nn::Module as _;

    #[test]
    fn lrelu_scales_negative_part() {
        let xs = Tensor::of_slice(&[-2.0f32, 3.0]);
        let ys = Vec::<f32>::from(&Activation::LRelu.forward(&xs));
        assert!((ys[0] + 0.4).abs() < 1e-6);
        assert!((ys[1] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn swish_vanishes_at_zero() {
        let xs = Tensor::of_slice(&[0.0f32, 10.0]);
        let ys = Vec::<f32>::from(&swish(&xs));
        assert!(ys[0].abs() < 1e-6);
        assert!((ys[1] - 10.0).abs() < 1e-3);
    }
}
