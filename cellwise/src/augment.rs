//! Geometric transforms for test-time and training augmentation.

use crate::common::*;

/// A deterministic geometric transform on the two trailing (height, width) dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    Identity,
    VerticalFlip,
    HorizontalFlip,
    Rotate90,
}

/// The test-time augmentation battery: the crop itself plus three transformed views.
pub const TTA_TRANSFORMS: [Transform; 4] = [
    Transform::Identity,
    Transform::VerticalFlip,
    Transform::HorizontalFlip,
    Transform::Rotate90,
];

impl Transform {
    /// Applies the transform to a `[.., H, W]` tensor.
    ///
    /// Rotation swaps height and width, so rotated views of non-square
    /// images cannot be stacked with the others.
    pub fn apply(&self, image: &Tensor) -> Tensor {
        match self {
            Self::Identity => image.shallow_clone(),
            Self::VerticalFlip => image.flip(&[-2]),
            Self::HorizontalFlip => image.flip(&[-1]),
            Self::Rotate90 => image.rot90(1, &[-2, -1]),
        }
    }
}

/// Stacks the views of a `[C, H, W]` crop under each transform into `[V, C, H, W]`.
pub fn augmented_views(crop: &Tensor, transforms: &[Transform]) -> Result<Tensor> {
    ensure!(!transforms.is_empty(), "at least one transform is required");
    let size = crop.size();
    ensure!(
        size.len() == 3,
        "expect a [C, H, W] crop, but get shape {:?}",
        size
    );
    if transforms.contains(&Transform::Rotate90) {
        ensure!(
            size[1] == size[2],
            "rotated views require a square crop, but get shape {:?}",
            size
        );
    }

    let views: Vec<_> = transforms.iter().map(|tf| tf.apply(crop)).collect();
    Ok(Tensor::stack(&views, 0))
}

/// Random flips and quarter turns for training samples.
#[derive(Debug, Clone)]
pub struct RandomFlipRotate {
    pub vertical_flip_prob: f64,
    pub horizontal_flip_prob: f64,
    pub rotate_prob: f64,
}

impl Default for RandomFlipRotate {
    fn default() -> Self {
        Self {
            vertical_flip_prob: 0.5,
            horizontal_flip_prob: 0.5,
            rotate_prob: 0.5,
        }
    }
}

impl RandomFlipRotate {
    pub fn apply<R>(&self, image: &Tensor, rng: &mut R) -> Tensor
    where
        R: Rng,
    {
        let mut output = image.shallow_clone();
        if rng.gen_bool(self.vertical_flip_prob) {
            output = Transform::VerticalFlip.apply(&output);
        }
        if rng.gen_bool(self.horizontal_flip_prob) {
            output = Transform::HorizontalFlip.apply(&output);
        }
        if rng.gen_bool(self.rotate_prob) {
            output = Transform::Rotate90.apply(&output);
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Tensor {
        // [[0, 1], [2, 3]]
        Tensor::of_slice(&[0.0f32, 1.0, 2.0, 3.0]).view([1, 2, 2])
    }

    #[test]
    fn flips_and_rotation() {
        let image = grid();
        let values = |tf: Transform| Vec::<f32>::from(&tf.apply(&image).view([-1]));

        assert_eq!(values(Transform::Identity), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(values(Transform::VerticalFlip), vec![2.0, 3.0, 0.0, 1.0]);
        assert_eq!(values(Transform::HorizontalFlip), vec![1.0, 0.0, 3.0, 2.0]);
        // counter-clockwise quarter turn
        assert_eq!(values(Transform::Rotate90), vec![1.0, 3.0, 0.0, 2.0]);
    }

    #[test]
    fn tta_views_shape() -> Result<()> {
        let crop = Tensor::rand(&[4, 8, 8], (Kind::Float, Device::Cpu));
        let views = augmented_views(&crop, &TTA_TRANSFORMS)?;
        assert_eq!(views.size(), vec![4, 4, 8, 8]);

        let first = views.select(0, 0);
        assert!(bool::from(first.eq_tensor(&crop).all()));
        Ok(())
    }

    #[test]
    fn rotation_requires_square_crop() {
        let crop = Tensor::rand(&[4, 8, 6], (Kind::Float, Device::Cpu));
        assert!(augmented_views(&crop, &TTA_TRANSFORMS).is_err());
        assert!(augmented_views(&crop, &[Transform::Identity, Transform::VerticalFlip]).is_ok());
    }

    #[test]
    fn random_flip_rotate_is_seeded() {
        let aug = RandomFlipRotate::default();
        let image = Tensor::rand(&[2, 5, 5], (Kind::Float, Device::Cpu));

        let lhs = aug.apply(&image, &mut StdRng::seed_from_u64(7));
        let rhs = aug.apply(&image, &mut StdRng::seed_from_u64(7));
        assert!(bool::from(lhs.eq_tensor(&rhs).all()));
    }
}
