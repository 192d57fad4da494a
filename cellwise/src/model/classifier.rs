use super::Architecture;
use crate::common::*;
use tch_modules::{ConvBn2D, ConvBn2DInit};

#[derive(Debug, Clone)]
pub struct CellClassifierInit {
    pub architecture: Architecture,
    pub in_channels: usize,
    pub num_classes: usize,
}

impl CellClassifierInit {
    pub fn build<'p, P>(self, path: P) -> Result<CellClassifier>
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self {
            architecture,
            in_channels,
            num_classes,
        } = self;

        ensure!(in_channels > 0, "in_channels must be positive");
        ensure!(num_classes > 0, "num_classes must be positive");

        let stage_channels = architecture.backbone.stage_channels();
        let activation = architecture.backbone.activation();
        let mut layers = vec![];

        // stem
        let stem_c = stage_channels[0];
        layers.push(
            ConvBn2DInit {
                s: 2,
                activation,
                ..ConvBn2DInit::new(in_channels, stem_c, 3)
            }
            .build(path / "stem"),
        );

        // each stage refines and then downsamples
        for (index, (&in_c, &out_c)) in stage_channels.iter().tuple_windows().enumerate() {
            let stage = path / format!("stage_{}", index);
            layers.push(
                ConvBn2DInit {
                    activation,
                    ..ConvBn2DInit::new(in_c, in_c, 3)
                }
                .build(&stage / "refine"),
            );
            layers.push(
                ConvBn2DInit {
                    s: 2,
                    activation,
                    ..ConvBn2DInit::new(in_c, out_c, 3)
                }
                .build(&stage / "down"),
            );
        }

        let last_c = *stage_channels
            .last()
            .ok_or_else(|| format_err!("architecture {} has no stages", architecture))?;
        let embedding_dim = last_c * 2;
        let fc = nn::linear(
            path / "fc",
            embedding_dim as i64,
            num_classes as i64,
            Default::default(),
        );

        Ok(CellClassifier {
            layers,
            fc,
            dropout: architecture.dropout_prob(),
            embedding_dim,
            num_classes,
        })
    }
}

/// A convolutional multi-label classifier over cell crops.
///
/// The embedding of a crop is the concatenation of global average and
/// global max pooling over the last feature map.
#[derive(Debug)]
pub struct CellClassifier {
    layers: Vec<ConvBn2D>,
    fc: nn::Linear,
    dropout: f64,
    embedding_dim: usize,
    num_classes: usize,
}

impl CellClassifier {
    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Computes `[N, embedding_dim]` embeddings of `[N, C, H, W]` crops.
    pub fn embed_t(&self, input: &Tensor, train: bool) -> Tensor {
        let features = self
            .layers
            .iter()
            .fold(input.shallow_clone(), |xs, layer| xs.apply_t(layer, train));
        let avg = features.adaptive_avg_pool2d(&[1, 1]).flatten(1, -1);
        let (max, _) = features.adaptive_max_pool2d(&[1, 1]);
        let max = max.flatten(1, -1);
        Tensor::cat(&[avg, max], 1)
    }

    /// Computes class logits from embeddings.
    pub fn head_t(&self, embeddings: &Tensor, train: bool) -> Tensor {
        embeddings.dropout(self.dropout, train).apply(&self.fc)
    }

    /// Computes `[N, num_classes]` class logits.
    pub fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        self.head_t(&self.embed_t(input, train), train)
    }
}
