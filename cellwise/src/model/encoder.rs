use super::CellClassifier;
use crate::common::*;

/// A trained model producing class probabilities and embeddings of cell crops.
pub trait CellEncoder
where
    Self: Debug,
{
    /// Returns `[N, num_classes]` probabilities and `[N, embedding_dim]`
    /// embeddings of `[N, C, H, W]` crops, in evaluation mode.
    fn predict_and_embed(&self, crops: &Tensor) -> (Tensor, Tensor);
}

impl CellEncoder for CellClassifier {
    fn predict_and_embed(&self, crops: &Tensor) -> (Tensor, Tensor) {
        tch::no_grad(|| {
            let embeddings = self.embed_t(crops, false);
            let probs = self.head_t(&embeddings, false).sigmoid();
            (probs, embeddings)
        })
    }
}
