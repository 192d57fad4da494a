use crate::common::*;

/// Average precision of scores against binary labels.
///
/// Computes `sum_n (R_n - R_{n-1}) * P_n` over the distinct score thresholds
/// in decreasing order. Returns NaN when there is no positive label.
pub fn average_precision(scores: &[f32], labels: &[bool]) -> f64 {
    debug_assert_eq!(scores.len(), labels.len());

    let num_positives = labels.iter().filter(|&&label| label).count();
    if num_positives == 0 {
        return f64::NAN;
    }

    let order: Vec<usize> = (0..scores.len())
        .sorted_by(|&lhs, &rhs| {
            scores[rhs]
                .partial_cmp(&scores[lhs])
                .unwrap_or(Ordering::Equal)
        })
        .collect();

    let mut true_pos = 0usize;
    let mut false_pos = 0usize;
    let mut prev_recall = 0.0;
    let mut ap = 0.0;

    for (pos, &index) in order.iter().enumerate() {
        if labels[index] {
            true_pos += 1;
        } else {
            false_pos += 1;
        }

        // only evaluate at the last sample of a run of tied scores
        let is_threshold_end = order
            .get(pos + 1)
            .map(|&next| scores[next] != scores[index])
            .unwrap_or(true);
        if !is_threshold_end {
            continue;
        }

        let recall = true_pos as f64 / num_positives as f64;
        let precision = true_pos as f64 / (true_pos + false_pos) as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
    }

    ap
}

/// Per-class average precision of `[N, num_classes]` scores and labels.
pub fn per_class_average_precision(scores: &Tensor, labels: &Tensor) -> Result<Vec<f64>> {
    let (num_samples, num_classes) = scores.size2()?;
    ensure!(
        labels.size2()? == (num_samples, num_classes),
        "scores and labels must have equal shape"
    );

    let scores = scores.to_device(Device::Cpu).to_kind(Kind::Float);
    let labels = labels.to_device(Device::Cpu).gt(0.5);

    let aps = (0..num_classes)
        .map(|class| {
            let class_scores = Vec::<f32>::from(&scores.select(1, class).contiguous());
            let class_labels = Vec::<bool>::from(&labels.select(1, class).contiguous());
            average_precision(&class_scores, &class_labels)
        })
        .collect();
    Ok(aps)
}

/// The mean of the values ignoring NaNs, or NaN if all values are NaN.
pub fn nan_mean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|value| !value.is_nan())
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}
