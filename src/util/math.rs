//! Numeric helpers shared by the loss and inference paths.

/// Logistic function, evaluated without overflow for large `|x|`.
pub(crate) fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// One element of binary cross-entropy with logits and a positive weight.
///
/// Uses `log(1 + e^-|x|) + max(-x, 0)` for `-log(sigmoid(x))` so that large
/// logits of either sign stay finite.
pub(crate) fn bce_with_logits(x: f32, target: f32, pos_weight: f32) -> f32 {
    let log_weight = 1.0 + (pos_weight - 1.0) * target;
    let neg_log_sigmoid = (-x.abs()).exp().ln_1p() + (-x).max(0.0);
    (1.0 - target) * x + log_weight * neg_log_sigmoid
}

/// Smooth L1 of a single residual. Falls back to L1 for tiny `beta`.
pub(crate) fn smooth_l1(diff: f32, beta: f32) -> f32 {
    let n = diff.abs();
    if beta < 1e-5 {
        n
    } else if n < beta {
        0.5 * n * n / beta
    } else {
        n - 0.5 * beta
    }
}

/// Index of the largest value; the first one wins on ties.
pub(crate) fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &value) in values.iter().enumerate() {
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}
