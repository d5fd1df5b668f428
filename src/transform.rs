//! Box regression delta encoding and decoding.
//!
//! Deltas `(dx, dy, dw, dh)` move a source box to a target box: `dx`, `dy`
//! shift the center in units of the source width and height, `dw`, `dh` scale
//! the size in log space. Each component is multiplied by its weight on
//! encode and divided by it on decode.

use crate::structures::BoxCoords;
use crate::util::{HoiError, HoiResult};

/// Default clamp for `dw` / `dh` before exponentiation: `ln(1000 / 16)`.
pub fn default_scale_clamp() -> f32 {
    (1000.0f32 / 16.0).ln()
}

/// Weighted center/size box transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Box2BoxTransform {
    weights: (f32, f32, f32, f32),
    scale_clamp: f32,
}

impl Box2BoxTransform {
    /// Creates a transform with the default scale clamp.
    pub fn new(weights: (f32, f32, f32, f32)) -> HoiResult<Self> {
        Self::with_clamp(weights, default_scale_clamp())
    }

    /// Creates a transform with an explicit clamp on the log-size deltas.
    pub fn with_clamp(weights: (f32, f32, f32, f32), scale_clamp: f32) -> HoiResult<Self> {
        let (wx, wy, ww, wh) = weights;
        if [wx, wy, ww, wh].iter().any(|w| !w.is_finite() || *w <= 0.0) {
            return Err(HoiError::InvalidConfig {
                reason: "box regression weights must be finite and > 0",
            });
        }
        if scale_clamp.is_nan() {
            return Err(HoiError::InvalidConfig {
                reason: "scale clamp must not be NaN",
            });
        }
        Ok(Self {
            weights,
            scale_clamp,
        })
    }

    /// Deltas that turn `src` into `target`.
    pub fn get_deltas(&self, src: &BoxCoords, target: &BoxCoords) -> [f32; 4] {
        let (wx, wy, ww, wh) = self.weights;
        let (src_cx, src_cy, src_w, src_h) = center_size(src);
        let (tgt_cx, tgt_cy, tgt_w, tgt_h) = center_size(target);
        [
            wx * (tgt_cx - src_cx) / src_w,
            wy * (tgt_cy - src_cy) / src_h,
            ww * (tgt_w / src_w).ln(),
            wh * (tgt_h / src_h).ln(),
        ]
    }

    /// Applies `deltas` to `src` and returns the decoded box.
    pub fn apply_deltas(&self, deltas: &[f32; 4], src: &BoxCoords) -> BoxCoords {
        let (wx, wy, ww, wh) = self.weights;
        let (cx, cy, w, h) = center_size(src);

        let dx = deltas[0] / wx;
        let dy = deltas[1] / wy;
        // clamp to avoid overflow in exp
        let dw = (deltas[2] / ww).min(self.scale_clamp);
        let dh = (deltas[3] / wh).min(self.scale_clamp);

        let pred_cx = dx * w + cx;
        let pred_cy = dy * h + cy;
        let pred_w = dw.exp() * w;
        let pred_h = dh.exp() * h;

        [
            pred_cx - 0.5 * pred_w,
            pred_cy - 0.5 * pred_h,
            pred_cx + 0.5 * pred_w,
            pred_cy + 0.5 * pred_h,
        ]
    }
}

fn center_size(b: &BoxCoords) -> (f32, f32, f32, f32) {
    let w = b[2] - b[0];
    let h = b[3] - b[1];
    (b[0] + 0.5 * w, b[1] + 0.5 * h, w, h)
}
