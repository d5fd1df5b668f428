//! Configuration of the box and HOI output heads.

use crate::util::{HoiError, HoiResult};

/// Options recognized by the output heads and the positive-weight estimator.
#[derive(Clone, Debug, PartialEq)]
pub struct HoiConfig {
    /// HOI inference keeps triples with fused score strictly above this.
    pub score_threshold_test: f32,
    /// HOI detections kept per image; negative keeps all.
    pub topk_per_image_test: i64,
    /// Box-head inference keeps detections with score strictly above this.
    pub box_score_threshold_test: f32,
    /// Box detections kept per image; negative keeps all.
    pub box_topk_per_image_test: i64,
    /// IoU above which same-class boxes are suppressed.
    pub nms_iou_threshold: f32,
    /// `(min, max)` clamp range for per-action positive weights.
    pub action_class_weight_bounds: (f32, f32),
    /// Number of action classes (K).
    pub num_action_classes: usize,
    /// Number of foreground object classes of the box head.
    pub num_classes: usize,
    /// Person-object pairs sampled per image in a training batch.
    pub batch_size_per_image: usize,
    /// Images per training batch.
    pub images_per_batch: usize,
    /// Training datasets whose action priors are averaged.
    pub train_datasets: Vec<String>,
    /// Transition point of the smooth-L1 box regression loss.
    pub smooth_l1_beta: f32,
    /// Weights `(wx, wy, ww, wh)` of the box delta transform.
    pub bbox_reg_weights: (f32, f32, f32, f32),
    /// Run per-image inference in parallel (requires the `rayon` feature).
    pub parallel: bool,
}

impl Default for HoiConfig {
    fn default() -> Self {
        Self {
            score_threshold_test: 0.0,
            topk_per_image_test: 100,
            box_score_threshold_test: 0.05,
            box_topk_per_image_test: 100,
            nms_iou_threshold: 0.5,
            action_class_weight_bounds: (1.0, 10.0),
            num_action_classes: 117,
            num_classes: 80,
            batch_size_per_image: 64,
            images_per_batch: 16,
            train_datasets: Vec::new(),
            smooth_l1_beta: 0.0,
            bbox_reg_weights: (10.0, 10.0, 5.0, 5.0),
            parallel: false,
        }
    }
}

impl HoiConfig {
    /// Checks every option for a usable value.
    pub fn validate(&self) -> HoiResult<()> {
        if !self.score_threshold_test.is_finite() || !self.box_score_threshold_test.is_finite() {
            return Err(HoiError::InvalidConfig {
                reason: "score thresholds must be finite",
            });
        }
        if !(0.0..=1.0).contains(&self.nms_iou_threshold) {
            return Err(HoiError::InvalidConfig {
                reason: "nms_iou_threshold must lie in [0, 1]",
            });
        }
        validate_weight_bounds(self.action_class_weight_bounds)?;
        if self.num_action_classes == 0 {
            return Err(HoiError::InvalidConfig {
                reason: "num_action_classes must be > 0",
            });
        }
        if self.num_classes == 0 {
            return Err(HoiError::InvalidConfig {
                reason: "num_classes must be > 0",
            });
        }
        if self.images_per_batch == 0 || self.batch_size_per_image == 0 {
            return Err(HoiError::InvalidConfig {
                reason: "images_per_batch and batch_size_per_image must be > 0",
            });
        }
        let (wx, wy, ww, wh) = self.bbox_reg_weights;
        if [wx, wy, ww, wh].iter().any(|w| !w.is_finite() || *w <= 0.0) {
            return Err(HoiError::InvalidConfig {
                reason: "bbox_reg_weights must be finite and > 0",
            });
        }
        if !self.smooth_l1_beta.is_finite() || self.smooth_l1_beta < 0.0 {
            return Err(HoiError::InvalidConfig {
                reason: "smooth_l1_beta must be finite and >= 0",
            });
        }
        Ok(())
    }
}

/// Checks a `(min, max)` positive-weight clamp range.
pub(crate) fn validate_weight_bounds(bounds: (f32, f32)) -> HoiResult<()> {
    let (min, max) = bounds;
    if !min.is_finite() || !max.is_finite() {
        return Err(HoiError::InvalidConfig {
            reason: "action_class_weight_bounds must be finite",
        });
    }
    if min <= 0.0 {
        return Err(HoiError::InvalidConfig {
            reason: "action_class_weight_bounds min must be > 0",
        });
    }
    if min > max {
        return Err(HoiError::InvalidConfig {
            reason: "action_class_weight_bounds min must not exceed max",
        });
    }
    Ok(())
}
