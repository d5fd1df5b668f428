//! Configured output heads.
//!
//! A head is built once from [`HoiConfig`] and keeps the settings that are
//! fixed for a run: thresholds, top-K and, for the HOI head, the positive
//! weight vector. Every `losses` / `inference` call wraps freshly passed
//! predictions in an output adapter.

use crate::candidate::filter::HoiInstances;
use crate::config::HoiConfig;
use crate::events::EventSink;
use crate::outputs::boxes::{BoxInferenceParams, BoxInstances, BoxOutputs};
use crate::outputs::hoi::{HoiInferenceParams, HoiOutputs};
use crate::outputs::{LossMap, OutputAdapter};
use crate::structures::instances::{HoPairs, Proposals};
use crate::transform::Box2BoxTransform;
use crate::util::{HoiError, HoiResult};
use crate::weights::{estimate_positive_weights, ActionPriorSource, PositiveWeights};

/// Action classification head for human-object pairs.
#[derive(Clone, Debug)]
pub struct HoiOutputLayers {
    pos_weights: PositiveWeights,
    params: HoiInferenceParams,
}

impl HoiOutputLayers {
    /// Creates a head with explicit weights and inference options.
    pub fn new(pos_weights: PositiveWeights, params: HoiInferenceParams) -> HoiResult<Self> {
        if pos_weights.is_empty() {
            return Err(HoiError::InvalidInput {
                reason: "positive weights must cover at least one action",
            });
        }
        Ok(Self {
            pos_weights,
            params,
        })
    }

    /// Validates `cfg` and estimates the positive weights from `catalog`.
    pub fn from_config<S>(cfg: &HoiConfig, catalog: &S) -> HoiResult<Self>
    where
        S: ActionPriorSource + ?Sized,
    {
        cfg.validate()?;
        let pos_weights = estimate_positive_weights(cfg, catalog)?;
        Self::new(
            pos_weights,
            HoiInferenceParams {
                score_threshold: cfg.score_threshold_test,
                topk_per_image: cfg.topk_per_image_test,
                parallel: cfg.parallel,
            },
        )
    }

    /// The positive weight per action class.
    pub fn pos_weights(&self) -> &PositiveWeights {
        &self.pos_weights
    }

    /// Inference options used by [`HoiOutputLayers::inference`].
    pub fn params(&self) -> &HoiInferenceParams {
        &self.params
    }

    /// Action loss for a training batch.
    pub fn losses(
        &self,
        pred_class_logits: Vec<f32>,
        hopairs: &[HoPairs],
        events: Option<&mut dyn EventSink>,
    ) -> HoiResult<LossMap> {
        HoiOutputs::new(pred_class_logits, hopairs, &self.pos_weights)?.losses(events)
    }

    /// HOI detections for every image of an inference batch.
    pub fn inference(
        &self,
        pred_class_logits: Vec<f32>,
        hopairs: &[HoPairs],
    ) -> HoiResult<Vec<HoiInstances>> {
        HoiOutputs::new(pred_class_logits, hopairs, &self.pos_weights)?.inference(&self.params)
    }
}

/// Box classification and regression head.
#[derive(Clone, Debug)]
pub struct BoxOutputLayers {
    transform: Box2BoxTransform,
    num_classes: usize,
    smooth_l1_beta: f32,
    params: BoxInferenceParams,
}

impl BoxOutputLayers {
    /// Validates `cfg` and builds the head.
    pub fn from_config(cfg: &HoiConfig) -> HoiResult<Self> {
        cfg.validate()?;
        Ok(Self {
            transform: Box2BoxTransform::new(cfg.bbox_reg_weights)?,
            num_classes: cfg.num_classes,
            smooth_l1_beta: cfg.smooth_l1_beta,
            params: BoxInferenceParams {
                score_threshold: cfg.box_score_threshold_test,
                nms_iou_threshold: cfg.nms_iou_threshold,
                topk_per_image: cfg.box_topk_per_image_test,
                parallel: cfg.parallel,
            },
        })
    }

    /// Number of foreground classes.
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Inference options used by [`BoxOutputLayers::inference`].
    pub fn params(&self) -> &BoxInferenceParams {
        &self.params
    }

    fn outputs<'a>(
        &self,
        class_probs: Vec<f32>,
        proposal_deltas: Vec<f32>,
        proposals: &'a [Proposals],
    ) -> HoiResult<BoxOutputs<'a>> {
        BoxOutputs::new(
            self.transform,
            self.num_classes,
            class_probs,
            proposal_deltas,
            proposals,
            self.smooth_l1_beta,
        )
    }

    /// Classification and regression losses for a training batch.
    pub fn losses(
        &self,
        class_probs: Vec<f32>,
        proposal_deltas: Vec<f32>,
        proposals: &[Proposals],
        events: Option<&mut dyn EventSink>,
    ) -> HoiResult<LossMap> {
        self.outputs(class_probs, proposal_deltas, proposals)?
            .losses(events)
    }

    /// Box detections for every image of an inference batch.
    pub fn inference(
        &self,
        class_probs: Vec<f32>,
        proposal_deltas: Vec<f32>,
        proposals: &[Proposals],
    ) -> HoiResult<Vec<BoxInstances>> {
        self.outputs(class_probs, proposal_deltas, proposals)?
            .inference(&self.params)
    }
}
