//! Action classification outputs of the HOI head.
//!
//! Logits hold one row of K action scores per candidate pair, with the pairs
//! of all images concatenated in batch order. Each action is an independent
//! binary decision, so the loss is a positive-weighted binary cross-entropy
//! and probabilities come from an elementwise sigmoid.

use crate::candidate::filter::{select_candidates_for, HoiInstances};
use crate::events::EventSink;
use crate::outputs::{map_images, zero_instance_loss, AccuracyStats, LossMap, OutputAdapter};
use crate::structures::instances::{check_len, HoPairs, PairAnnotations, PairDetections};
use crate::structures::ragged::RaggedBatch;
use crate::trace::{trace_event, trace_span};
use crate::util::math::{bce_with_logits, sigmoid};
use crate::util::{HoiError, HoiResult};
use crate::weights::PositiveWeights;

/// Options for per-image HOI inference.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HoiInferenceParams {
    /// Keep triples with fused score strictly above this.
    pub score_threshold: f32,
    /// Detections kept per image; negative keeps all.
    pub topk_per_image: i64,
    /// Process images in parallel when the `rayon` feature is enabled.
    pub parallel: bool,
}

impl Default for HoiInferenceParams {
    fn default() -> Self {
        Self {
            score_threshold: 0.0,
            topk_per_image: 100,
            parallel: false,
        }
    }
}

enum Mode<'a> {
    Empty,
    Training { gt_actions: Vec<f32> },
    Inference { detections: Vec<&'a PairDetections> },
}

/// Action logits of a batch together with their per-image pairs.
pub struct HoiOutputs<'a> {
    logits: RaggedBatch<f32>,
    pairs: &'a [HoPairs],
    pos_weights: &'a PositiveWeights,
    mode: Mode<'a>,
}

impl<'a> HoiOutputs<'a> {
    /// Wraps flat `R x K` logits, where `R` is the total pair count of
    /// `pairs` and `K` the length of `pos_weights`.
    ///
    /// All images must carry the same kind of annotations: ground-truth
    /// actions (training) or detections (inference).
    pub fn new(
        pred_class_logits: Vec<f32>,
        pairs: &'a [HoPairs],
        pos_weights: &'a PositiveWeights,
    ) -> HoiResult<Self> {
        let num_actions = pos_weights.len();
        if num_actions == 0 {
            return Err(HoiError::InvalidInput {
                reason: "positive weights must cover at least one action",
            });
        }
        let counts: Vec<usize> = pairs.iter().map(HoPairs::len).collect();
        let logits = RaggedBatch::from_flat(pred_class_logits, num_actions, &counts)?;
        let mode = Self::detect_mode(pairs, num_actions)?;
        Ok(Self {
            logits,
            pairs,
            pos_weights,
            mode,
        })
    }

    fn detect_mode(pairs: &'a [HoPairs], num_actions: usize) -> HoiResult<Mode<'a>> {
        let Some(first) = pairs.first() else {
            return Ok(Mode::Empty);
        };
        if first.is_training() {
            let mut gt_actions = Vec::new();
            for p in pairs {
                let PairAnnotations::Training { gt_actions: gt } = p.annotations() else {
                    return Err(HoiError::MixedAnnotations);
                };
                check_len("gt_actions", p.len() * num_actions, gt.len())?;
                gt_actions.extend_from_slice(gt);
            }
            Ok(Mode::Training { gt_actions })
        } else {
            let mut detections = Vec::with_capacity(pairs.len());
            for p in pairs {
                let PairAnnotations::Inference(d) = p.annotations() else {
                    return Err(HoiError::MixedAnnotations);
                };
                detections.push(d);
            }
            Ok(Mode::Inference { detections })
        }
    }

    /// Number of action classes (K).
    pub fn num_actions(&self) -> usize {
        self.logits.width()
    }

    /// Pair count per image.
    pub fn num_preds_per_image(&self) -> Vec<usize> {
        self.logits.counts()
    }

    /// Returns true when the batch holds no pairs at all.
    pub fn no_instances(&self) -> bool {
        self.logits.num_rows() == 0
    }

    /// Returns true when the batch carries ground-truth actions.
    pub fn is_training(&self) -> bool {
        matches!(self.mode, Mode::Training { .. })
    }

    /// Positive-weighted binary cross-entropy averaged over all `R x K`
    /// decisions. A batch without pairs yields exactly 0.
    pub fn binary_cross_entropy_with_logits(
        &self,
        events: Option<&mut dyn EventSink>,
    ) -> HoiResult<f32> {
        let flat = self.logits.flat();
        if self.no_instances() {
            let zeros = vec![0.0f32; flat.len()];
            return Ok(zero_instance_loss(weighted_bce_sum(
                flat,
                &zeros,
                self.pos_weights.as_slice(),
            )));
        }

        let Mode::Training { gt_actions } = &self.mode else {
            return Err(HoiError::MissingAnnotations {
                what: "gt_actions",
            });
        };

        if let Some(sink) = events {
            self.accuracy(gt_actions).log(sink, "action");
        }

        let sum = weighted_bce_sum(flat, gt_actions, self.pos_weights.as_slice());
        Ok(sum / flat.len() as f32)
    }

    fn accuracy(&self, gt_actions: &[f32]) -> AccuracyStats {
        let mut stats = AccuracyStats {
            num_instances: gt_actions.len(),
            ..AccuracyStats::default()
        };
        for (&logit, &gt) in self.logits.flat().iter().zip(gt_actions) {
            let predicted = sigmoid(logit) > 0.5;
            let positive = gt > 0.0;
            if predicted == positive {
                stats.num_accurate += 1;
            }
            if positive {
                stats.num_fg += 1;
                if predicted {
                    stats.fg_num_accurate += 1;
                } else {
                    stats.num_false_negative += 1;
                }
            }
        }
        stats
    }

    /// Sigmoid probabilities split back into one `R_i x K` block per image.
    pub fn predict_probs(&self) -> RaggedBatch<f32> {
        self.logits.map(|&x| sigmoid(x))
    }
}

impl OutputAdapter for HoiOutputs<'_> {
    type Params = HoiInferenceParams;
    type Detections = HoiInstances;

    fn losses(&self, events: Option<&mut dyn EventSink>) -> HoiResult<LossMap> {
        let _span = trace_span!("hoi_losses", pairs = self.logits.num_rows()).entered();
        let mut losses = LossMap::new();
        losses.insert("loss_action", self.binary_cross_entropy_with_logits(events)?);
        Ok(losses)
    }

    fn inference(&self, params: &HoiInferenceParams) -> HoiResult<Vec<HoiInstances>> {
        let detections = match &self.mode {
            Mode::Empty => return Ok(Vec::new()),
            Mode::Training { .. } => {
                return Err(HoiError::MissingAnnotations {
                    what: "person/object detections",
                })
            }
            Mode::Inference { detections } => detections,
        };
        let _span = trace_span!("hoi_inference", images = self.pairs.len()).entered();

        let probs = self.predict_probs();
        let num_actions = self.num_actions();
        let jobs: Vec<_> = self
            .pairs
            .iter()
            .zip(detections.iter().copied())
            .zip(probs.iter())
            .collect();
        let results = map_images(&jobs, params.parallel, |((pairs, dets), scores)| {
            select_candidates_for(
                pairs.image_size(),
                dets,
                scores,
                num_actions,
                params.score_threshold,
                params.topk_per_image,
            )
        })?;

        trace_event!(
            "hoi_detections",
            total = results.iter().map(HoiInstances::len).sum::<usize>()
        );
        Ok(results)
    }
}

fn weighted_bce_sum(logits: &[f32], targets: &[f32], pos_weights: &[f32]) -> f32 {
    let width = pos_weights.len().max(1);
    logits
        .chunks(width)
        .zip(targets.chunks(width))
        .map(|(row, gt_row)| {
            row.iter()
                .zip(gt_row)
                .zip(pos_weights)
                .map(|((&x, &y), &w)| bce_with_logits(x, y, w))
                .sum::<f32>()
        })
        .sum()
}
