//! Classification and regression outputs of the box head.
//!
//! Class scores arrive already softmaxed (`C + 1` columns, background last),
//! so the classification loss is a negative log-likelihood over those
//! probabilities rather than a softmax cross-entropy over logits.

use crate::candidate::nms::batched_nms;
use crate::candidate::topk::topk_limit;
use crate::events::EventSink;
use crate::outputs::{map_images, zero_instance_loss, AccuracyStats, LossMap, OutputAdapter};
use crate::structures::instances::Proposals;
use crate::structures::ragged::RaggedBatch;
use crate::structures::{clip_box, is_finite_box, BoxCoords, ImageSize};
use crate::trace::{trace_event, trace_span};
use crate::transform::Box2BoxTransform;
use crate::util::math::{argmax, smooth_l1};
use crate::util::{HoiError, HoiResult};

/// Options for per-image box inference.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxInferenceParams {
    /// Keep (proposal, class) scores strictly above this.
    pub score_threshold: f32,
    /// IoU above which same-class boxes are suppressed.
    pub nms_iou_threshold: f32,
    /// Detections kept per image; negative keeps all.
    pub topk_per_image: i64,
    /// Process images in parallel when the `rayon` feature is enabled.
    pub parallel: bool,
}

impl Default for BoxInferenceParams {
    fn default() -> Self {
        Self {
            score_threshold: 0.05,
            nms_iou_threshold: 0.5,
            topk_per_image: 100,
            parallel: false,
        }
    }
}

/// One detected box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxDetection {
    /// Decoded and clipped box.
    pub bbox: BoxCoords,
    /// Class probability.
    pub score: f32,
    /// Foreground class id.
    pub class: usize,
    /// Index of the proposal the box was decoded from.
    pub proposal_index: usize,
}

/// Box detections of one image, sorted by descending score.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoxInstances {
    /// Size of the source image.
    pub image_size: ImageSize,
    /// Detections surviving thresholding, NMS and top-K.
    pub detections: Vec<BoxDetection>,
}

/// Box-head predictions of a batch together with their proposals.
pub struct BoxOutputs<'a> {
    transform: Box2BoxTransform,
    num_classes: usize,
    class_probs: RaggedBatch<f32>,
    deltas: RaggedBatch<f32>,
    proposals: &'a [Proposals],
    smooth_l1_beta: f32,
}

impl<'a> BoxOutputs<'a> {
    /// Wraps flat `R x (C + 1)` class probabilities and `R x 4` or
    /// `R x 4C` regression deltas for the proposals of a batch.
    pub fn new(
        transform: Box2BoxTransform,
        num_classes: usize,
        pred_class_probs: Vec<f32>,
        pred_proposal_deltas: Vec<f32>,
        proposals: &'a [Proposals],
        smooth_l1_beta: f32,
    ) -> HoiResult<Self> {
        if num_classes == 0 {
            return Err(HoiError::InvalidInput {
                reason: "num_classes must be > 0",
            });
        }
        let counts: Vec<usize> = proposals.iter().map(Proposals::len).collect();
        let rows: usize = counts.iter().sum();
        let class_probs = RaggedBatch::from_flat(pred_class_probs, num_classes + 1, &counts)?;

        let delta_width = if rows == 0 || pred_proposal_deltas.len() == rows * 4 {
            4
        } else if pred_proposal_deltas.len() == rows * 4 * num_classes {
            4 * num_classes
        } else {
            return Err(HoiError::LengthMismatch {
                what: "pred_proposal_deltas",
                expected: rows * 4 * num_classes,
                got: pred_proposal_deltas.len(),
            });
        };
        let deltas = RaggedBatch::from_flat(pred_proposal_deltas, delta_width, &counts)?;

        Ok(Self {
            transform,
            num_classes,
            class_probs,
            deltas,
            proposals,
            smooth_l1_beta,
        })
    }

    /// Returns true when the batch holds no proposals at all.
    pub fn no_instances(&self) -> bool {
        self.class_probs.num_rows() == 0
    }

    fn class_agnostic(&self) -> bool {
        self.deltas.width() == 4
    }

    fn targets(&self) -> HoiResult<(Vec<usize>, Vec<BoxCoords>)> {
        let mut gt_classes = Vec::with_capacity(self.class_probs.num_rows());
        let mut gt_boxes = Vec::with_capacity(self.class_probs.num_rows());
        for p in self.proposals.iter().filter(|p| !p.is_empty()) {
            let targets = p.targets().ok_or(HoiError::MissingAnnotations {
                what: "proposal gt_classes",
            })?;
            for &class in &targets.gt_classes {
                if class > self.num_classes {
                    return Err(HoiError::IndexOutOfBounds {
                        index: class,
                        len: self.num_classes + 1,
                        context: "gt_classes",
                    });
                }
            }
            gt_classes.extend_from_slice(&targets.gt_classes);
            gt_boxes.extend_from_slice(&targets.gt_boxes);
        }
        Ok((gt_classes, gt_boxes))
    }

    /// Mean negative log-likelihood of the ground-truth class.
    ///
    /// A zero probability is floored at `f32::MIN_POSITIVE` before the log.
    pub fn softmax_cross_entropy_loss(
        &self,
        events: Option<&mut dyn EventSink>,
    ) -> HoiResult<f32> {
        if self.no_instances() {
            return Ok(zero_instance_loss(nll_sum(
                self.class_probs.flat(),
                &[],
                self.num_classes + 1,
            )));
        }
        let (gt_classes, _) = self.targets()?;
        if let Some(sink) = events {
            self.accuracy(&gt_classes).log(sink, "fast_rcnn");
        }
        let sum = nll_sum(self.class_probs.flat(), &gt_classes, self.num_classes + 1);
        Ok(sum / gt_classes.len() as f32)
    }

    fn accuracy(&self, gt_classes: &[usize]) -> AccuracyStats {
        let background = self.num_classes;
        let mut stats = AccuracyStats {
            num_instances: gt_classes.len(),
            ..AccuracyStats::default()
        };
        let rows = self.class_probs.flat().chunks_exact(self.num_classes + 1);
        for (row, &gt) in rows.zip(gt_classes) {
            let pred = argmax(row).unwrap_or(background);
            if pred == gt {
                stats.num_accurate += 1;
            }
            if gt < background {
                stats.num_fg += 1;
                if pred == gt {
                    stats.fg_num_accurate += 1;
                }
                if pred == background {
                    stats.num_false_negative += 1;
                }
            }
        }
        stats
    }

    /// Smooth-L1 regression loss over foreground proposals, normalized by the
    /// total number of proposals.
    pub fn smooth_l1_loss(&self) -> HoiResult<f32> {
        if self.no_instances() {
            return Ok(zero_instance_loss(self.smooth_l1_sum(&[], &[])));
        }
        let (gt_classes, gt_boxes) = self.targets()?;
        let sum = self.smooth_l1_sum(&gt_classes, &gt_boxes);
        Ok(sum / gt_classes.len() as f32)
    }

    fn smooth_l1_sum(&self, gt_classes: &[usize], gt_boxes: &[BoxCoords]) -> f32 {
        let proposal_boxes = self.proposals.iter().flat_map(|p| p.boxes().iter());
        let delta_rows = self.deltas.flat().chunks_exact(self.deltas.width());

        let mut sum = 0.0f32;
        for (((proposal, deltas), &gt_class), gt_box) in proposal_boxes
            .zip(delta_rows)
            .zip(gt_classes)
            .zip(gt_boxes)
        {
            if gt_class >= self.num_classes {
                continue;
            }
            let start = if self.class_agnostic() { 0 } else { 4 * gt_class };
            let target = self.transform.get_deltas(proposal, gt_box);
            for (pred, tgt) in deltas[start..start + 4].iter().zip(target) {
                sum += smooth_l1(pred - tgt, self.smooth_l1_beta);
            }
        }
        sum
    }

    /// Decoded boxes per proposal, one block of `4C` (or 4 when class
    /// agnostic) coordinates per row. Boxes are not clipped yet.
    pub fn predict_boxes(&self) -> HoiResult<RaggedBatch<f32>> {
        let width = self.deltas.width();
        let mut parts = Vec::with_capacity(self.proposals.len());
        for (p, deltas) in self.proposals.iter().zip(self.deltas.iter()) {
            let mut out = Vec::with_capacity(deltas.len());
            for (proposal, row) in p.boxes().iter().zip(deltas.chunks_exact(width)) {
                for d in row.chunks_exact(4) {
                    let decoded = self
                        .transform
                        .apply_deltas(&[d[0], d[1], d[2], d[3]], proposal);
                    out.extend_from_slice(&decoded);
                }
            }
            parts.push(out);
        }
        RaggedBatch::from_parts(parts, width)
    }

    /// Class probabilities split per image.
    pub fn predict_probs(&self) -> &RaggedBatch<f32> {
        &self.class_probs
    }
}

impl OutputAdapter for BoxOutputs<'_> {
    type Params = BoxInferenceParams;
    type Detections = BoxInstances;

    fn losses(&self, events: Option<&mut dyn EventSink>) -> HoiResult<LossMap> {
        let _span = trace_span!("box_losses", proposals = self.class_probs.num_rows()).entered();
        let mut losses = LossMap::new();
        losses.insert("loss_cls", self.softmax_cross_entropy_loss(events)?);
        losses.insert("loss_box_reg", self.smooth_l1_loss()?);
        Ok(losses)
    }

    fn inference(&self, params: &BoxInferenceParams) -> HoiResult<Vec<BoxInstances>> {
        let _span = trace_span!("box_inference", images = self.proposals.len()).entered();
        let boxes = self.predict_boxes()?;
        let image_sizes: Vec<ImageSize> = self.proposals.iter().map(Proposals::image_size).collect();
        fast_rcnn_inference(&boxes, &self.class_probs, &image_sizes, self.num_classes, params)
    }
}

/// Thresholds, suppresses and truncates box predictions of every image.
///
/// `boxes` rows hold either one box per foreground class (`4C` values) or a
/// single class-agnostic box (4 values); `scores` rows hold `C + 1`
/// probabilities with background last. Rows with any non-finite box
/// coordinate or score are dropped; surviving boxes are clipped to the image.
pub fn fast_rcnn_inference(
    boxes: &RaggedBatch<f32>,
    scores: &RaggedBatch<f32>,
    image_sizes: &[ImageSize],
    num_classes: usize,
    params: &BoxInferenceParams,
) -> HoiResult<Vec<BoxInstances>> {
    if boxes.counts() != scores.counts() {
        return Err(HoiError::InvalidInput {
            reason: "boxes and scores disagree on per-image counts",
        });
    }
    if image_sizes.len() != scores.num_images() {
        return Err(HoiError::LengthMismatch {
            what: "image_sizes",
            expected: scores.num_images(),
            got: image_sizes.len(),
        });
    }
    if scores.width() != num_classes + 1 {
        return Err(HoiError::LengthMismatch {
            what: "score columns",
            expected: num_classes + 1,
            got: scores.width(),
        });
    }
    if boxes.width() != 4 && boxes.width() != 4 * num_classes {
        return Err(HoiError::LengthMismatch {
            what: "box columns",
            expected: 4 * num_classes,
            got: boxes.width(),
        });
    }

    let jobs: Vec<_> = boxes
        .iter()
        .zip(scores.iter())
        .zip(image_sizes.iter().copied())
        .collect();
    let box_width = boxes.width();
    map_images(&jobs, params.parallel, |&((image_boxes, image_scores), size)| {
        Ok(fast_rcnn_inference_single_image(
            image_boxes,
            box_width,
            image_scores,
            num_classes,
            size,
            params,
        ))
    })
}

fn fast_rcnn_inference_single_image(
    boxes: &[f32],
    box_width: usize,
    scores: &[f32],
    num_classes: usize,
    image_size: ImageSize,
    params: &BoxInferenceParams,
) -> BoxInstances {
    let mut candidates: Vec<BoxDetection> = Vec::new();
    let rows = boxes
        .chunks_exact(box_width)
        .zip(scores.chunks_exact(num_classes + 1));
    for (proposal_index, (box_row, score_row)) in rows.enumerate() {
        let row_boxes: Vec<BoxCoords> = box_row
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect();
        if !row_boxes.iter().all(is_finite_box) || !score_row.iter().all(|s| s.is_finite()) {
            continue;
        }
        for (class, &score) in score_row[..num_classes].iter().enumerate() {
            if score > params.score_threshold {
                let bbox = if row_boxes.len() == 1 {
                    row_boxes[0]
                } else {
                    row_boxes[class]
                };
                let bbox = clip_box(&bbox, image_size);
                candidates.push(BoxDetection {
                    bbox,
                    score,
                    class,
                    proposal_index,
                });
            }
        }
    }

    let cand_boxes: Vec<BoxCoords> = candidates.iter().map(|c| c.bbox).collect();
    let cand_scores: Vec<f32> = candidates.iter().map(|c| c.score).collect();
    let cand_classes: Vec<usize> = candidates.iter().map(|c| c.class).collect();
    let mut keep = batched_nms(
        &cand_boxes,
        &cand_scores,
        &cand_classes,
        params.nms_iou_threshold,
    );
    if let Some(k) = topk_limit(params.topk_per_image) {
        keep.truncate(k);
    }
    trace_event!(
        "box_detections",
        candidates = candidates.len(),
        kept = keep.len()
    );

    BoxInstances {
        image_size,
        detections: keep.into_iter().map(|idx| candidates[idx]).collect(),
    }
}

fn nll_sum(probs: &[f32], gt_classes: &[usize], width: usize) -> f32 {
    probs
        .chunks_exact(width)
        .zip(gt_classes)
        .map(|(row, &gt)| -row[gt].max(f32::MIN_POSITIVE).ln())
        .sum()
}
