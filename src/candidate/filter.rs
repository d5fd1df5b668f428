//! Score fusion and thresholding of dense person x object x action grids.
//!
//! The action probability of every (person, object, action) triple is scaled
//! by the confidences of both boxes. Thresholding happens in the same pass, so
//! the fused N x M x K cube is never materialized; only surviving triples are
//! stored.

use crate::candidate::topk::truncate_topk;
use crate::structures::instances::{check_len, PairDetections};
use crate::structures::{BoxCoords, ImageSize};
use crate::trace::{trace_event, trace_span};
use crate::util::{HoiError, HoiResult};

/// One detected human-object interaction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HoiDetection {
    /// Box of the acting person.
    pub person_box: BoxCoords,
    /// Box of the object acted upon.
    pub object_box: BoxCoords,
    /// Class id of the object.
    pub object_class: usize,
    /// Action index in `0..K`.
    pub action_class: usize,
    /// Fused score: action probability times both box confidences.
    pub score: f32,
    /// Index of the person box within its image.
    pub person_index: usize,
    /// Index of the object box within its image.
    pub object_index: usize,
}

/// Variable-length HOI detections of one image.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HoiInstances {
    image_size: ImageSize,
    detections: Vec<HoiDetection>,
}

impl HoiInstances {
    /// Creates an empty result for an image.
    pub fn empty(image_size: ImageSize) -> Self {
        Self {
            image_size,
            detections: Vec::new(),
        }
    }

    /// Size of the image the detections belong to.
    pub fn image_size(&self) -> ImageSize {
        self.image_size
    }

    /// Detections in result order.
    pub fn detections(&self) -> &[HoiDetection] {
        &self.detections
    }

    /// Consumes the result and returns the detections.
    pub fn into_detections(self) -> Vec<HoiDetection> {
        self.detections
    }

    /// Number of detections.
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    /// Returns true when nothing survived filtering.
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Fused scores in result order.
    pub fn scores(&self) -> Vec<f32> {
        self.detections.iter().map(|d| d.score).collect()
    }
}

/// Selects the (person, object, action) triples whose fused score exceeds
/// `score_threshold`.
///
/// `hoi_scores` is a dense row-major N x M x K grid: element `(i, j, k)` sits
/// at `(i * M + j) * K + k`. A triple survives when
/// `hoi_scores[i, j, k] * (person_scores[i] * object_scores[j]) > score_threshold`.
///
/// Survivors are listed person-major, then object, then action. When
/// `topk >= 0` and fewer than the survivor count, survivors are sorted by
/// descending fused score (enumeration order on ties) and cut to `topk`.
/// Empty person or object lists yield an empty result.
#[allow(clippy::too_many_arguments)]
pub fn select_candidates(
    image_size: ImageSize,
    person_boxes: &[BoxCoords],
    object_boxes: &[BoxCoords],
    person_scores: &[f32],
    object_scores: &[f32],
    object_classes: &[usize],
    hoi_scores: &[f32],
    num_actions: usize,
    score_threshold: f32,
    topk: i64,
) -> HoiResult<HoiInstances> {
    let num_persons = person_boxes.len();
    let num_objects = object_boxes.len();
    check_len("person_scores", num_persons, person_scores.len())?;
    check_len("object_scores", num_objects, object_scores.len())?;
    check_len("object_classes", num_objects, object_classes.len())?;
    let expected = num_persons
        .checked_mul(num_objects)
        .and_then(|v| v.checked_mul(num_actions))
        .ok_or(HoiError::InvalidInput {
            reason: "score grid size overflows",
        })?;
    check_len("hoi_scores", expected, hoi_scores.len())?;

    let _span = trace_span!(
        "select_candidates",
        persons = num_persons,
        objects = num_objects,
        actions = num_actions
    )
    .entered();

    if expected == 0 {
        return Ok(HoiInstances::empty(image_size));
    }

    let mut detections = Vec::new();
    let mut rows = hoi_scores.chunks_exact(num_actions);
    for (i, (person_box, &person_score)) in person_boxes.iter().zip(person_scores).enumerate() {
        for j in 0..num_objects {
            let Some(row) = rows.next() else {
                return Err(HoiError::IndexOutOfBounds {
                    index: i * num_objects + j,
                    len: num_persons * num_objects,
                    context: "hoi_scores pair row",
                });
            };
            let pair_score = person_score * object_scores[j];
            for (k, &prob) in row.iter().enumerate() {
                let score = prob * pair_score;
                if score > score_threshold {
                    detections.push(HoiDetection {
                        person_box: *person_box,
                        object_box: object_boxes[j],
                        object_class: object_classes[j],
                        action_class: k,
                        score,
                        person_index: i,
                        object_index: j,
                    });
                }
            }
        }
    }

    let survivors = detections.len();
    truncate_topk(&mut detections, topk, |d| d.score);
    trace_event!("hoi_candidates", survivors = survivors, kept = detections.len());

    Ok(HoiInstances {
        image_size,
        detections,
    })
}

/// Runs [`select_candidates`] with the boxes and scores of one image.
pub fn select_candidates_for(
    image_size: ImageSize,
    pairs: &PairDetections,
    hoi_scores: &[f32],
    num_actions: usize,
    score_threshold: f32,
    topk: i64,
) -> HoiResult<HoiInstances> {
    select_candidates(
        image_size,
        &pairs.person_boxes,
        &pairs.object_boxes,
        &pairs.person_box_scores,
        &pairs.object_box_scores,
        &pairs.object_box_classes,
        hoi_scores,
        num_actions,
        score_threshold,
        topk,
    )
}
