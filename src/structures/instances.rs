//! Per-image containers consumed by the output adapters.

use crate::structures::{BoxCoords, ImageSize};
use crate::util::{HoiError, HoiResult};

/// Detected boxes needed to rebuild full HOI detections at inference.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PairDetections {
    /// Person boxes, length N.
    pub person_boxes: Vec<BoxCoords>,
    /// Object boxes, length M.
    pub object_boxes: Vec<BoxCoords>,
    /// Confidence per person box, length N.
    pub person_box_scores: Vec<f32>,
    /// Confidence per object box, length M.
    pub object_box_scores: Vec<f32>,
    /// Class id per object box, length M.
    pub object_box_classes: Vec<usize>,
}

impl PairDetections {
    /// Checks that the score and class vectors match their box lists.
    pub fn validate(&self) -> HoiResult<()> {
        check_len(
            "person_box_scores",
            self.person_boxes.len(),
            self.person_box_scores.len(),
        )?;
        check_len(
            "object_box_scores",
            self.object_boxes.len(),
            self.object_box_scores.len(),
        )?;
        check_len(
            "object_box_classes",
            self.object_boxes.len(),
            self.object_box_classes.len(),
        )
    }

    /// Number of person boxes (N).
    pub fn num_persons(&self) -> usize {
        self.person_boxes.len()
    }

    /// Number of object boxes (M).
    pub fn num_objects(&self) -> usize {
        self.object_boxes.len()
    }
}

/// Annotations carried by a per-image pair container.
#[derive(Clone, Debug, PartialEq)]
pub enum PairAnnotations {
    /// Multi-hot action labels, `num_pairs x K` row-major.
    Training { gt_actions: Vec<f32> },
    /// Boxes and scores of every enumerated person x object pair.
    Inference(PairDetections),
}

/// Candidate human-object pairs of one image.
///
/// At inference every person is paired with every object, person-major:
/// pair row `i * M + j` joins person `i` and object `j`.
#[derive(Clone, Debug, PartialEq)]
pub struct HoPairs {
    image_size: ImageSize,
    num_pairs: usize,
    annotations: PairAnnotations,
}

impl HoPairs {
    /// Creates a training container from multi-hot labels of width `num_actions`.
    pub fn training(
        image_size: ImageSize,
        gt_actions: Vec<f32>,
        num_actions: usize,
    ) -> HoiResult<Self> {
        if num_actions == 0 {
            return Err(HoiError::InvalidInput {
                reason: "num_actions must be > 0",
            });
        }
        if gt_actions.len() % num_actions != 0 {
            return Err(HoiError::LengthMismatch {
                what: "gt_actions",
                expected: (gt_actions.len() / num_actions + 1) * num_actions,
                got: gt_actions.len(),
            });
        }
        if gt_actions.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(HoiError::InvalidInput {
                reason: "gt_actions must lie in [0, 1]",
            });
        }
        Ok(Self {
            image_size,
            num_pairs: gt_actions.len() / num_actions,
            annotations: PairAnnotations::Training { gt_actions },
        })
    }

    /// Creates an inference container pairing every person with every object.
    pub fn inference(image_size: ImageSize, detections: PairDetections) -> HoiResult<Self> {
        detections.validate()?;
        let num_pairs = detections
            .num_persons()
            .checked_mul(detections.num_objects())
            .ok_or(HoiError::InvalidInput {
                reason: "pair count overflows",
            })?;
        Ok(Self {
            image_size,
            num_pairs,
            annotations: PairAnnotations::Inference(detections),
        })
    }

    /// Image size of the source image.
    pub fn image_size(&self) -> ImageSize {
        self.image_size
    }

    /// Number of candidate pairs (rows of logits) for this image.
    pub fn len(&self) -> usize {
        self.num_pairs
    }

    /// Returns true when the image has no candidate pairs.
    pub fn is_empty(&self) -> bool {
        self.num_pairs == 0
    }

    /// Returns true when the container carries ground-truth labels.
    pub fn is_training(&self) -> bool {
        matches!(self.annotations, PairAnnotations::Training { .. })
    }

    /// Annotations of this image.
    pub fn annotations(&self) -> &PairAnnotations {
        &self.annotations
    }
}

/// Ground truth matched to each proposal at training time.
#[derive(Clone, Debug, PartialEq)]
pub struct ProposalTargets {
    /// Class id per proposal; `num_classes` marks background.
    pub gt_classes: Vec<usize>,
    /// Matched ground-truth box per proposal.
    pub gt_boxes: Vec<BoxCoords>,
}

/// Region proposals of one image fed to the box head.
#[derive(Clone, Debug, PartialEq)]
pub struct Proposals {
    image_size: ImageSize,
    proposal_boxes: Vec<BoxCoords>,
    targets: Option<ProposalTargets>,
}

impl Proposals {
    /// Creates an inference-time proposal set.
    pub fn new(image_size: ImageSize, proposal_boxes: Vec<BoxCoords>) -> Self {
        Self {
            image_size,
            proposal_boxes,
            targets: None,
        }
    }

    /// Creates a training-time proposal set with matched ground truth.
    pub fn with_targets(
        image_size: ImageSize,
        proposal_boxes: Vec<BoxCoords>,
        targets: ProposalTargets,
    ) -> HoiResult<Self> {
        check_len("gt_classes", proposal_boxes.len(), targets.gt_classes.len())?;
        check_len("gt_boxes", proposal_boxes.len(), targets.gt_boxes.len())?;
        Ok(Self {
            image_size,
            proposal_boxes,
            targets: Some(targets),
        })
    }

    /// Image size of the source image.
    pub fn image_size(&self) -> ImageSize {
        self.image_size
    }

    /// Proposal boxes.
    pub fn boxes(&self) -> &[BoxCoords] {
        &self.proposal_boxes
    }

    /// Matched ground truth, if any.
    pub fn targets(&self) -> Option<&ProposalTargets> {
        self.targets.as_ref()
    }

    /// Number of proposals.
    pub fn len(&self) -> usize {
        self.proposal_boxes.len()
    }

    /// Returns true when the image has no proposals.
    pub fn is_empty(&self) -> bool {
        self.proposal_boxes.is_empty()
    }
}

pub(crate) fn check_len(what: &'static str, expected: usize, got: usize) -> HoiResult<()> {
    if expected != got {
        return Err(HoiError::LengthMismatch {
            what,
            expected,
            got,
        });
    }
    Ok(())
}
