//! Candidate scoring, selection and pruning.
//!
//! Includes the fused HOI candidate filter, top-K ordering and class-aware
//! non-maximum suppression for box detections.

pub(crate) mod filter;
pub(crate) mod nms;
pub(crate) mod topk;
