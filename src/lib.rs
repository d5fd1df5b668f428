//! hoidet turns raw human-object interaction (HOI) head outputs into
//! class-balanced training losses and ranked per-image detections.
//!
//! The crate covers the output side of a two-stage HOI detector: the box
//! head (softmaxed class probabilities plus regression deltas) and the
//! interaction head (one row of action logits per person-object pair).
//! Network layers, data loading and training orchestration live elsewhere.
//! Per-image inference can run in parallel via the `rayon` feature.

pub mod config;
pub mod events;
pub mod layers;
pub mod outputs;
pub mod structures;
pub mod transform;
pub mod util;
pub mod weights;

mod candidate;
mod trace;

pub use config::HoiConfig;
pub use events::{EventSink, EventStorage};
pub use layers::{BoxOutputLayers, HoiOutputLayers};
pub use outputs::boxes::{
    fast_rcnn_inference, BoxDetection, BoxInferenceParams, BoxInstances, BoxOutputs,
};
pub use outputs::hoi::{HoiInferenceParams, HoiOutputs};
pub use outputs::{AccuracyStats, LossMap, OutputAdapter};
pub use structures::instances::{
    HoPairs, PairAnnotations, PairDetections, ProposalTargets, Proposals,
};
pub use structures::ragged::RaggedBatch;
pub use structures::{BoxCoords, ImageSize};
pub use transform::Box2BoxTransform;
pub use util::{HoiError, HoiResult};
pub use weights::{
    estimate_positive_weights, weights_from_priors, ActionPriorSource, DatasetCatalog,
    PositiveWeights,
};

pub use candidate::filter::{select_candidates, select_candidates_for, HoiDetection, HoiInstances};
pub use candidate::nms::batched_nms;
pub use candidate::topk::topk_limit;
