//! Output adapters turning head predictions into losses or detections.
//!
//! [`BoxOutputs`](boxes::BoxOutputs) wraps single-label box classification
//! and regression; [`HoiOutputs`](hoi::HoiOutputs) wraps multi-label action
//! classification of person-object pairs. Both implement [`OutputAdapter`]
//! and share the free helpers below.

pub mod boxes;
pub mod hoi;

use crate::events::{put_ratio, EventSink};
use crate::util::HoiResult;
use std::collections::BTreeMap;

/// Named scalar losses, e.g. `loss_cls`, `loss_box_reg`, `loss_action`.
pub type LossMap = BTreeMap<&'static str, f32>;

/// Shared training/serving contract of the output adapters.
pub trait OutputAdapter {
    /// Inference options (thresholds, top-K).
    type Params;
    /// Per-image detection result.
    type Detections;

    /// Computes the training losses, optionally writing accuracy diagnostics.
    fn losses(&self, events: Option<&mut dyn EventSink>) -> HoiResult<LossMap>;

    /// Produces one detection result per image, in batch order.
    fn inference(&self, params: &Self::Params) -> HoiResult<Vec<Self::Detections>>;
}

/// Loss for a batch without instances: the loss form evaluated on an empty
/// target, scaled by zero.
pub(crate) fn zero_instance_loss(loss_on_empty: f32) -> f32 {
    0.0 * loss_on_empty
}

/// Classification counts behind the accuracy diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccuracyStats {
    /// Number of classification decisions.
    pub num_instances: usize,
    /// Decisions that matched the label.
    pub num_accurate: usize,
    /// Decisions with a positive (foreground) label.
    pub num_fg: usize,
    /// Foreground decisions predicted correctly.
    pub fg_num_accurate: usize,
    /// Foreground decisions predicted as negative / background.
    pub num_false_negative: usize,
}

impl AccuracyStats {
    /// Writes `{prefix}/cls_accuracy`, `{prefix}/fg_cls_accuracy` and
    /// `{prefix}/false_negative`. Ratios with a zero denominator are skipped
    /// and sink failures are ignored.
    pub fn log(&self, sink: &mut dyn EventSink, prefix: &str) {
        put_ratio(
            sink,
            &format!("{prefix}/cls_accuracy"),
            self.num_accurate,
            self.num_instances,
        );
        put_ratio(
            sink,
            &format!("{prefix}/fg_cls_accuracy"),
            self.fg_num_accurate,
            self.num_fg,
        );
        put_ratio(
            sink,
            &format!("{prefix}/false_negative"),
            self.num_false_negative,
            self.num_fg,
        );
    }
}

#[cfg(feature = "rayon")]
pub(crate) fn map_images<T, U, F>(items: &[T], parallel: bool, f: F) -> HoiResult<Vec<U>>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> HoiResult<U> + Sync + Send,
{
    use rayon::prelude::*;

    if parallel {
        items.par_iter().map(&f).collect()
    } else {
        items.iter().map(f).collect()
    }
}

#[cfg(not(feature = "rayon"))]
pub(crate) fn map_images<T, U, F>(items: &[T], _parallel: bool, f: F) -> HoiResult<Vec<U>>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> HoiResult<U> + Sync + Send,
{
    items.iter().map(f).collect()
}
