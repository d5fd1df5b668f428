//! Scalar metrics sink for training diagnostics.
//!
//! Diagnostics are best effort: callers hand an optional sink to the loss
//! functions, and a failing `put_scalar` is reported through tracing and
//! otherwise ignored.

use crate::trace::trace_warn;
use crate::util::HoiResult;
use std::collections::BTreeMap;

/// Receiver of named scalar values.
pub trait EventSink {
    /// Records `value` under `name`.
    fn put_scalar(&mut self, name: &str, value: f32) -> HoiResult<()>;
}

/// In-memory sink keeping every recorded value with its iteration.
#[derive(Clone, Debug, Default)]
pub struct EventStorage {
    iter: u64,
    history: BTreeMap<String, Vec<(u64, f32)>>,
}

impl EventStorage {
    /// Creates an empty storage at iteration 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current iteration.
    pub fn iteration(&self) -> u64 {
        self.iter
    }

    /// Advances to the next iteration.
    pub fn step(&mut self) {
        self.iter += 1;
    }

    /// Most recent value recorded under `name`.
    pub fn latest(&self, name: &str) -> Option<f32> {
        self.history
            .get(name)
            .and_then(|values| values.last())
            .map(|&(_, value)| value)
    }

    /// All values recorded under `name`, oldest first.
    pub fn history(&self, name: &str) -> &[(u64, f32)] {
        self.history.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Names that have at least one value.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.history.keys().map(String::as_str)
    }
}

impl EventSink for EventStorage {
    fn put_scalar(&mut self, name: &str, value: f32) -> HoiResult<()> {
        self.history
            .entry(name.to_owned())
            .or_default()
            .push((self.iter, value));
        Ok(())
    }
}

/// Writes `numerator / denominator` to the sink when the denominator is non-zero.
///
/// Sink errors are swallowed.
pub(crate) fn put_ratio(
    sink: &mut dyn EventSink,
    name: &str,
    numerator: usize,
    denominator: usize,
) {
    if denominator == 0 {
        return;
    }
    let value = numerator as f32 / denominator as f32;
    if let Err(err) = sink.put_scalar(name, value) {
        trace_warn!(
            "event_sink_failed",
            metric = name,
            error = err.to_string().as_str()
        );
    }
}
