//! Per-action positive loss weights derived from dataset priors.
//!
//! A prior is the fraction of training pairs that exhibit an action. Scaled by
//! `images_per_batch * batch_size_per_image` it approximates the number of
//! positive pairs per batch; its inverse, clamped into
//! `action_class_weight_bounds`, becomes the weight of positive labels for
//! that action. Datasets without priors contribute a uniform 1.0. The final
//! vector is the elementwise mean over all training datasets.

use crate::config::{validate_weight_bounds, HoiConfig};
use crate::trace::{trace_event, trace_span};
use crate::util::{HoiError, HoiResult};
use std::collections::HashMap;

/// Lookup of recorded action frequency priors per dataset.
pub trait ActionPriorSource {
    /// Priors of `dataset`, one per action class, if recorded.
    fn action_priors(&self, dataset: &str) -> Option<&[f32]>;
}

/// In-memory dataset metadata keyed by dataset name.
#[derive(Clone, Debug, Default)]
pub struct DatasetCatalog {
    priors: HashMap<String, Vec<f32>>,
}

impl DatasetCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the action priors of a dataset, replacing earlier ones.
    pub fn register_priors(&mut self, dataset: impl Into<String>, priors: Vec<f32>) {
        self.priors.insert(dataset.into(), priors);
    }

    /// Builder form of [`DatasetCatalog::register_priors`].
    pub fn with_priors(mut self, dataset: impl Into<String>, priors: Vec<f32>) -> Self {
        self.register_priors(dataset, priors);
        self
    }
}

impl ActionPriorSource for DatasetCatalog {
    fn action_priors(&self, dataset: &str) -> Option<&[f32]> {
        self.priors.get(dataset).map(Vec::as_slice)
    }
}

/// Immutable positive weight per action class.
#[derive(Clone, Debug, PartialEq)]
pub struct PositiveWeights {
    weights: Vec<f32>,
}

impl PositiveWeights {
    /// Weight 1.0 for every class (no reweighting).
    pub fn uniform(num_actions: usize) -> Self {
        Self {
            weights: vec![1.0; num_actions],
        }
    }

    /// Wraps explicit weights; each must be finite and > 0.
    pub fn from_vec(weights: Vec<f32>) -> HoiResult<Self> {
        if weights.iter().any(|w| !w.is_finite() || *w <= 0.0) {
            return Err(HoiError::InvalidInput {
                reason: "positive weights must be finite and > 0",
            });
        }
        Ok(Self { weights })
    }

    /// Weights in class order.
    pub fn as_slice(&self) -> &[f32] {
        &self.weights
    }

    /// Number of action classes.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Returns true for a zero-class vector.
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Weights contributed by one dataset with recorded priors.
///
/// A zero prior maps to the upper bound.
pub fn weights_from_priors(
    priors: &[f32],
    pairs_per_batch: f32,
    bounds: (f32, f32),
) -> HoiResult<Vec<f32>> {
    validate_weight_bounds(bounds)?;
    if priors.iter().any(|p| p.is_nan() || *p < 0.0) {
        return Err(HoiError::InvalidInput {
            reason: "action priors must be >= 0",
        });
    }
    let (min, max) = bounds;
    Ok(priors
        .iter()
        .map(|&prior| (1.0 / (prior * pairs_per_batch)).clamp(min, max))
        .collect())
}

/// Averages per-dataset contributions over `cfg.train_datasets`.
///
/// With no training datasets every class gets weight 1.0. A dataset without
/// priors, or with an empty prior list, contributes 1.0 per class.
pub fn estimate_positive_weights<S>(cfg: &HoiConfig, catalog: &S) -> HoiResult<PositiveWeights>
where
    S: ActionPriorSource + ?Sized,
{
    let num_actions = cfg.num_action_classes;
    let _span = trace_span!(
        "estimate_positive_weights",
        datasets = cfg.train_datasets.len(),
        actions = num_actions
    )
    .entered();

    if cfg.train_datasets.is_empty() {
        return Ok(PositiveWeights::uniform(num_actions));
    }

    if cfg.images_per_batch == 0 || cfg.batch_size_per_image == 0 {
        return Err(HoiError::InvalidConfig {
            reason: "images_per_batch and batch_size_per_image must be > 0",
        });
    }
    let pairs_per_batch = (cfg.images_per_batch as f32) * (cfg.batch_size_per_image as f32);
    let mut sum = vec![0.0f32; num_actions];
    for dataset in &cfg.train_datasets {
        match catalog.action_priors(dataset) {
            Some(priors) if !priors.is_empty() => {
                if priors.len() != num_actions {
                    return Err(HoiError::LengthMismatch {
                        what: "action priors",
                        expected: num_actions,
                        got: priors.len(),
                    });
                }
                let contribution =
                    weights_from_priors(priors, pairs_per_batch, cfg.action_class_weight_bounds)?;
                for (acc, w) in sum.iter_mut().zip(contribution) {
                    *acc += w;
                }
            }
            _ => {
                trace_event!("uniform_prior_fallback", dataset = dataset.as_str());
                for acc in sum.iter_mut() {
                    *acc += 1.0;
                }
            }
        }
    }

    let count = cfg.train_datasets.len() as f32;
    for acc in sum.iter_mut() {
        *acc /= count;
    }
    PositiveWeights::from_vec(sum)
}
