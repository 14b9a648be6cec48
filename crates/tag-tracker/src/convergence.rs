//! Decide whether a hypothesis is stable enough to be used for calibration.

use serde::{Deserialize, Serialize};

use crate::filter::CornerFilterBank;
use crate::params::TagHypothesisParams;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceStatus {
    /// No observation has been fused yet.
    NotObserved,
    /// Tracked for less than the minimum convergence time.
    TooShort,
    /// Some corner is still more uncertain than the threshold allows.
    TooUncertain,
    Converged,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub status: ConvergenceStatus,
    /// Seconds between the first and the latest observation of this hypothesis.
    pub tracked_for: f64,
    /// Largest per-corner 1-sigma positional uncertainty, in pixels.
    pub worst_sigma: Option<f64>,
}

impl ConvergenceReport {
    pub(crate) const NOT_OBSERVED: Self = Self {
        status: ConvergenceStatus::NotObserved,
        tracked_for: 0.0,
        worst_sigma: None,
    };

    #[inline]
    pub fn is_converged(&self) -> bool {
        self.status == ConvergenceStatus::Converged
    }
}

/// Time floor first, then the per-corner covariance ceiling.
pub fn evaluate(
    bank: &CornerFilterBank,
    tracked_for: f64,
    params: &TagHypothesisParams,
) -> ConvergenceReport {
    let worst_sigma = bank.max_position_sigma();
    let status = if tracked_for < params.min_convergence_time {
        ConvergenceStatus::TooShort
    } else if bank
        .position_sigmas()
        .iter()
        .any(|&sigma| sigma > params.convergence_translation_threshold)
    {
        ConvergenceStatus::TooUncertain
    } else {
        ConvergenceStatus::Converged
    };

    ConvergenceReport {
        status,
        tracked_for,
        worst_sigma: Some(worst_sigma),
    }
}
