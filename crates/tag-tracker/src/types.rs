use std::ops::Sub;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tag_tracker_core::TagCorners2d;

use crate::convergence::ConvergenceReport;
use crate::params::TagHypothesisParams;

/// Observation time in seconds on a monotonic clock.
///
/// Differences are plain seconds, which is all the tracker needs.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(f64);

impl Timestamp {
    pub const fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    pub fn from_duration(since_epoch: Duration) -> Self {
        Self(since_epoch.as_secs_f64())
    }

    pub const fn as_secs(self) -> f64 {
        self.0
    }
}

impl Sub for Timestamp {
    type Output = f64;

    fn sub(self, earlier: Timestamp) -> f64 {
        self.0 - earlier.0
    }
}

/// Serializable view of a hypothesis, for debug dumps and reports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TagHypothesisSnapshot {
    pub id: i32,
    pub params: TagHypothesisParams,
    pub first_observation: Option<Timestamp>,
    pub last_observation: Option<Timestamp>,
    pub latest_corners: Option<TagCorners2d>,
    pub filtered_corners: Option<TagCorners2d>,
    /// Per-corner 1-sigma positional uncertainty, in pixels.
    pub corner_sigmas: Option<[f64; 4]>,
    pub convergence: ConvergenceReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difference_is_seconds() {
        let a = Timestamp::from_secs(10.25);
        let b = Timestamp::from_duration(Duration::from_millis(12_750));
        assert_eq!(b - a, 2.5);
        assert!(a < b);
        assert_eq!(b.as_secs(), 12.75);
    }

    #[test]
    fn serializes_as_bare_seconds() {
        let json = serde_json::to_string(&Timestamp::from_secs(1.5)).expect("json");
        assert_eq!(json, "1.5");
        let back: Timestamp = serde_json::from_str("3.0").expect("parse");
        assert_eq!(back, Timestamp::from_secs(3.0));
    }
}
