use tag_tracker_core::{CameraError, CornerCountError, PnpError};

use crate::filter::FilterError;
use crate::params::ParamsError;

/// Errors returned by a [`crate::TagHypothesis`].
///
/// Every variant is a broken precondition on the caller's or a
/// collaborator's side. Expected tracking outcomes (a discontinuity, a
/// stale hypothesis) are reported as booleans instead.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TagError {
    #[error("tag has not been observed yet")]
    NotObserved,
    #[error("tag corner {index} has a non-finite coordinate")]
    NonFiniteCorner { index: usize },
    #[error(transparent)]
    CornerCount(#[from] CornerCountError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Pnp(#[from] PnpError),
    #[error("PnP found no pose with the tag in front of the camera")]
    NoPoseSolution,
    #[error("PnP found {count} equally good poses")]
    AmbiguousPose { count: usize },
    #[error(transparent)]
    Params(#[from] ParamsError),
}
