//! Per-tag hypothesis tracking for extrinsic calibration.
//!
//! A [`TagHypothesis`] follows one fiducial tag id through a sequence of
//! detections:
//! - four independent Kalman filters smooth the tag corners,
//! - a centroid-jump test restarts the hypothesis on discontinuities,
//! - a convergence test on posterior uncertainty and tracking time says when
//!   the corners are stable enough,
//! - corners are lifted to the camera frame by solving the square-tag PnP
//!   problem through a [`CameraModel`].
//!
//! Creating and expiring hypotheses (and resolving id collisions) is left to
//! the caller; [`TagHypothesis::is_alive`] is the probe it uses for expiry.
//!
//! ```
//! use nalgebra::Point2;
//! use tag_tracker::{CameraIntrinsics, PinholeCamera, TagHypothesis, Timestamp};
//!
//! let camera = PinholeCamera::ideal(CameraIntrinsics {
//!     fx: 800.0,
//!     fy: 800.0,
//!     cx: 320.0,
//!     cy: 240.0,
//!     skew: 0.0,
//! });
//! let mut tag = TagHypothesis::new(7, &camera);
//! let corners = [
//!     Point2::new(300.0, 220.0),
//!     Point2::new(340.0, 220.0),
//!     Point2::new(340.0, 260.0),
//!     Point2::new(300.0, 260.0),
//! ];
//! assert!(tag.update(&corners, Timestamp::from_secs(0.0)).unwrap());
//! assert!(tag.is_alive(Timestamp::from_secs(1.0)));
//! assert!(!tag.converged());
//! ```

mod convergence;
mod error;
mod filter;
mod hypothesis;
mod io;
mod params;
mod reconstruct;
mod types;

pub use convergence::{evaluate as evaluate_convergence, ConvergenceReport, ConvergenceStatus};
pub use error::TagError;
pub use filter::{CornerFilter, CornerFilterBank, FilterError, FilterNoise};
pub use hypothesis::TagHypothesis;
pub use io::{TagIoError, TagTrackerConfig};
pub use params::{DynamicsModel, ParamsError, TagHypothesisParams};
pub use reconstruct::PoseReconstructor;
pub use types::{TagHypothesisSnapshot, Timestamp};

pub use tag_tracker_core::{
    center_2d, center_3d, corners_from_slice, BrownConrady5, CameraError, CameraIntrinsics,
    CameraModel, CornerCountError, PinholeCamera, PlanarPose, PnpError, TagCorners2d,
    TagCorners3d, TAG_CORNER_COUNT,
};
