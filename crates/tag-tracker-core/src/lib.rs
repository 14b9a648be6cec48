//! Geometric building blocks for fiducial tag tracking.
//!
//! This crate is intentionally small and purely geometric. It knows how to
//! undistort pixels through a [`CameraModel`] and how to recover the pose of a
//! square planar tag from four corners, but nothing about filtering or
//! tracking over time.

mod camera;
mod corners;
mod homography;
mod logger;
mod pnp;

pub use camera::{BrownConrady5, CameraError, CameraIntrinsics, CameraModel, PinholeCamera};
pub use corners::{
    center_2d, center_3d, corners_from_slice, CornerCountError, TagCorners2d, TagCorners3d,
    TAG_CORNER_COUNT,
};
pub use homography::{homography_from_4pt, Homography};
pub use pnp::{rotation_angle_between, solve_square, square_template, PlanarPose, PnpError};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
