use nalgebra::{Point2, Point3};

/// Number of corners of a square fiducial.
pub const TAG_CORNER_COUNT: usize = 4;

/// Tag corners in image space, in a fixed caller-defined order
/// (e.g. clockwise from top-left).
pub type TagCorners2d = [Point2<f64>; TAG_CORNER_COUNT];

/// Tag corners in the camera frame, same order as the image corners.
pub type TagCorners3d = [Point3<f64>; TAG_CORNER_COUNT];

/// Detector output did not contain exactly four corners.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("expected 4 tag corners, got {got}")]
pub struct CornerCountError {
    pub got: usize,
}

/// Convert a detector-provided corner list into the fixed-arity form.
pub fn corners_from_slice(points: &[Point2<f64>]) -> Result<TagCorners2d, CornerCountError> {
    points
        .try_into()
        .map_err(|_| CornerCountError { got: points.len() })
}

/// Arithmetic mean of the four image corners.
pub fn center_2d(corners: &TagCorners2d) -> Point2<f64> {
    let sum = corners
        .iter()
        .fold(Point2::origin(), |acc: Point2<f64>, p| acc + p.coords);
    sum / TAG_CORNER_COUNT as f64
}

/// Arithmetic mean of the four camera-frame corners.
pub fn center_3d(corners: &TagCorners3d) -> Point3<f64> {
    let sum = corners
        .iter()
        .fold(Point3::origin(), |acc: Point3<f64>, p| acc + p.coords);
    sum / TAG_CORNER_COUNT as f64
}
