//! Camera model collaborator used for undistortion.
//!
//! The tracker only ever borrows a camera model. Anything implementing
//! [`CameraModel`] can be plugged in; [`PinholeCamera`] is the stock
//! pinhole + Brown–Conrady implementation.

use nalgebra::{Matrix3, Point2, Point3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Errors raised while mapping pixels to normalized image coordinates.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("intrinsic matrix is not invertible")]
    SingularIntrinsics,
    #[error("undistortion produced a non-finite point at index {index}")]
    NonFinite { index: usize },
}

/// Read-only camera model used by pose reconstruction.
pub trait CameraModel {
    /// 3×3 intrinsic matrix `K`.
    fn intrinsic_matrix(&self) -> Matrix3<f64>;

    /// Distortion coefficients in `[k1, k2, p1, p2, k3]` order.
    fn distortion_coefficients(&self) -> Vec<f64>;

    /// Map pixel coordinates to undistorted normalized image coordinates
    /// (`z = 1` plane), preserving order.
    fn undistort_points(&self, pixels: &[Point2<f64>]) -> Result<Vec<Point2<f64>>, CameraError>;
}

/// Pinhole intrinsics.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    #[serde(default)]
    pub skew: f64,
}

impl CameraIntrinsics {
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, self.skew, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }
}

/// Five-parameter Brown–Conrady distortion (radial k1..k3, tangential p1, p2).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrownConrady5 {
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub p1: f64,
    pub p2: f64,
    /// Fixed-point iterations used by [`BrownConrady5::undistort`]. Zero means 8.
    pub iters: u32,
}

impl BrownConrady5 {
    pub fn is_identity(&self) -> bool {
        self.k1 == 0.0 && self.k2 == 0.0 && self.k3 == 0.0 && self.p1 == 0.0 && self.p2 == 0.0
    }

    pub fn distort(&self, n: &Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;

        Vector2::new(x * radial + x_tan, y * radial + y_tan)
    }

    pub fn undistort(&self, n_dist: &Vector2<f64>) -> Vector2<f64> {
        if self.is_identity() {
            return *n_dist;
        }
        let iters = if self.iters == 0 { 8 } else { self.iters };
        let mut n = *n_dist;
        for _ in 0..iters {
            let err = self.distort(&n) - n_dist;
            n -= err;
        }
        n
    }
}

/// Pinhole camera with Brown–Conrady distortion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PinholeCamera {
    pub intrinsics: CameraIntrinsics,
    #[serde(default)]
    pub distortion: BrownConrady5,
}

impl PinholeCamera {
    pub fn new(intrinsics: CameraIntrinsics, distortion: BrownConrady5) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    /// Distortion-free pinhole camera.
    pub fn ideal(intrinsics: CameraIntrinsics) -> Self {
        Self::new(intrinsics, BrownConrady5::default())
    }

    /// Project a camera-frame point to pixels.
    pub fn project(&self, p_c: &Point3<f64>) -> Option<Point2<f64>> {
        if p_c.z <= 0.0 {
            return None;
        }
        let n_u = Vector2::new(p_c.x / p_c.z, p_c.y / p_c.z);
        let n_d = self.distortion.distort(&n_u);
        let px = self.intrinsics.matrix() * Vector3::new(n_d.x, n_d.y, 1.0);
        Some(Point2::new(px.x, px.y))
    }
}

impl CameraModel for PinholeCamera {
    fn intrinsic_matrix(&self) -> Matrix3<f64> {
        self.intrinsics.matrix()
    }

    fn distortion_coefficients(&self) -> Vec<f64> {
        let d = &self.distortion;
        vec![d.k1, d.k2, d.p1, d.p2, d.k3]
    }

    fn undistort_points(&self, pixels: &[Point2<f64>]) -> Result<Vec<Point2<f64>>, CameraError> {
        let k_inv = self
            .intrinsics
            .matrix()
            .try_inverse()
            .ok_or(CameraError::SingularIntrinsics)?;

        pixels
            .iter()
            .enumerate()
            .map(|(index, px)| {
                let s = k_inv * Vector3::new(px.x, px.y, 1.0);
                let n_d = Vector2::new(s.x / s.z, s.y / s.z);
                let n_u = self.distortion.undistort(&n_d);
                if n_u.x.is_finite() && n_u.y.is_finite() {
                    Ok(Point2::new(n_u.x, n_u.y))
                } else {
                    Err(CameraError::NonFinite { index })
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics {
            fx: 800.0,
            fy: 780.0,
            cx: 640.0,
            cy: 360.0,
            skew: 0.0,
        }
    }

    #[test]
    fn ideal_camera_undistort_is_k_inverse() {
        let cam = PinholeCamera::ideal(intrinsics());
        let out = cam
            .undistort_points(&[Point2::new(640.0, 360.0), Point2::new(1440.0, 1140.0)])
            .expect("undistort");
        assert_abs_diff_eq!(out[0].x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[0].y, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[1].x, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[1].y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn undistort_inverts_projection_with_mild_distortion() {
        let cam = PinholeCamera::new(
            intrinsics(),
            BrownConrady5 {
                k1: -0.12,
                k2: 0.03,
                k3: 0.0,
                p1: 0.001,
                p2: -0.0005,
                iters: 20,
            },
        );
        let p = Point3::new(0.15, -0.08, 1.2);
        let px = cam.project(&p).expect("in front");
        let n = cam.undistort_points(&[px]).expect("undistort")[0];
        assert_abs_diff_eq!(n.x, p.x / p.z, epsilon = 1e-8);
        assert_abs_diff_eq!(n.y, p.y / p.z, epsilon = 1e-8);
    }

    #[test]
    fn singular_intrinsics_are_reported() {
        let cam = PinholeCamera::ideal(CameraIntrinsics {
            fx: 0.0,
            fy: 780.0,
            cx: 640.0,
            cy: 360.0,
            skew: 0.0,
        });
        let err = cam.undistort_points(&[Point2::new(1.0, 1.0)]).unwrap_err();
        assert_eq!(err, CameraError::SingularIntrinsics);
    }

    #[test]
    fn coefficients_use_opencv_order() {
        let cam = PinholeCamera::new(
            intrinsics(),
            BrownConrady5 {
                k1: 1.0,
                k2: 2.0,
                k3: 5.0,
                p1: 3.0,
                p2: 4.0,
                iters: 0,
            },
        );
        assert_eq!(cam.distortion_coefficients(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(cam.intrinsic_matrix()[(0, 2)], 640.0);
    }

    #[test]
    fn points_behind_camera_do_not_project() {
        let cam = PinholeCamera::ideal(intrinsics());
        assert!(cam.project(&Point3::new(0.0, 0.0, -1.0)).is_none());
    }
}
