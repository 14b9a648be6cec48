//! Closed-form pose of a square planar target from four normalized image points.
//!
//! This is IPPE (infinitesimal plane-based pose estimation) specialised to a
//! square centred at the origin of its own `z = 0` plane:
//!
//! 1. fit the plane-to-image homography `H` from the four correspondences,
//! 2. take the Jacobian `J` of `H` at the template centre and the image
//!    position `v` of that centre,
//! 3. the two rotations consistent with `(J, v)` follow in closed form,
//! 4. each rotation gets its least-squares translation,
//! 5. the candidate with the lower reprojection error wins.
//!
//! No iteration or initial guess is involved.

use nalgebra::{Isometry3, Matrix2, Matrix3, Point2, Point3, Rotation3, Translation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::corners::{TagCorners2d, TagCorners3d};
use crate::homography::homography_from_4pt;

/// Two candidates whose rotations differ by less than this are the same pose.
const SAME_POSE_ANGLE_RAD: f64 = 1e-3;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PnpError {
    #[error("tag size must be finite and > 0, got {0}")]
    InvalidTagSize(f64),
    #[error("image points are degenerate (collinear or repeated)")]
    DegenerateCorrespondences,
}

/// Rigid transform taking template coordinates into the camera frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanarPose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
    /// RMS reprojection error in normalized image units.
    pub reprojection_rmse: f64,
}

impl PlanarPose {
    #[inline]
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation * p + self.translation
    }

    pub fn isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.translation), self.rotation.into())
    }
}

/// Square template of side `tag_size` centred at the origin in `z = 0`.
///
/// Order: top-left, top-right, bottom-right, bottom-left, with `+y` up.
pub fn square_template(tag_size: f64) -> TagCorners3d {
    let h = 0.5 * tag_size;
    [
        Point3::new(-h, h, 0.0),
        Point3::new(h, h, 0.0),
        Point3::new(h, -h, 0.0),
        Point3::new(-h, -h, 0.0),
    ]
}

/// Solve the pose of a square of side `tag_size` seen at `normalized`.
///
/// Returns every globally optimal solution: one in the well-posed case, more
/// than one only if two distinct poses explain the points equally well.
/// An empty vector means no candidate placed the target in front of the
/// camera.
pub fn solve_square(
    normalized: &TagCorners2d,
    tag_size: f64,
) -> Result<Vec<PlanarPose>, PnpError> {
    if !tag_size.is_finite() || tag_size <= 0.0 {
        return Err(PnpError::InvalidTagSize(tag_size));
    }

    let template = square_template(tag_size);
    let plane = template.map(|p| Point2::new(p.x, p.y));

    let h = homography_from_4pt(&plane, normalized).ok_or(PnpError::DegenerateCorrespondences)?;
    let centre = Point2::origin();
    let v = h.apply(&centre);
    let j = h.jacobian_at(&centre);

    let rotations = ippe_rotations(&j, v.x, v.y).ok_or(PnpError::DegenerateCorrespondences)?;

    let mut candidates: Vec<PlanarPose> = rotations
        .iter()
        .filter_map(|r| {
            let translation = least_squares_translation(r, &template, normalized)?;
            let reprojection_rmse = reprojection_rmse(r, &translation, &template, normalized)?;
            Some(PlanarPose {
                rotation: *r,
                translation,
                reprojection_rmse,
            })
        })
        .collect();

    candidates.sort_by(|a, b| a.reprojection_rmse.total_cmp(&b.reprojection_rmse));
    Ok(keep_optimal(candidates))
}

fn keep_optimal(candidates: Vec<PlanarPose>) -> Vec<PlanarPose> {
    let Some(best) = candidates.first().copied() else {
        return candidates;
    };
    let tol = 1e-12 + 1e-9 * best.reprojection_rmse;

    let mut out = vec![best];
    for c in candidates.into_iter().skip(1) {
        let tied = c.reprojection_rmse - best.reprojection_rmse <= tol;
        let distinct = rotation_angle_between(&best.rotation, &c.rotation) > SAME_POSE_ANGLE_RAD;
        if tied && distinct {
            out.push(c);
        }
    }
    out
}

/// Geodesic angle between two rotations, robust to slight non-orthogonality.
pub fn rotation_angle_between(a: &Rotation3<f64>, b: &Rotation3<f64>) -> f64 {
    let trace = (a.matrix().transpose() * b.matrix()).trace();
    ((trace - 1.0) * 0.5).clamp(-1.0, 1.0).acos()
}

/// The two rotations compatible with the first-order projection of the plane
/// at its centre: Jacobian `j` and image position `(p, q)`.
fn ippe_rotations(j: &[[f64; 2]; 2], p: f64, q: f64) -> Option<[Rotation3<f64>; 2]> {
    // Rotate the optical axis onto the viewing ray of the template centre.
    let ray = Vector3::new(p, q, 1.0).normalize();
    let rv = Rotation3::rotation_between(&Vector3::z(), &ray)?;
    let m = rv.matrix();

    // B = [I2 | -v] * Rv[:, 0..2]
    let b = Matrix2::new(
        m[(0, 0)] - p * m[(2, 0)],
        m[(0, 1)] - p * m[(2, 1)],
        m[(1, 0)] - q * m[(2, 0)],
        m[(1, 1)] - q * m[(2, 1)],
    );
    let jm = Matrix2::new(j[0][0], j[0][1], j[1][0], j[1][1]);
    let a = b.try_inverse()? * jm;

    // Largest singular value of A.
    let ata = a.transpose() * a;
    let disc = ((ata[(0, 0)] - ata[(1, 1)]).powi(2) + 4.0 * ata[(0, 1)].powi(2)).sqrt();
    let gamma = (0.5 * (ata[(0, 0)] + ata[(1, 1)] + disc)).sqrt();
    if !gamma.is_finite() || gamma < 1e-12 {
        return None;
    }

    let r = a / gamma;
    let b0 = (1.0 - r[(0, 0)].powi(2) - r[(1, 0)].powi(2)).max(0.0).sqrt();
    let mut b1 = (1.0 - r[(0, 1)].powi(2) - r[(1, 1)].powi(2)).max(0.0).sqrt();
    if r[(0, 0)] * r[(0, 1)] + r[(1, 0)] * r[(1, 1)] > 0.0 {
        b1 = -b1;
    }

    let complete = |sign: f64| {
        let c1 = Vector3::new(r[(0, 0)], r[(1, 0)], sign * b0);
        let c2 = Vector3::new(r[(0, 1)], r[(1, 1)], sign * b1);
        let c3 = c1.cross(&c2);
        let local = Matrix3::from_columns(&[c1, c2, c3]);
        Rotation3::from_matrix_unchecked(m * local)
    };

    Some([complete(1.0), complete(-1.0)])
}

/// Translation minimizing the algebraic reprojection error for a fixed rotation.
fn least_squares_translation(
    r: &Rotation3<f64>,
    template: &TagCorners3d,
    normalized: &TagCorners2d,
) -> Option<Vector3<f64>> {
    // For each point: t_x - u t_z = u a_z - a_x and t_y - v t_z = v a_z - a_y, a = R X.
    let mut ata = Matrix3::<f64>::zeros();
    let mut atb = Vector3::<f64>::zeros();

    for (x, uv) in template.iter().zip(normalized.iter()) {
        let a = r * x;
        let rows = [
            (Vector3::new(1.0, 0.0, -uv.x), uv.x * a.z - a.x),
            (Vector3::new(0.0, 1.0, -uv.y), uv.y * a.z - a.y),
        ];
        for (row, rhs) in rows {
            ata += row * row.transpose();
            atb += row * rhs;
        }
    }

    let t = ata.try_inverse()? * atb;
    t.iter().all(|v| v.is_finite()).then_some(t)
}

/// RMS reprojection error, or `None` if any corner lands behind the camera.
fn reprojection_rmse(
    r: &Rotation3<f64>,
    t: &Vector3<f64>,
    template: &TagCorners3d,
    normalized: &TagCorners2d,
) -> Option<f64> {
    let mut sum_sq = 0.0;
    for (x, uv) in template.iter().zip(normalized.iter()) {
        let pc = r * x + t;
        if pc.z <= 0.0 {
            return None;
        }
        let du = pc.x / pc.z - uv.x;
        let dv = pc.y / pc.z - uv.y;
        sum_sq += du * du + dv * dv;
    }
    Some((sum_sq / template.len() as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn project(pose_r: &Rotation3<f64>, pose_t: &Vector3<f64>, tag_size: f64) -> TagCorners2d {
        square_template(tag_size).map(|x| {
            let pc = pose_r * x + pose_t;
            Point2::new(pc.x / pc.z, pc.y / pc.z)
        })
    }

    fn assert_pose(pose: &PlanarPose, r: &Rotation3<f64>, t: &Vector3<f64>) {
        let angle = rotation_angle_between(&pose.rotation, r);
        assert!(angle < 1e-5, "rotation off by {angle} rad");
        assert_abs_diff_eq!(pose.translation, *t, epsilon = 1e-6);
    }

    #[test]
    fn template_is_centred_square() {
        let t = square_template(0.2);
        assert_eq!(t[0], Point3::new(-0.1, 0.1, 0.0));
        assert_eq!(t[2], Point3::new(0.1, -0.1, 0.0));
        let c = t.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / 4.0;
        assert_abs_diff_eq!(c, Vector3::zeros(), epsilon = 1e-15);
    }

    #[test]
    fn fronto_parallel_pose_is_recovered() {
        let r = Rotation3::identity();
        let t = Vector3::new(0.05, -0.02, 1.5);
        let sols = solve_square(&project(&r, &t, 0.2), 0.2).expect("solve");
        assert_eq!(sols.len(), 1);
        assert_pose(&sols[0], &r, &t);
    }

    #[test]
    fn oblique_pose_is_recovered() {
        let r = Rotation3::from_euler_angles(0.4, -0.3, 0.25);
        let t = Vector3::new(-0.12, 0.08, 1.1);
        let sols = solve_square(&project(&r, &t, 0.16), 0.16).expect("solve");
        assert_eq!(sols.len(), 1);
        assert_pose(&sols[0], &r, &t);
        assert!(sols[0].reprojection_rmse < 1e-9);
    }

    #[test]
    fn recovered_pose_maps_template_onto_camera_points() {
        let r = Rotation3::from_euler_angles(-0.2, 0.35, -1.0);
        let t = Vector3::new(0.3, 0.1, 2.0);
        let sols = solve_square(&project(&r, &t, 0.2), 0.2).expect("solve");
        let pose = sols[0];
        for x in square_template(0.2) {
            let expected = r * x + t;
            assert_abs_diff_eq!(pose.transform_point(&x), expected, epsilon = 1e-6);
            assert_abs_diff_eq!(pose.isometry() * x, expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn invalid_tag_size_is_rejected() {
        let pts = project(&Rotation3::identity(), &Vector3::new(0.0, 0.0, 1.0), 0.2);
        assert_eq!(
            solve_square(&pts, 0.0).unwrap_err(),
            PnpError::InvalidTagSize(0.0)
        );
        assert!(solve_square(&pts, f64::NAN).is_err());
    }

    #[test]
    fn collapsed_points_are_degenerate() {
        let pts = [Point2::new(0.1, 0.1); 4];
        assert_eq!(
            solve_square(&pts, 0.2).unwrap_err(),
            PnpError::DegenerateCorrespondences
        );
    }

    fn candidate(angle: f64, rmse: f64) -> PlanarPose {
        PlanarPose {
            rotation: Rotation3::from_euler_angles(angle, 0.0, 0.0),
            translation: Vector3::new(0.0, 0.0, 1.0),
            reprojection_rmse: rmse,
        }
    }

    #[test]
    fn only_tied_and_distinct_candidates_are_kept() {
        assert!(keep_optimal(Vec::new()).is_empty());

        let both = keep_optimal(vec![candidate(0.3, 1e-6), candidate(-0.3, 1e-6)]);
        assert_eq!(both.len(), 2);

        let same = keep_optimal(vec![candidate(0.1, 1e-6), candidate(0.1 + 1e-5, 1e-6)]);
        assert_eq!(same.len(), 1);

        let worse = keep_optimal(vec![candidate(0.3, 1e-6), candidate(-0.3, 1e-3)]);
        assert_eq!(worse, vec![candidate(0.3, 1e-6)]);
    }
}
