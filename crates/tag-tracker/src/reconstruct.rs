//! 2D → 3D reconstruction of tag corners through the camera model.

use log::debug;
use tag_tracker_core::{
    corners_from_slice, solve_square, square_template, CameraModel, PlanarPose, TagCorners2d,
    TagCorners3d,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::error::TagError;

/// Recovers camera-frame tag corners from image corners.
///
/// Borrows the camera; never mutates it.
#[derive(Debug)]
pub struct PoseReconstructor<'a, C: CameraModel + ?Sized> {
    camera: &'a C,
    tag_size: f64,
}

impl<C: CameraModel + ?Sized> Clone for PoseReconstructor<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C: CameraModel + ?Sized> Copy for PoseReconstructor<'_, C> {}

impl<'a, C: CameraModel + ?Sized> PoseReconstructor<'a, C> {
    pub fn new(camera: &'a C, tag_size: f64) -> Self {
        Self { camera, tag_size }
    }

    /// Pose of the tag template in the camera frame.
    ///
    /// Fails rather than guessing when the solver does not produce exactly
    /// one optimal pose.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, image_points), fields(tag_size = self.tag_size))
    )]
    pub fn pose(&self, image_points: &TagCorners2d) -> Result<PlanarPose, TagError> {
        let undistorted = self.camera.undistort_points(image_points)?;
        let normalized = corners_from_slice(&undistorted)?;

        let pose = unique_pose(solve_square(&normalized, self.tag_size)?)?;
        debug!(
            "tag pose t=[{:.4}, {:.4}, {:.4}] rmse={:.2e}",
            pose.translation.x, pose.translation.y, pose.translation.z, pose.reprojection_rmse
        );
        Ok(pose)
    }

    /// Template corners transformed into the camera frame, in input order.
    pub fn points_3d(&self, image_points: &TagCorners2d) -> Result<TagCorners3d, TagError> {
        let pose = self.pose(image_points)?;
        Ok(square_template(self.tag_size).map(|p| pose.transform_point(&p)))
    }
}

/// The single optimal solution, or the contract violation explaining why
/// there is none.
fn unique_pose(mut solutions: Vec<PlanarPose>) -> Result<PlanarPose, TagError> {
    match solutions.len() {
        0 => Err(TagError::NoPoseSolution),
        1 => Ok(solutions.remove(0)),
        count => Err(TagError::AmbiguousPose { count }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::{Matrix3, Point2, Rotation3, Vector3};
    use tag_tracker_core::{
        BrownConrady5, CameraError, CameraIntrinsics, PinholeCamera, PnpError,
    };

    fn camera(distortion: BrownConrady5) -> PinholeCamera {
        PinholeCamera::new(
            CameraIntrinsics {
                fx: 900.0,
                fy: 900.0,
                cx: 640.0,
                cy: 480.0,
                skew: 0.0,
            },
            distortion,
        )
    }

    fn ground_truth(tag_size: f64) -> TagCorners3d {
        let r = Rotation3::from_euler_angles(0.3, 0.2, -0.4);
        let t = Vector3::new(0.1, -0.05, 1.4);
        square_template(tag_size).map(|p| r * p + t)
    }

    fn project(cam: &PinholeCamera, pts: &TagCorners3d) -> TagCorners2d {
        pts.map(|p| cam.project(&p).expect("in front of camera"))
    }

    #[test]
    fn recovers_corners_through_ideal_pinhole() {
        let cam = camera(BrownConrady5::default());
        let truth = ground_truth(0.2);
        let rec = PoseReconstructor::new(&cam, 0.2);
        let pts = rec.points_3d(&project(&cam, &truth)).expect("reconstruct");
        for (p, q) in pts.iter().zip(truth.iter()) {
            assert_abs_diff_eq!(*p, *q, epsilon = 1e-6);
        }
    }

    #[test]
    fn recovers_corners_through_distorted_camera() {
        let cam = camera(BrownConrady5 {
            k1: -0.2,
            k2: 0.05,
            k3: 0.0,
            p1: 0.0005,
            p2: 0.0002,
            iters: 30,
        });
        let truth = ground_truth(0.16);
        let rec = PoseReconstructor::new(&cam, 0.16);
        let pts = rec.points_3d(&project(&cam, &truth)).expect("reconstruct");
        for (p, q) in pts.iter().zip(truth.iter()) {
            assert_abs_diff_eq!(*p, *q, epsilon = 1e-5);
        }
    }

    #[test]
    fn degenerate_points_fail_loudly() {
        let cam = camera(BrownConrady5::default());
        let rec = PoseReconstructor::new(&cam, 0.2);
        let err = rec.points_3d(&[Point2::new(640.0, 480.0); 4]).unwrap_err();
        assert_eq!(err, TagError::Pnp(PnpError::DegenerateCorrespondences));
    }

    struct DroppingCamera;

    impl CameraModel for DroppingCamera {
        fn intrinsic_matrix(&self) -> Matrix3<f64> {
            Matrix3::identity()
        }

        fn distortion_coefficients(&self) -> Vec<f64> {
            Vec::new()
        }

        fn undistort_points(
            &self,
            pixels: &[Point2<f64>],
        ) -> Result<Vec<Point2<f64>>, CameraError> {
            Ok(pixels.iter().skip(1).copied().collect())
        }
    }

    #[test]
    fn camera_contract_violations_propagate() {
        let rec = PoseReconstructor::new(&DroppingCamera, 0.2);
        let pts = [Point2::new(0.0, 0.0); 4];
        assert!(matches!(
            rec.points_3d(&pts),
            Err(TagError::CornerCount(e)) if e.got == 3
        ));

        let broken = camera_with_zero_focal();
        let rec = PoseReconstructor::new(&broken, 0.2);
        assert_eq!(
            rec.points_3d(&pts).unwrap_err(),
            TagError::Camera(CameraError::SingularIntrinsics)
        );
    }

    fn camera_with_zero_focal() -> PinholeCamera {
        PinholeCamera::ideal(CameraIntrinsics {
            fx: 0.0,
            fy: 0.0,
            cx: 0.0,
            cy: 0.0,
            skew: 0.0,
        })
    }

    #[test]
    fn collinear_image_points_are_rejected() {
        let cam = camera(BrownConrady5::default());
        let rec = PoseReconstructor::new(&cam, 0.2);
        let pts = [
            Point2::new(600.0, 480.0),
            Point2::new(620.0, 480.0),
            Point2::new(640.0, 480.0),
            Point2::new(660.0, 480.0),
        ];
        assert!(rec.points_3d(&pts).is_err());
    }

    fn pose_about_x(angle: f64) -> PlanarPose {
        PlanarPose {
            rotation: Rotation3::from_euler_angles(angle, 0.0, 0.0),
            translation: Vector3::new(0.0, 0.0, 1.0),
            reprojection_rmse: 1e-6,
        }
    }

    #[test]
    fn solution_count_maps_to_contract_errors() {
        assert_eq!(unique_pose(Vec::new()).unwrap_err(), TagError::NoPoseSolution);

        let single = pose_about_x(0.1);
        assert_eq!(unique_pose(vec![single]).expect("one pose"), single);

        assert_eq!(
            unique_pose(vec![pose_about_x(0.3), pose_about_x(-0.3)]).unwrap_err(),
            TagError::AmbiguousPose { count: 2 }
        );
    }
}
