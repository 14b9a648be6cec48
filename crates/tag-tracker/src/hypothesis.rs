//! Per-tag hypothesis: temporal filtering, continuity and convergence.
//!
//! A [`TagHypothesis`] is created by the caller for one tag id and fed every
//! detection of that id through [`TagHypothesis::update`]. It keeps the raw
//! and filtered corners, restarts itself when a detection is too far from
//! what it has been tracking, and answers 3D queries through the borrowed
//! camera model.

use log::debug;
use nalgebra::{Point2, Point3};

use tag_tracker_core::{
    center_2d, center_3d, CameraModel, PinholeCamera, PlanarPose, TagCorners2d, TagCorners3d,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::convergence::{self, ConvergenceReport};
use crate::error::TagError;
use crate::filter::CornerFilterBank;
use crate::params::{DynamicsModel, ParamsError, TagHypothesisParams};
use crate::reconstruct::PoseReconstructor;
use crate::types::{TagHypothesisSnapshot, Timestamp};

/// State that only exists once the tag has been observed.
#[derive(Clone, Debug, PartialEq)]
struct Track {
    first_observation: Timestamp,
    last_observation: Timestamp,
    latest: TagCorners2d,
    filtered: TagCorners2d,
    bank: CornerFilterBank,
}

impl Track {
    fn seed(corners: &TagCorners2d, stamp: Timestamp, bank: CornerFilterBank) -> Self {
        Self {
            first_observation: stamp,
            last_observation: stamp,
            latest: *corners,
            filtered: *corners,
            bank,
        }
    }
}

/// Tracked state of one fiducial tag id.
///
/// Not internally synchronized: `update` takes `&mut self`, so one update
/// loop owns a hypothesis at a time. Hypotheses for different ids share
/// nothing but the read-only camera.
#[derive(Debug)]
pub struct TagHypothesis<'a, C: CameraModel + ?Sized = PinholeCamera> {
    id: i32,
    params: TagHypothesisParams,
    camera: &'a C,
    track: Option<Track>,
}

impl<'a, C: CameraModel + ?Sized> TagHypothesis<'a, C> {
    /// Hypothesis with default parameters.
    pub fn new(id: i32, camera: &'a C) -> Self {
        Self {
            id,
            params: TagHypothesisParams::default(),
            camera,
            track: None,
        }
    }

    /// Hypothesis with validated parameters.
    pub fn with_params(
        id: i32,
        camera: &'a C,
        params: TagHypothesisParams,
    ) -> Result<Self, TagError> {
        params.validate()?;
        Ok(Self {
            id,
            params,
            camera,
            track: None,
        })
    }

    /// Fuse a detection of this tag.
    ///
    /// Returns `Ok(true)` when the detection continues the current hypothesis
    /// (or starts the first one) and `Ok(false)` when its centroid jumped more
    /// than `new_hypothesis_threshold` away from the filtered corners. In that
    /// case the filters are re-seeded from the raw detection and the tracking
    /// time restarts.
    ///
    /// Corners with NaN or infinite coordinates are rejected with
    /// [`TagError::NonFiniteCorner`]. On `Err` the hypothesis is left exactly
    /// as it was.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, corners), fields(id = self.id, t = stamp.as_secs()))
    )]
    pub fn update(&mut self, corners: &TagCorners2d, stamp: Timestamp) -> Result<bool, TagError> {
        if let Some(index) = corners
            .iter()
            .position(|c| !(c.x.is_finite() && c.y.is_finite()))
        {
            return Err(TagError::NonFiniteCorner { index });
        }

        let model = self.params.dynamics_model;
        let noise = self.params.noise();

        match self.track.as_mut() {
            None => {
                let bank = CornerFilterBank::init(model, corners, &noise)?;
                self.track = Some(Track::seed(corners, stamp, bank));
                debug!("tag {}: hypothesis started at t={:.3}s", self.id, stamp.as_secs());
                Ok(true)
            }
            Some(track) => {
                let jump = (center_2d(&track.filtered) - center_2d(corners)).norm();
                if jump > self.params.new_hypothesis_threshold {
                    let bank = CornerFilterBank::init(model, corners, &noise)?;
                    *track = Track::seed(corners, stamp, bank);
                    debug!(
                        "tag {}: centroid jumped {:.1}px (> {:.1}px), hypothesis restarted",
                        self.id, jump, self.params.new_hypothesis_threshold
                    );
                    return Ok(false);
                }

                let dt = stamp - track.last_observation;
                track.filtered = track.bank.predict_and_correct(corners, dt)?;
                track.latest = *corners;
                track.last_observation = stamp;
                Ok(true)
            }
        }
    }

    /// Liveness probe: `true` while the last observation is less than
    /// `max_no_observation_time` seconds before `stamp`.
    ///
    /// Never mutates. A hypothesis that was never observed is not alive.
    pub fn is_alive(&self, stamp: Timestamp) -> bool {
        self.track.as_ref().is_some_and(|track| {
            stamp - track.last_observation < self.params.max_no_observation_time
        })
    }

    /// Whether the filtered corners are stable enough for calibration.
    pub fn converged(&self) -> bool {
        self.convergence_report().is_converged()
    }

    pub fn convergence_report(&self) -> ConvergenceReport {
        match &self.track {
            None => ConvergenceReport::NOT_OBSERVED,
            Some(track) => convergence::evaluate(
                &track.bank,
                track.last_observation - track.first_observation,
                &self.params,
            ),
        }
    }

    #[inline]
    pub fn id(&self) -> i32 {
        self.id
    }

    #[inline]
    pub fn params(&self) -> &TagHypothesisParams {
        &self.params
    }

    #[inline]
    pub fn dynamics_model(&self) -> DynamicsModel {
        self.params.dynamics_model
    }

    /// Whether at least one detection has been fused.
    #[inline]
    pub fn is_observed(&self) -> bool {
        self.track.is_some()
    }

    pub fn first_observation_timestamp(&self) -> Option<Timestamp> {
        self.track.as_ref().map(|t| t.first_observation)
    }

    pub fn last_observation_timestamp(&self) -> Option<Timestamp> {
        self.track.as_ref().map(|t| t.last_observation)
    }

    pub fn filter_bank(&self) -> Option<&CornerFilterBank> {
        self.track.as_ref().map(|t| &t.bank)
    }

    pub fn latest_corners(&self) -> Option<&TagCorners2d> {
        self.track.as_ref().map(|t| &t.latest)
    }

    pub fn filtered_corners(&self) -> Option<&TagCorners2d> {
        self.track.as_ref().map(|t| &t.filtered)
    }

    pub fn latest_center_2d(&self) -> Option<Point2<f64>> {
        self.latest_corners().map(center_2d)
    }

    pub fn filtered_center_2d(&self) -> Option<Point2<f64>> {
        self.filtered_corners().map(center_2d)
    }

    /// Camera-frame corners reconstructed from the latest raw detection.
    pub fn latest_points_3d(&self) -> Result<TagCorners3d, TagError> {
        let corners = self.latest_corners().ok_or(TagError::NotObserved)?;
        self.reconstructor().points_3d(corners)
    }

    /// Camera-frame corners reconstructed from the filtered corners.
    pub fn filtered_points_3d(&self) -> Result<TagCorners3d, TagError> {
        let corners = self.filtered_corners().ok_or(TagError::NotObserved)?;
        self.reconstructor().points_3d(corners)
    }

    pub fn latest_center_3d(&self) -> Result<Point3<f64>, TagError> {
        Ok(center_3d(&self.latest_points_3d()?))
    }

    pub fn filtered_center_3d(&self) -> Result<Point3<f64>, TagError> {
        Ok(center_3d(&self.filtered_points_3d()?))
    }

    /// Pose of the tag in the camera frame, from the filtered corners.
    pub fn filtered_pose(&self) -> Result<PlanarPose, TagError> {
        let corners = self.filtered_corners().ok_or(TagError::NotObserved)?;
        self.reconstructor().pose(corners)
    }

    /// Reconstruct arbitrary image corners with this hypothesis' camera and tag size.
    pub fn points_3d(&self, image_points: &TagCorners2d) -> Result<TagCorners3d, TagError> {
        self.reconstructor().points_3d(image_points)
    }

    pub fn snapshot(&self) -> TagHypothesisSnapshot {
        let track = self.track.as_ref();
        TagHypothesisSnapshot {
            id: self.id,
            params: self.params.clone(),
            first_observation: track.map(|t| t.first_observation),
            last_observation: track.map(|t| t.last_observation),
            latest_corners: track.map(|t| t.latest),
            filtered_corners: track.map(|t| t.filtered),
            corner_sigmas: track.map(|t| t.bank.position_sigmas()),
            convergence: self.convergence_report(),
        }
    }

    fn reconstructor(&self) -> PoseReconstructor<'a, C> {
        PoseReconstructor::new(self.camera, self.params.tag_size)
    }

    // Setters. Values are validated like `with_params`; a rejected value
    // leaves the parameters untouched. Noise and dynamics changes take
    // effect the next time the filters are seeded.

    pub fn set_dynamics_model(&mut self, model: DynamicsModel) {
        self.params.dynamics_model = model;
    }

    pub fn set_tag_size(&mut self, size: f64) -> Result<(), ParamsError> {
        self.adjust(|p| p.tag_size = size)
    }

    pub fn set_min_convergence_time(&mut self, seconds: f64) -> Result<(), ParamsError> {
        self.adjust(|p| p.min_convergence_time = seconds)
    }

    pub fn set_convergence_translation_threshold(
        &mut self,
        sigma: f64,
    ) -> Result<(), ParamsError> {
        self.adjust(|p| p.convergence_translation_threshold = sigma)
    }

    pub fn set_new_hypothesis_threshold(&mut self, max_jump: f64) -> Result<(), ParamsError> {
        self.adjust(|p| p.new_hypothesis_threshold = max_jump)
    }

    pub fn set_max_no_observation_time(&mut self, seconds: f64) -> Result<(), ParamsError> {
        self.adjust(|p| p.max_no_observation_time = seconds)
    }

    pub fn set_measurement_noise(&mut self, std_dev: f64) -> Result<(), ParamsError> {
        self.adjust(|p| p.measurement_noise = std_dev)
    }

    pub fn set_process_noise(&mut self, std_dev: f64) -> Result<(), ParamsError> {
        self.adjust(|p| p.process_noise = std_dev)
    }

    fn adjust(&mut self, edit: impl FnOnce(&mut TagHypothesisParams)) -> Result<(), ParamsError> {
        let mut next = self.params.clone();
        edit(&mut next);
        next.validate()?;
        self.params = next;
        Ok(())
    }
}
