//! Per-corner Kalman filtering.
//!
//! Each of the four tag corners gets its own independent linear Kalman
//! filter. With [`DynamicsModel::Static`] the state is the 2D corner position,
//! transition and measurement matrices are identity, and the filter reduces to
//! recursive averaging whose posterior covariance tells how well the corner
//! is pinned down.

use log::trace;
use nalgebra::{Matrix2, Point2, Vector2};
use serde::{Deserialize, Serialize};

use tag_tracker_core::{TagCorners2d, TAG_CORNER_COUNT};

use crate::params::DynamicsModel;

/// Noise standard deviations, squared into covariances on initialization.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterNoise {
    pub measurement: f64,
    pub process: f64,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("dynamics model {0:?} is not supported")]
    UnsupportedDynamics(DynamicsModel),
    #[error("innovation covariance of corner {corner} is singular")]
    SingularInnovation { corner: usize },
}

/// Linear Kalman filter over one corner position.
#[derive(Clone, Debug, PartialEq)]
pub struct CornerFilter {
    state: Vector2<f64>,
    covariance: Matrix2<f64>,
    transition: Matrix2<f64>,
    measurement: Matrix2<f64>,
    process_noise: Matrix2<f64>,
    measurement_noise: Matrix2<f64>,
}

impl CornerFilter {
    /// Static-model filter seeded at `corner` with unit posterior covariance.
    pub fn new(corner: &Point2<f64>, noise: &FilterNoise) -> Self {
        Self {
            state: corner.coords,
            covariance: Matrix2::identity(),
            transition: Matrix2::identity(),
            measurement: Matrix2::identity(),
            process_noise: Matrix2::from_diagonal_element(noise.process * noise.process),
            measurement_noise: Matrix2::from_diagonal_element(
                noise.measurement * noise.measurement,
            ),
        }
    }

    pub fn predict(&mut self) {
        self.state = self.transition * self.state;
        self.covariance =
            self.transition * self.covariance * self.transition.transpose() + self.process_noise;
    }

    /// Fuse a measurement. Returns `None` (leaving the filter untouched) when
    /// the innovation covariance cannot be inverted.
    pub fn correct(&mut self, z: &Point2<f64>) -> Option<Point2<f64>> {
        let h = self.measurement;
        let s = h * self.covariance * h.transpose() + self.measurement_noise;
        let gain = self.covariance * h.transpose() * s.try_inverse()?;

        let innovation = z.coords - h * self.state;
        self.state += gain * innovation;
        self.covariance = (Matrix2::identity() - gain * h) * self.covariance;
        Some(self.position())
    }

    #[inline]
    pub fn position(&self) -> Point2<f64> {
        Point2::from(self.state)
    }

    #[inline]
    pub fn covariance(&self) -> &Matrix2<f64> {
        &self.covariance
    }

    /// 1-sigma positional uncertainty along the worse of the two axes.
    pub fn position_sigma(&self) -> f64 {
        self.covariance[(0, 0)].max(self.covariance[(1, 1)]).sqrt()
    }
}

/// The four corner filters of one tag, always initialized together.
#[derive(Clone, Debug, PartialEq)]
pub struct CornerFilterBank {
    model: DynamicsModel,
    filters: [CornerFilter; TAG_CORNER_COUNT],
}

impl CornerFilterBank {
    /// Seed one filter per corner at the observed position.
    pub fn init(
        model: DynamicsModel,
        corners: &TagCorners2d,
        noise: &FilterNoise,
    ) -> Result<Self, FilterError> {
        match model {
            DynamicsModel::Static => Ok(Self {
                model,
                filters: std::array::from_fn(|i| CornerFilter::new(&corners[i], noise)),
            }),
            DynamicsModel::ConstantVelocity => Err(FilterError::UnsupportedDynamics(model)),
        }
    }

    /// Predict and correct every corner with the new observation.
    ///
    /// `dt` is the time since the previous observation; the static model does
    /// not use it. On error no filter is modified.
    pub fn predict_and_correct(
        &mut self,
        corners: &TagCorners2d,
        dt: f64,
    ) -> Result<TagCorners2d, FilterError> {
        if self.model != DynamicsModel::Static {
            return Err(FilterError::UnsupportedDynamics(self.model));
        }

        let mut next = self.filters.clone();
        let mut out = *corners;
        for (corner, (filter, z)) in next.iter_mut().zip(corners.iter()).enumerate() {
            filter.predict();
            out[corner] = filter
                .correct(z)
                .ok_or(FilterError::SingularInnovation { corner })?;
        }
        trace!(
            "corner filters updated (dt={dt:.4}s, max sigma={:.4}px)",
            max_sigma(&next)
        );

        self.filters = next;
        Ok(out)
    }

    #[inline]
    pub fn model(&self) -> DynamicsModel {
        self.model
    }

    #[inline]
    pub fn filters(&self) -> &[CornerFilter; TAG_CORNER_COUNT] {
        &self.filters
    }

    pub fn position_sigmas(&self) -> [f64; TAG_CORNER_COUNT] {
        self.filters.each_ref().map(CornerFilter::position_sigma)
    }

    pub fn max_position_sigma(&self) -> f64 {
        max_sigma(&self.filters)
    }
}

fn max_sigma(filters: &[CornerFilter]) -> f64 {
    filters
        .iter()
        .map(CornerFilter::position_sigma)
        .fold(0.0, f64::max)
}
