use serde::{Deserialize, Serialize};

use crate::filter::FilterNoise;

/// Motion model used by the per-corner filters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicsModel {
    /// The tag does not move; corners are filtered as constant positions.
    #[default]
    Static,
    /// Position + velocity state. Declared but not supported: initializing a
    /// filter bank with it fails with [`crate::FilterError::UnsupportedDynamics`].
    ConstantVelocity,
}

/// Tuning of a [`crate::TagHypothesis`].
///
/// Pixel quantities refer to the image the corners were detected in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagHypothesisParams {
    pub dynamics_model: DynamicsModel,
    /// Side length of the square tag, in metres. Scales the PnP template.
    pub tag_size: f64,
    /// Seconds a hypothesis must be tracked before it may be reported as converged.
    pub min_convergence_time: f64,
    /// Largest accepted per-corner 1-sigma positional uncertainty, in pixels.
    pub convergence_translation_threshold: f64,
    /// Centroid jump, in pixels, above which an observation restarts the hypothesis.
    pub new_hypothesis_threshold: f64,
    /// Seconds without observations after which the hypothesis is stale.
    pub max_no_observation_time: f64,
    /// Corner measurement standard deviation, in pixels.
    pub measurement_noise: f64,
    /// Corner process standard deviation per step, in pixels.
    pub process_noise: f64,
}

impl Default for TagHypothesisParams {
    fn default() -> Self {
        Self {
            dynamics_model: DynamicsModel::Static,
            tag_size: 0.2,
            min_convergence_time: 1.0,
            convergence_translation_threshold: 0.6,
            new_hypothesis_threshold: 50.0,
            max_no_observation_time: 2.0,
            measurement_noise: 2.0,
            process_noise: 0.1,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParamsError {
    #[error("tag_size must be finite and > 0, got {0}")]
    InvalidTagSize(f64),
    #[error("{name} must be finite and >= 0, got {value}")]
    Negative { name: &'static str, value: f64 },
}

impl TagHypothesisParams {
    /// Reject values no tracker can work with.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if !self.tag_size.is_finite() || self.tag_size <= 0.0 {
            return Err(ParamsError::InvalidTagSize(self.tag_size));
        }
        let non_negative = [
            ("min_convergence_time", self.min_convergence_time),
            (
                "convergence_translation_threshold",
                self.convergence_translation_threshold,
            ),
            ("new_hypothesis_threshold", self.new_hypothesis_threshold),
            ("max_no_observation_time", self.max_no_observation_time),
            ("measurement_noise", self.measurement_noise),
            ("process_noise", self.process_noise),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ParamsError::Negative { name, value });
            }
        }
        Ok(())
    }

    pub fn noise(&self) -> FilterNoise {
        FilterNoise {
            measurement: self.measurement_noise,
            process: self.process_noise,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        TagHypothesisParams::default()
            .validate()
            .expect("defaults validate");
    }

    #[test]
    fn validation_names_the_offending_field() {
        let params = TagHypothesisParams {
            process_noise: -0.5,
            ..TagHypothesisParams::default()
        };
        let err = params.validate().unwrap_err();
        assert_eq!(
            err,
            ParamsError::Negative {
                name: "process_noise",
                value: -0.5
            }
        );
        assert_eq!(err.to_string(), "process_noise must be finite and >= 0, got -0.5");

        let params = TagHypothesisParams {
            tag_size: 0.0,
            ..TagHypothesisParams::default()
        };
        assert_eq!(params.validate(), Err(ParamsError::InvalidTagSize(0.0)));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let params: TagHypothesisParams =
            serde_json::from_str(r#"{ "tag_size": 0.16, "dynamics_model": "constant_velocity" }"#)
                .expect("parse");
        assert_eq!(params.tag_size, 0.16);
        assert_eq!(params.dynamics_model, DynamicsModel::ConstantVelocity);
        assert_eq!(params.new_hypothesis_threshold, 50.0);
    }
}
