//! JSON configuration helpers.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use tag_tracker_core::PinholeCamera;

use crate::params::{ParamsError, TagHypothesisParams};

#[derive(thiserror::Error, Debug)]
pub enum TagIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] ParamsError),
}

impl TagHypothesisParams {
    /// Load and validate parameters from a JSON file. Missing keys take defaults.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, TagIoError> {
        let raw = fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&raw)?;
        params.validate()?;
        Ok(params)
    }

    /// Write these parameters to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), TagIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Camera plus hypothesis parameters, as read by tracking tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagTrackerConfig {
    pub camera: PinholeCamera,
    #[serde(default)]
    pub hypothesis: TagHypothesisParams,
}

impl TagTrackerConfig {
    /// Load a JSON config from disk and validate the hypothesis parameters.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, TagIoError> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&raw)?;
        cfg.hypothesis.validate()?;
        Ok(cfg)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), TagIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
