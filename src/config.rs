use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::editor::EditorLimits;
use crate::error::ConfigError;
use crate::geometry::ScaleParams;

pub const SERVER_URL_ENV: &str = "ANNOTATOR_SERVER_URL";

/// Runtime settings. Every field is optional in the JSON file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotatorConfig {
    /// Base URL of the upload / predict / save service.
    pub server_url: String,
    pub request_timeout_secs: u64,
    pub reserved_width: f32,
    pub reserved_height: f32,
    pub max_scale: f32,
    /// Smallest box kept after drawing or resizing, in image pixels.
    pub min_box_size: f32,
    /// Edge length of the resize handles, in screen points.
    pub handle_size: f32,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            request_timeout_secs: 30,
            reserved_width: 500.0,
            reserved_height: 300.0,
            max_scale: 0.85,
            min_box_size: 5.0,
            handle_size: 8.0,
        }
    }
}

impl AnnotatorConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        let config = Self::from_json(&data)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Applies `ANNOTATOR_SERVER_URL` when it is set and non-empty.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            if !url.trim().is_empty() {
                self.server_url = url;
            }
        }
    }

    pub fn scale_params(&self) -> ScaleParams {
        ScaleParams {
            reserved_width: self.reserved_width,
            reserved_height: self.reserved_height,
            max_scale: self.max_scale,
        }
    }

    pub fn editor_limits(&self) -> EditorLimits {
        EditorLimits {
            min_box_size: self.min_box_size,
        }
    }
}
