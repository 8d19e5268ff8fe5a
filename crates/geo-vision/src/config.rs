//! Block configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::capture::DEFAULT_JPEG_QUALITY;
use crate::types::VisionResult;

/// Tunables for [`GeoVisionBlock`](crate::GeoVisionBlock). Every field has a default,
/// so a config file only needs the keys it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoVisionConfig {
    pub max_image_width: u32,
    pub max_image_height: u32,
    pub jpeg_quality: u8,
    /// Image/agent distance (m) still considered consistent.
    pub location_accuracy_threshold: f64,
    /// Image/agent distance (m) still considered possibly consistent.
    pub possible_consistency_threshold: f64,
    pub nearby_radius_m: f64,
    pub nearby_limit: usize,
    pub recent_memory_limit: usize,
    pub cognition_confidence_threshold: f64,
    pub memory_topic: String,
    pub success_consumed_time: u32,
    pub failure_consumed_time: u32,
}

impl Default for GeoVisionConfig {
    fn default() -> Self {
        Self {
            max_image_width: 1024,
            max_image_height: 1024,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            location_accuracy_threshold: 100.0,
            possible_consistency_threshold: 500.0,
            nearby_radius_m: 500.0,
            nearby_limit: 5,
            recent_memory_limit: 15,
            cognition_confidence_threshold: 0.7,
            memory_topic: "geo_vision".to_string(),
            success_consumed_time: 45,
            failure_consumed_time: 10,
        }
    }
}

impl GeoVisionConfig {
    /// Read a JSON config file.
    pub fn read_from_file(path: &Path) -> VisionResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
