//! Core data types for geographic locations, analysis requests, and block output.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Where a location came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    Gps,
    Agent,
    Aoi,
    AgentEstimated,
    #[default]
    Manual,
}

impl LocationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationSource::Gps => "gps",
            LocationSource::Agent => "agent",
            LocationSource::Aoi => "aoi",
            LocationSource::AgentEstimated => "agent_estimated",
            LocationSource::Manual => "manual",
        }
    }
}

impl std::fmt::Display for LocationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A geographic position with provenance.
///
/// Values are never mutated after construction; derived locations are built
/// as new instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeographicLocation {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    /// Accuracy radius in meters. Smaller is more precise.
    pub accuracy: Option<f64>,
    /// Hand-written overrides may omit this; they count as `manual`.
    #[serde(default)]
    pub source: LocationSource,
    #[serde(default)]
    pub aoi_id: Option<i64>,
    #[serde(default)]
    pub aoi_name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    /// RFC 3339 timestamp of when the location was recorded.
    #[serde(default = "now_rfc3339")]
    pub timestamp: String,
}

impl GeographicLocation {
    /// Create a location at the given coordinate, stamped with the current time.
    pub fn new(latitude: f64, longitude: f64, source: LocationSource) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            altitude: None,
            accuracy: None,
            source,
            aoi_id: None,
            aoi_name: None,
            address: None,
            timestamp: now_rfc3339(),
        }
    }

    pub fn with_altitude(mut self, altitude: Option<f64>) -> Self {
        self.altitude = altitude;
        self
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn with_aoi(mut self, aoi_id: Option<i64>, aoi_name: Option<String>) -> Self {
        self.aoi_id = aoi_id;
        self.aoi_name = aoi_name;
        self
    }

    /// Both coordinates, if present.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }

    /// `(lat, lng)` with six decimals, or `None` when either coordinate is missing.
    pub fn format_coordinates(&self) -> Option<String> {
        self.coordinates()
            .map(|(lat, lng)| format!("({lat:.6}, {lng:.6})"))
    }
}

/// A GPS fix read from image metadata.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
}

/// Agent position as recorded in the status store under `position`.
///
/// A malformed sub-object reads as absent without discarding the other one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentPosition {
    #[serde(default, deserialize_with = "lenient")]
    pub aoi_position: Option<AoiPosition>,
    #[serde(default, deserialize_with = "lenient")]
    pub xy_position: Option<XyPosition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AoiPosition {
    #[serde(default)]
    pub aoi_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XyPosition {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

/// Details about an area of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AoiInfo {
    pub id: i64,
    pub name: Option<String>,
    pub center_lat: Option<f64>,
    pub center_lng: Option<f64>,
}

impl AoiInfo {
    /// Name, falling back to `AOI_<id>`.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("AOI_{}", self.id))
    }
}

/// A single analysis request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Free-text intention, possibly naming the image to look at.
    pub intention: String,
    /// Display string for the agent's current position.
    #[serde(default)]
    pub current_position: String,
    /// Explicit image path; takes precedence over the intention text.
    #[serde(default)]
    pub image_path: Option<String>,
    /// Location to attribute to the image when it carries no GPS tags.
    #[serde(default)]
    pub manual_location: Option<GeographicLocation>,
}

impl AnalysisRequest {
    pub fn new(intention: impl Into<String>) -> Self {
        Self {
            intention: intention.into(),
            ..Default::default()
        }
    }

    pub fn with_position(mut self, position: impl Into<String>) -> Self {
        self.current_position = position.into();
        self
    }

    pub fn with_image_path(mut self, path: impl Into<String>) -> Self {
        self.image_path = Some(path.into());
        self
    }

    pub fn with_manual_location(mut self, location: GeographicLocation) -> Self {
        self.manual_location = Some(location);
        self
    }
}

/// Result of one `forward` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionBlockOutput {
    pub success: bool,
    pub evaluation: String,
    /// Estimated elapsed simulation time in minutes.
    pub consumed_time: u32,
    pub node_id: Option<String>,
    pub image_path: String,
    pub image_description: String,
    pub objects_detected: Vec<String>,
    pub scene_type: String,
    pub geographic_location: Option<GeographicLocation>,
    pub spatial_context: String,
    pub visual_memory_id: Option<String>,
    pub location_relevance: String,
}

/// Errors that can occur in the geo-vision pipeline.
#[derive(thiserror::Error, Debug)]
pub enum VisionError {
    #[error("No image path found in intention or status")]
    MissingImagePath,

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Image load error: {0}")]
    ImageLoad(String),

    #[error("Model invocation error: {0}")]
    ModelInvocation(String),

    #[error("Response parse error: {0}")]
    ResponseParse(String),

    #[error("Location lookup error: {0}")]
    LocationLookup(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<image::ImageError> for VisionError {
    fn from(e: image::ImageError) -> Self {
        VisionError::ImageLoad(e.to_string())
    }
}

/// Convenience result type.
pub type VisionResult<T> = Result<T, VisionError>;

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| {
        serde_json::from_value(v)
            .map_err(|e| tracing::warn!("Ignoring malformed position entry: {e}"))
            .ok()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_serializes_snake_case() {
        let json = serde_json::to_string(&LocationSource::AgentEstimated).unwrap();
        assert_eq!(json, "\"agent_estimated\"");
        assert_eq!(LocationSource::Gps.to_string(), "gps");
    }

    #[test]
    fn test_format_coordinates_requires_both() {
        let loc = GeographicLocation::new(25.033, 121.5654, LocationSource::Gps);
        assert_eq!(loc.format_coordinates().as_deref(), Some("(25.033000, 121.565400)"));

        let partial = GeographicLocation {
            longitude: None,
            ..loc
        };
        assert!(partial.format_coordinates().is_none());
    }

    #[test]
    fn test_zero_coordinates_are_present() {
        let loc = GeographicLocation::new(0.0, 0.0, LocationSource::Manual);
        assert_eq!(loc.coordinates(), Some((0.0, 0.0)));
    }

    #[test]
    fn test_agent_position_deserializes_partial() {
        let pos: AgentPosition =
            serde_json::from_value(serde_json::json!({ "aoi_position": { "aoi_id": 7 } })).unwrap();
        assert_eq!(pos.aoi_position.unwrap().aoi_id, Some(7));
        assert!(pos.xy_position.is_none());
    }

    #[test]
    fn test_agent_position_keeps_xy_when_aoi_is_broken() {
        let pos: AgentPosition = serde_json::from_value(serde_json::json!({
            "aoi_position": { "aoi_id": null },
            "xy_position": { "x": 250.0, "y": 500.0 }
        }))
        .unwrap();
        assert_eq!(pos.aoi_position.unwrap().aoi_id, None);
        assert_eq!(pos.xy_position.unwrap().x, Some(250.0));

        let pos: AgentPosition = serde_json::from_value(serde_json::json!({
            "aoi_position": { "aoi_id": "forty-two" },
            "xy_position": { "x": 1.0, "y": 2.0 }
        }))
        .unwrap();
        assert!(pos.aoi_position.is_none());
        assert_eq!(pos.xy_position.unwrap().y, Some(2.0));
    }

    #[test]
    fn test_location_from_bare_coordinates() {
        let loc: GeographicLocation =
            serde_json::from_value(serde_json::json!({ "latitude": 25.033, "longitude": 121.5654 })).unwrap();
        assert_eq!(loc.source, LocationSource::Manual);
        assert_eq!(loc.coordinates(), Some((25.033, 121.5654)));
        assert!(chrono::DateTime::parse_from_rfc3339(&loc.timestamp).is_ok());
    }
}
