//! Collaborator interfaces the block depends on.
//!
//! The status store and memory stream are required. Map capabilities and the
//! cognition hook are optional and injected on the block when available.

use async_trait::async_trait;
use serde_json::Value;

use crate::prompt::{ChatMessage, ResponseFormat};
use crate::types::{AoiInfo, VisionResult};

/// Per-agent key/value status map.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Read a key. `Ok(None)` when the key is unset.
    async fn get(&self, key: &str) -> VisionResult<Option<Value>>;

    /// Overwrite a key.
    async fn update(&self, key: &str, value: Value) -> VisionResult<()>;
}

/// Append-only episodic memory.
#[async_trait]
pub trait MemoryStream: Send + Sync {
    /// Append a record under `topic`, returning the new node id.
    async fn add(&self, topic: &str, description: &str) -> VisionResult<String>;
}

/// Vision-capable chat completion endpoint.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Send a dialog and return the raw reply text.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        response_format: ResponseFormat,
    ) -> VisionResult<String>;

    fn supports_vision(&self) -> bool {
        true
    }
}

/// AOI detail lookup.
#[async_trait]
pub trait AoiService: Send + Sync {
    async fn get_aoi_info(&self, aoi_id: i64) -> VisionResult<Option<AoiInfo>>;
}

/// Spatial query for AOIs around a coordinate.
#[async_trait]
pub trait NearbyAoiQuery: Send + Sync {
    async fn query_nearby_aois(&self, lat: f64, lng: f64, radius_m: f64) -> VisionResult<Vec<AoiInfo>>;
}

/// Projection from the simulation's local XY plane to latitude/longitude.
pub trait CoordinateProjector: Send + Sync {
    fn xy_to_latlng(&self, x: f64, y: f64) -> VisionResult<(f64, f64)>;
}

/// Higher-level cognition sink for one-line situational thoughts.
#[async_trait]
pub trait CognitionHook: Send + Sync {
    async fn save_thought(&self, thought: &str) -> VisionResult<()>;
}
