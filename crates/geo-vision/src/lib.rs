//! GeoVision: geographic vision perception for simulated agents. Covers EXIF GPS,
//! agent location resolution, location fusion, and vision-model scene analysis.

pub mod analysis;
pub mod block;
pub mod capture;
pub mod config;
pub mod context;
pub mod distance;
pub mod gps;
pub mod location;
pub mod map;
pub mod memory;
pub mod path;
pub mod prompt;
pub mod services;
pub mod store;
pub mod types;

pub use analysis::{repair_json, SceneAnalysis};
pub use block::GeoVisionBlock;
pub use capture::{is_supported_format, load_for_transport, validate_image_path, EncodedImage, SUPPORTED_EXTENSIONS};
pub use config::GeoVisionConfig;
pub use context::{build_geographic_context, GeographicContext};
pub use distance::{haversine_distance, LocationConsistency, EARTH_RADIUS_M};
pub use gps::extract_gps;
pub use location::{fuse_locations, resolve_agent_location};
pub use map::{AoiCatalog, LocalProjector};
pub use memory::{nearby_memories, NearbyMemory, VisionMemoryEntry};
pub use path::extract_image_path;
pub use prompt::{ChatMessage, PromptTemplate, ResponseFormat, GEO_VISION_ANALYSIS_PROMPT};
pub use services::{AoiService, CognitionHook, CoordinateProjector, MemoryStream, NearbyAoiQuery, StatusStore, VisionModel};
pub use store::{AgentState, InMemoryMemoryStream, InMemoryStatusStore, MemoryNode};
pub use types::*;
