//! GeoVision CLI: wires an HTTP vision model, an agent state file, and an AOI
//! catalog around the geo-vision block.

pub mod analyze;
pub mod config;
pub mod model;

pub use analyze::{run_analyze, AnalyzeOptions};
pub use config::{load_config, resolve_config_path, EndpointSettings};
pub use model::HttpVisionModel;
