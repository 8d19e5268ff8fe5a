//! The `analyze` command: one `forward` against an agent state file.

use std::path::PathBuf;
use std::sync::Arc;

use geo_vision::{
    AgentState, AnalysisRequest, AoiCatalog, GeoVisionBlock, GeoVisionConfig, GeographicLocation, LocalProjector,
    LocationSource, VisionBlockOutput, VisionModel,
};

/// Inputs of one analysis run.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    pub intention: String,
    pub image: Option<String>,
    pub position: Option<String>,
    pub manual: Option<(f64, f64)>,
    /// Agent state file; read before and written after the run.
    pub state: Option<PathBuf>,
    /// AOI catalog (JSON array) used for AOI lookups and nearby queries.
    pub aois: Option<PathBuf>,
    /// Origin of the agent's local XY plane.
    pub origin: Option<(f64, f64)>,
}

pub async fn run_analyze(
    options: AnalyzeOptions,
    config: GeoVisionConfig,
    model: Arc<dyn VisionModel>,
) -> anyhow::Result<VisionBlockOutput> {
    let state = match &options.state {
        Some(path) => AgentState::read_from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to read agent state {}: {e}", path.display()))?,
        None => AgentState::default(),
    };
    let (status, stream) = state.into_stores();
    let status = Arc::new(status);
    let stream = Arc::new(stream);

    let mut block = GeoVisionBlock::new(status.clone(), stream.clone(), model)
        .with_config(config)
        .with_cognition(stream.clone());

    if let Some(path) = &options.aois {
        let catalog = AoiCatalog::read_from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to read AOI catalog {}: {e}", path.display()))?;
        let catalog = Arc::new(catalog);
        block = block.with_aoi_service(catalog.clone()).with_nearby_query(catalog);
    }
    if let Some((lat, lng)) = options.origin {
        block = block.with_projector(Arc::new(LocalProjector::new(lat, lng)));
    }

    let mut request = AnalysisRequest::new(options.intention);
    if let Some(image) = options.image {
        request = request.with_image_path(image);
    }
    if let Some(position) = options.position {
        request = request.with_position(position);
    }
    if let Some((lat, lng)) = options.manual {
        request = request.with_manual_location(GeographicLocation::new(lat, lng, LocationSource::Manual));
    }

    block.before_forward().await;
    let output = block.forward(&request).await;

    if let Some(path) = &options.state {
        AgentState::capture(&status, &stream)
            .await
            .write_to_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to write agent state {}: {e}", path.display()))?;
        tracing::info!("Agent state saved to {}", path.display());
    }

    Ok(output)
}
