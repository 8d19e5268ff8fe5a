//! The geo-vision block: resolves an image, fuses its location, asks the
//! vision model about it, and records the result.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::analysis::{SceneAnalysis, DEFAULT_DESCRIPTION};
use crate::capture::{load_for_transport, validate_image_path, EncodedImage};
use crate::config::GeoVisionConfig;
use crate::context::{build_geographic_context, GeographicContext, UNKNOWN};
use crate::gps::extract_gps;
use crate::location::{fuse_locations, resolve_agent_location};
use crate::memory::{
    format_memory_record, nearby_memories, push_recent, record_observation, NearbyMemory, SpatialKnowledge,
    VisionMemoryEntry,
};
use crate::path::extract_image_path;
use crate::prompt::{ChatMessage, PromptTemplate, ResponseFormat};
use crate::services::{
    AoiService, CognitionHook, CoordinateProjector, MemoryStream, NearbyAoiQuery, StatusStore, VisionModel,
};
use crate::types::{
    now_rfc3339, AgentPosition, AnalysisRequest, GeographicLocation, VisionBlockOutput, VisionError, VisionResult,
};

/// Status keys read and written by the block.
pub mod keys {
    pub const CURRENT_IMAGE_PATH: &str = "current_image_path";
    pub const POSITION: &str = "position";
    pub const EMOTION_TYPES: &str = "emotion_types";
    pub const MANUAL_IMAGE_LOCATION: &str = "manual_image_location";
    pub const LAST_ANALYZED_IMAGE: &str = "last_analyzed_image";
    pub const LAST_SCENE_TYPE: &str = "last_scene_type";
    pub const LAST_IMAGE_LOCATION: &str = "last_image_location";
    pub const GEO_VISUAL_MEMORIES: &str = "geo_visual_memories";
    pub const SPATIAL_KNOWLEDGE: &str = "spatial_knowledge";
}

/// Path reported when a failed request named no image at all.
pub const UNKNOWN_IMAGE: &str = "unknown_image";
const FAILED_SCENE_TYPE: &str = "unknown";
const FAILED_SPATIAL_CONTEXT: &str = "no geographic context";
const FAILED_LOCATION_RELEVANCE: &str = "could not assess location relevance";

const EVALUATION_SNIPPET_CHARS: usize = 50;
const ERROR_SNIPPET_CHARS: usize = 30;

/// Geographic vision perception block for one agent.
pub struct GeoVisionBlock {
    status: Arc<dyn StatusStore>,
    memory: Arc<dyn MemoryStream>,
    model: Arc<dyn VisionModel>,
    aoi_service: Option<Arc<dyn AoiService>>,
    nearby: Option<Arc<dyn NearbyAoiQuery>>,
    projector: Option<Arc<dyn CoordinateProjector>>,
    cognition: Option<Arc<dyn CognitionHook>>,
    config: GeoVisionConfig,
    prompt: PromptTemplate,
}

impl GeoVisionBlock {
    pub fn new(status: Arc<dyn StatusStore>, memory: Arc<dyn MemoryStream>, model: Arc<dyn VisionModel>) -> Self {
        Self {
            status,
            memory,
            model,
            aoi_service: None,
            nearby: None,
            projector: None,
            cognition: None,
            config: GeoVisionConfig::default(),
            prompt: PromptTemplate::default(),
        }
    }

    pub fn with_aoi_service(mut self, service: Arc<dyn AoiService>) -> Self {
        self.aoi_service = Some(service);
        self
    }

    pub fn with_nearby_query(mut self, query: Arc<dyn NearbyAoiQuery>) -> Self {
        self.nearby = Some(query);
        self
    }

    pub fn with_projector(mut self, projector: Arc<dyn CoordinateProjector>) -> Self {
        self.projector = Some(projector);
        self
    }

    pub fn with_cognition(mut self, hook: Arc<dyn CognitionHook>) -> Self {
        self.cognition = Some(hook);
        self
    }

    pub fn with_config(mut self, config: GeoVisionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn config(&self) -> &GeoVisionConfig {
        &self.config
    }

    /// Pre-flight checks before the first `forward`.
    pub async fn before_forward(&self) {
        if !self.model.supports_vision() {
            tracing::warn!("Configured model does not report vision support; image analysis may fail");
        }

        match self.status.get(keys::GEO_VISUAL_MEMORIES).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                if let Err(e) = self.status.update(keys::GEO_VISUAL_MEMORIES, Value::Array(Vec::new())).await {
                    tracing::warn!("Could not initialise {}: {e}", keys::GEO_VISUAL_MEMORIES);
                }
            }
            Err(e) => tracing::warn!("Could not read {}: {e}", keys::GEO_VISUAL_MEMORIES),
        }
    }

    /// Analyze the image named by `request`. Never fails; errors become a
    /// `success = false` output with a memory entry recorded.
    pub async fn forward(&self, request: &AnalysisRequest) -> VisionBlockOutput {
        let image_path = match self.resolve_image_path(request).await {
            Ok(path) => path,
            Err(e) => return self.failure(request, None, e).await,
        };

        match self.analyze(request, &image_path).await {
            Ok(output) => output,
            Err(e) => self.failure(request, Some(&image_path), e).await,
        }
    }

    /// Recent memories recorded within `radius_m` of a point, nearest first.
    pub async fn query_spatial_memories(&self, lat: f64, lng: f64, radius_m: f64) -> Vec<NearbyMemory> {
        let entries = self.recent_memories().await;
        nearby_memories(&entries, lat, lng, radius_m)
    }

    async fn resolve_image_path(&self, request: &AnalysisRequest) -> VisionResult<String> {
        if let Some(path) = request.image_path.as_deref().filter(|p| !p.trim().is_empty()) {
            return Ok(path.trim().to_string());
        }
        if let Some(path) = extract_image_path(&request.intention) {
            return Ok(path);
        }

        match self.status.get(keys::CURRENT_IMAGE_PATH).await {
            Ok(Some(Value::String(path))) if !path.trim().is_empty() => Ok(path),
            Ok(_) => Err(VisionError::MissingImagePath),
            Err(e) => {
                tracing::warn!("Could not read {}: {e}", keys::CURRENT_IMAGE_PATH);
                Err(VisionError::MissingImagePath)
            }
        }
    }

    async fn analyze(&self, request: &AnalysisRequest, image_path: &str) -> VisionResult<VisionBlockOutput> {
        validate_image_path(image_path)?;
        tracing::info!("Analyzing image {image_path}");

        let gps_path = PathBuf::from(image_path);
        let gps_task = tokio::task::spawn_blocking(move || extract_gps(&gps_path));
        let agent_location = self.resolve_agent_location().await;
        let gps = gps_task.await.unwrap_or_else(|e| {
            tracing::warn!("EXIF extraction task failed: {e}");
            None
        });

        let manual = self.manual_location(request).await;
        let image_location = fuse_locations(gps, manual.as_ref(), agent_location.as_ref());
        let context = build_geographic_context(
            image_location.as_ref(),
            agent_location.as_ref(),
            self.nearby.as_deref(),
            &self.config,
        )
        .await;

        let encoded = self.load_image(image_path).await?;
        let prompt = self.prompt.render(&self.bindings(request, &context).await);

        let raw = self
            .model
            .complete(
                vec![ChatMessage::user_with_image(prompt, &encoded.base64)],
                ResponseFormat::JsonObject,
            )
            .await
            .map_err(|e| match e {
                VisionError::ModelInvocation(_) => e,
                other => VisionError::ModelInvocation(other.to_string()),
            })?;
        let analysis = SceneAnalysis::parse(&raw);

        let record = format_memory_record(image_path, &analysis, image_location.as_ref(), &context);
        let node_id = self.append_memory(&record).await;

        self.update_status(image_path, &analysis, image_location.as_ref(), node_id.clone())
            .await;
        self.push_thought(&analysis, image_location.as_ref(), &context).await;

        tracing::info!(
            "Analyzed {} as {} (confidence {:.2})",
            image_path,
            analysis.scene_type,
            analysis.location_confidence
        );

        Ok(VisionBlockOutput {
            success: true,
            evaluation: format!(
                "Geo-vision analysis: {}...",
                truncate_chars(&analysis.description, EVALUATION_SNIPPET_CHARS)
            ),
            consumed_time: self.config.success_consumed_time,
            node_id: node_id.clone(),
            image_path: image_path.to_string(),
            image_description: analysis.description,
            objects_detected: analysis.objects,
            scene_type: analysis.scene_type,
            geographic_location: image_location,
            spatial_context: analysis.spatial_context,
            visual_memory_id: node_id,
            location_relevance: analysis.location_relevance,
        })
    }

    async fn failure(
        &self,
        request: &AnalysisRequest,
        image_path: Option<&str>,
        error: VisionError,
    ) -> VisionBlockOutput {
        tracing::error!("Geo-vision analysis failed: {error}");

        let message = error.to_string();
        let node_id = self
            .append_memory(&format!("Attempted geo-vision analysis but hit an error: {message}"))
            .await;

        let image_path = image_path
            .map(str::to_string)
            .or_else(|| Some(request.intention.clone()).filter(|i| !i.trim().is_empty()))
            .unwrap_or_else(|| UNKNOWN_IMAGE.to_string());

        VisionBlockOutput {
            success: false,
            evaluation: format!(
                "Geo-vision analysis failed: {}",
                truncate_chars(&message, ERROR_SNIPPET_CHARS)
            ),
            consumed_time: self.config.failure_consumed_time,
            node_id: node_id.clone(),
            image_path,
            image_description: DEFAULT_DESCRIPTION.to_string(),
            objects_detected: Vec::new(),
            scene_type: FAILED_SCENE_TYPE.to_string(),
            geographic_location: None,
            spatial_context: FAILED_SPATIAL_CONTEXT.to_string(),
            visual_memory_id: node_id,
            location_relevance: FAILED_LOCATION_RELEVANCE.to_string(),
        }
    }

    async fn resolve_agent_location(&self) -> Option<GeographicLocation> {
        let position = match self.status.get(keys::POSITION).await {
            Ok(Some(value)) => match serde_json::from_value::<AgentPosition>(value) {
                Ok(position) => position,
                Err(e) => {
                    tracing::warn!("Agent position has an unexpected shape: {e}");
                    return None;
                }
            },
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Could not read agent position: {e}");
                return None;
            }
        };

        resolve_agent_location(&position, self.aoi_service.as_deref(), self.projector.as_deref()).await
    }

    async fn manual_location(&self, request: &AnalysisRequest) -> Option<GeographicLocation> {
        if let Some(location) = &request.manual_location {
            return Some(location.clone());
        }

        match self.status.get(keys::MANUAL_IMAGE_LOCATION).await {
            Ok(Some(Value::Null)) | Ok(None) => None,
            Ok(Some(value)) => serde_json::from_value(value)
                .map_err(|e| tracing::warn!("Ignoring malformed {}: {e}", keys::MANUAL_IMAGE_LOCATION))
                .ok(),
            Err(e) => {
                tracing::warn!("Could not read {}: {e}", keys::MANUAL_IMAGE_LOCATION);
                None
            }
        }
    }

    async fn load_image(&self, image_path: &str) -> VisionResult<EncodedImage> {
        let path = image_path.to_string();
        let (max_w, max_h, quality) = (
            self.config.max_image_width,
            self.config.max_image_height,
            self.config.jpeg_quality,
        );
        tokio::task::spawn_blocking(move || load_for_transport(&path, max_w, max_h, quality))
            .await
            .map_err(|e| VisionError::ImageLoad(format!("image task failed: {e}")))?
    }

    async fn bindings(&self, request: &AnalysisRequest, context: &GeographicContext) -> HashMap<String, String> {
        let mut bindings = context.bindings();
        bindings.insert("context.intention".to_string(), request.intention.clone());
        let position = if request.current_position.trim().is_empty() {
            UNKNOWN.to_string()
        } else {
            request.current_position.clone()
        };
        bindings.insert("context.current_position".to_string(), position);

        match self.status.get(keys::EMOTION_TYPES).await {
            Ok(Some(Value::String(emotion))) => {
                bindings.insert("status.emotion_types".to_string(), emotion);
            }
            Ok(Some(Value::Null)) | Ok(None) => {}
            Ok(Some(other)) => {
                bindings.insert("status.emotion_types".to_string(), other.to_string());
            }
            Err(e) => tracing::warn!("Could not read {}: {e}", keys::EMOTION_TYPES),
        }
        bindings
    }

    async fn append_memory(&self, record: &str) -> Option<String> {
        match self.memory.add(&self.config.memory_topic, record).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("Could not append to memory stream: {e}");
                None
            }
        }
    }

    async fn recent_memories(&self) -> Vec<VisionMemoryEntry> {
        match self.status.get(keys::GEO_VISUAL_MEMORIES).await {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
                tracing::warn!("Discarding malformed {}: {e}", keys::GEO_VISUAL_MEMORIES);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("Could not read {}: {e}", keys::GEO_VISUAL_MEMORIES);
                Vec::new()
            }
        }
    }

    async fn update_status(
        &self,
        image_path: &str,
        analysis: &SceneAnalysis,
        location: Option<&GeographicLocation>,
        node_id: Option<String>,
    ) {
        let location_value = location
            .map(serde_json::to_value)
            .transpose()
            .unwrap_or_else(|e| {
                tracing::warn!("Could not serialize image location: {e}");
                None
            })
            .unwrap_or(Value::Null);

        self.write_status(keys::LAST_ANALYZED_IMAGE, Value::String(image_path.to_string()))
            .await;
        self.write_status(keys::LAST_SCENE_TYPE, Value::String(analysis.scene_type.clone()))
            .await;
        self.write_status(keys::LAST_IMAGE_LOCATION, location_value).await;

        let mut entries = self.recent_memories().await;
        push_recent(
            &mut entries,
            VisionMemoryEntry {
                path: image_path.to_string(),
                description: analysis.description.clone(),
                location: location.cloned(),
                spatial_context: analysis.spatial_context.clone(),
                timestamp: now_rfc3339(),
                memory_id: node_id,
                location_confidence: analysis.location_confidence,
            },
            self.config.recent_memory_limit,
        );
        match serde_json::to_value(&entries) {
            Ok(value) => self.write_status(keys::GEO_VISUAL_MEMORIES, value).await,
            Err(e) => tracing::warn!("Could not serialize {}: {e}", keys::GEO_VISUAL_MEMORIES),
        }

        if let Some(location) = location {
            self.update_spatial_knowledge(location, analysis).await;
        }
    }

    async fn update_spatial_knowledge(&self, location: &GeographicLocation, analysis: &SceneAnalysis) {
        let mut knowledge: SpatialKnowledge = match self.status.get(keys::SPATIAL_KNOWLEDGE).await {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
                tracing::warn!("Resetting malformed {}: {e}", keys::SPATIAL_KNOWLEDGE);
                SpatialKnowledge::new()
            }),
            Ok(None) => SpatialKnowledge::new(),
            Err(e) => {
                tracing::warn!("Could not read {}: {e}", keys::SPATIAL_KNOWLEDGE);
                return;
            }
        };

        record_observation(&mut knowledge, location, &analysis.scene_type, &analysis.objects);
        match serde_json::to_value(&knowledge) {
            Ok(value) => self.write_status(keys::SPATIAL_KNOWLEDGE, value).await,
            Err(e) => tracing::warn!("Could not serialize {}: {e}", keys::SPATIAL_KNOWLEDGE),
        }
    }

    async fn write_status(&self, key: &str, value: Value) {
        if let Err(e) = self.status.update(key, value).await {
            tracing::warn!("Could not update status {key}: {e}");
        }
    }

    async fn push_thought(
        &self,
        analysis: &SceneAnalysis,
        location: Option<&GeographicLocation>,
        context: &GeographicContext,
    ) {
        if analysis.location_confidence <= self.config.cognition_confidence_threshold {
            return;
        }
        let Some(hook) = &self.cognition else {
            return;
        };

        let place = location
            .and_then(|l| l.aoi_name.clone().or_else(|| l.format_coordinates()))
            .unwrap_or_else(|| {
                if context.current_aoi != UNKNOWN {
                    context.current_aoi.clone()
                } else {
                    "somewhere".to_string()
                }
            });
        let thought = format!("Observed a {} scene at {place}", analysis.scene_type);

        if let Err(e) = hook.save_thought(&thought).await {
            tracing::warn!("Could not save geographic thought: {e}");
        }
    }
}

/// The first `max` characters of `s`.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("台北一零一大樓", 2), "台北");
        assert_eq!(truncate_chars("", 5), "");
    }
}
