//! Geographic context assembly for prompt injection.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::GeoVisionConfig;
use crate::distance::{haversine_distance, LocationConsistency};
use crate::services::NearbyAoiQuery;
use crate::types::{GeographicLocation, LocationSource};

/// Placeholder for absent fields; fields are never omitted so the prompt keeps its shape.
pub const UNKNOWN: &str = "unknown";
/// Placeholder when no nearby AOIs are known.
pub const NO_NEARBY_AOIS: &str = "none";
/// Summary used when no fragment could be built.
pub const NO_GEOGRAPHIC_INFO: &str = "No geographic information available";

const SUMMARY_SEPARATOR: &str = "; ";

/// Human-readable geographic facts for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeographicContext {
    pub agent_coordinates: String,
    pub current_aoi: String,
    pub image_location: String,
    pub nearby_aoi_names: Vec<String>,
    pub nearby_aois: String,
    pub summary: String,
    pub distance_from_agent: Option<String>,
    pub distance_m: Option<f64>,
    pub consistency: LocationConsistency,
}

impl Default for GeographicContext {
    fn default() -> Self {
        Self {
            agent_coordinates: UNKNOWN.to_string(),
            current_aoi: UNKNOWN.to_string(),
            image_location: UNKNOWN.to_string(),
            nearby_aoi_names: Vec::new(),
            nearby_aois: NO_NEARBY_AOIS.to_string(),
            summary: NO_GEOGRAPHIC_INFO.to_string(),
            distance_from_agent: None,
            distance_m: None,
            consistency: LocationConsistency::Unknown,
        }
    }
}

impl GeographicContext {
    /// Prompt bindings under the `geo.` prefix.
    pub fn bindings(&self) -> HashMap<String, String> {
        let mut b = HashMap::new();
        b.insert("geo.agent_coordinates".to_string(), self.agent_coordinates.clone());
        b.insert("geo.current_aoi".to_string(), self.current_aoi.clone());
        b.insert("geo.image_location".to_string(), self.image_location.clone());
        b.insert("geo.nearby_aois".to_string(), self.nearby_aois.clone());
        b.insert("geo.summary".to_string(), self.summary.clone());
        b.insert(
            "geo.distance_from_agent".to_string(),
            self.distance_from_agent.clone().unwrap_or_else(|| UNKNOWN.to_string()),
        );
        b.insert("geo.location_consistency".to_string(), self.consistency.to_string());
        b
    }
}

/// Build the geographic context for an image and agent location.
///
/// Nearby AOIs are looked up around the image location when a spatial query
/// is available; a failed lookup leaves the list empty.
pub async fn build_geographic_context(
    image_location: Option<&GeographicLocation>,
    agent_location: Option<&GeographicLocation>,
    nearby: Option<&dyn NearbyAoiQuery>,
    config: &GeoVisionConfig,
) -> GeographicContext {
    let mut ctx = GeographicContext::default();

    if let Some(agent) = agent_location {
        if let Some(coords) = agent.format_coordinates() {
            ctx.agent_coordinates = coords;
        }
        if let Some(name) = &agent.aoi_name {
            ctx.current_aoi = name.clone();
        }
    }

    if let Some((lat, lng)) = image_location.and_then(|l| l.coordinates()) {
        ctx.image_location = format!("({lat:.6}, {lng:.6})");

        if let Some((agent_lat, agent_lng)) = agent_location.and_then(|a| a.coordinates()) {
            let distance = haversine_distance(agent_lat, agent_lng, lat, lng);
            if distance.is_finite() {
                ctx.distance_from_agent = Some(format!("{distance:.0}m"));
                ctx.distance_m = Some(distance);
            }
            if image_location.is_some_and(|l| is_independent(l.source)) {
                ctx.consistency = LocationConsistency::classify(
                    distance,
                    config.location_accuracy_threshold,
                    config.possible_consistency_threshold,
                );
            }
        }

        if let Some(query) = nearby {
            match query.query_nearby_aois(lat, lng, config.nearby_radius_m).await {
                Ok(aois) => {
                    ctx.nearby_aoi_names = aois
                        .iter()
                        .take(config.nearby_limit)
                        .map(|a| a.display_name())
                        .collect();
                }
                Err(e) => tracing::warn!("Nearby AOI query failed: {e}"),
            }
        }
        if !ctx.nearby_aoi_names.is_empty() {
            ctx.nearby_aois = ctx.nearby_aoi_names.join(", ");
        }
    }

    let mut parts = Vec::new();
    if ctx.agent_coordinates != UNKNOWN {
        parts.push(format!("agent is at {}", ctx.agent_coordinates));
    }
    if ctx.current_aoi != UNKNOWN {
        parts.push(format!("currently in {}", ctx.current_aoi));
    }
    if ctx.image_location != UNKNOWN {
        parts.push(format!("image taken at {}", ctx.image_location));
    }
    if let Some(distance) = &ctx.distance_from_agent {
        parts.push(format!("{distance} from the agent"));
    }
    if !parts.is_empty() {
        ctx.summary = parts.join(SUMMARY_SEPARATOR);
    }

    ctx
}

/// Whether a location was measured independently of the agent's own position.
fn is_independent(source: LocationSource) -> bool {
    matches!(source, LocationSource::Gps | LocationSource::Manual)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::types::{AoiInfo, VisionError, VisionResult};

    struct Neighbours(usize);

    #[async_trait]
    impl NearbyAoiQuery for Neighbours {
        async fn query_nearby_aois(&self, _lat: f64, _lng: f64, radius_m: f64) -> VisionResult<Vec<AoiInfo>> {
            assert_eq!(radius_m, 500.0);
            Ok((0..self.0)
                .map(|i| AoiInfo {
                    id: i as i64,
                    name: if i == 0 { None } else { Some(format!("Block {i}")) },
                    center_lat: None,
                    center_lng: None,
                })
                .collect())
        }
    }

    struct Offline;

    #[async_trait]
    impl NearbyAoiQuery for Offline {
        async fn query_nearby_aois(&self, _lat: f64, _lng: f64, _radius_m: f64) -> VisionResult<Vec<AoiInfo>> {
            Err(VisionError::LocationLookup("spatial index offline".to_string()))
        }
    }

    fn gps_image() -> GeographicLocation {
        GeographicLocation::new(25.0330, 121.5654, LocationSource::Gps).with_accuracy(5.0)
    }

    fn agent() -> GeographicLocation {
        GeographicLocation::new(25.0335, 121.5650, LocationSource::Aoi)
            .with_accuracy(50.0)
            .with_aoi(Some(3), Some("Xinyi".to_string()))
    }

    #[tokio::test]
    async fn test_nothing_known() {
        let ctx = build_geographic_context(None, None, Some(&Neighbours(3)), &GeoVisionConfig::default()).await;
        assert_eq!(ctx, GeographicContext::default());
        assert_eq!(ctx.summary, NO_GEOGRAPHIC_INFO);
        assert_eq!(ctx.agent_coordinates, UNKNOWN);
        assert_eq!(ctx.nearby_aois, NO_NEARBY_AOIS);
    }

    #[tokio::test]
    async fn test_full_context() {
        let image = gps_image();
        let agent = agent();
        let ctx = build_geographic_context(
            Some(&image),
            Some(&agent),
            Some(&Neighbours(8)),
            &GeoVisionConfig::default(),
        )
        .await;

        assert_eq!(ctx.agent_coordinates, "(25.033500, 121.565000)");
        assert_eq!(ctx.current_aoi, "Xinyi");
        assert_eq!(ctx.image_location, "(25.033000, 121.565400)");
        assert_eq!(ctx.distance_from_agent.as_deref(), Some("69m"));
        assert_eq!(ctx.consistency, LocationConsistency::Consistent);
        assert_eq!(ctx.nearby_aoi_names.len(), 5);
        assert_eq!(ctx.nearby_aois, "AOI_0, Block 1, Block 2, Block 3, Block 4");
        assert_eq!(
            ctx.summary,
            "agent is at (25.033500, 121.565000); currently in Xinyi; \
             image taken at (25.033000, 121.565400); 69m from the agent"
        );
    }

    #[tokio::test]
    async fn test_far_gps_is_inconsistent() {
        let image = GeographicLocation::new(25.1, 121.6, LocationSource::Gps);
        let agent = GeographicLocation::new(25.0330, 121.5654, LocationSource::Agent);
        let ctx = build_geographic_context(Some(&image), Some(&agent), None, &GeoVisionConfig::default()).await;
        assert_eq!(ctx.consistency, LocationConsistency::Inconsistent);
        assert!(ctx.distance_m.unwrap() > 8_000.0);
    }

    #[tokio::test]
    async fn test_estimated_location_is_not_classified() {
        let agent = agent();
        let estimate = GeographicLocation {
            source: LocationSource::AgentEstimated,
            ..agent.clone()
        };
        let ctx = build_geographic_context(Some(&estimate), Some(&agent), None, &GeoVisionConfig::default()).await;
        assert_eq!(ctx.distance_from_agent.as_deref(), Some("0m"));
        assert_eq!(ctx.consistency, LocationConsistency::Unknown);
    }

    #[tokio::test]
    async fn test_failed_nearby_query_is_absorbed() {
        let image = gps_image();
        let ctx = build_geographic_context(Some(&image), None, Some(&Offline), &GeoVisionConfig::default()).await;
        assert_eq!(ctx.nearby_aois, NO_NEARBY_AOIS);
        assert_eq!(ctx.summary, "image taken at (25.033000, 121.565400)");
    }

    #[test]
    fn test_bindings_cover_placeholders() {
        let bindings = GeographicContext::default().bindings();
        assert_eq!(bindings["geo.distance_from_agent"], UNKNOWN);
        assert_eq!(bindings["geo.location_consistency"], "unknown");
        assert_eq!(bindings["geo.summary"], NO_GEOGRAPHIC_INFO);
    }
}
