//! Agent location resolution and image location fusion.

use crate::services::{AoiService, CoordinateProjector};
use crate::types::{AgentPosition, GeographicLocation, GpsFix, LocationSource};

/// Accuracy (m) assigned to an EXIF GPS fix.
pub const GPS_ACCURACY_M: f64 = 5.0;
/// Accuracy (m) assigned to an AOI center.
pub const AOI_ACCURACY_M: f64 = 50.0;
/// Accuracy (m) assigned to a projected XY position.
pub const XY_ACCURACY_M: f64 = 10.0;
/// Penalty (m) added when the agent's position stands in for the image's.
pub const ESTIMATE_PENALTY_M: f64 = 20.0;

/// Resolve the agent's current geographic location.
///
/// Tries the AOI center first, then the projected XY coordinate. Lookup and
/// projection failures are logged and fall through to the next step.
pub async fn resolve_agent_location(
    position: &AgentPosition,
    aoi_service: Option<&dyn AoiService>,
    projector: Option<&dyn CoordinateProjector>,
) -> Option<GeographicLocation> {
    let aoi_id = position.aoi_position.as_ref().and_then(|p| p.aoi_id);
    if let (Some(aoi_id), Some(service)) = (aoi_id, aoi_service) {
        match service.get_aoi_info(aoi_id).await {
            Ok(Some(info)) => {
                return Some(GeographicLocation {
                    latitude: info.center_lat,
                    longitude: info.center_lng,
                    altitude: None,
                    accuracy: Some(AOI_ACCURACY_M),
                    source: LocationSource::Aoi,
                    aoi_id: Some(aoi_id),
                    aoi_name: Some(info.display_name()),
                    address: None,
                    timestamp: crate::types::now_rfc3339(),
                });
            }
            Ok(None) => tracing::debug!("AOI {aoi_id} not known to the map service"),
            Err(e) => tracing::warn!("AOI lookup for {aoi_id} failed: {e}"),
        }
    }

    if let (Some(xy), Some(projector)) = (&position.xy_position, projector) {
        if let (Some(x), Some(y)) = (xy.x, xy.y) {
            match projector.xy_to_latlng(x, y) {
                Ok((lat, lng)) => {
                    return Some(
                        GeographicLocation::new(lat, lng, LocationSource::Agent).with_accuracy(XY_ACCURACY_M),
                    );
                }
                Err(e) => tracing::warn!("Coordinate projection of ({x}, {y}) failed: {e}"),
            }
        }
    }

    None
}

/// Decide the location to attribute to the image.
///
/// EXIF GPS always wins. Otherwise a manual override is used, then the agent's
/// own location with an accuracy penalty.
pub fn fuse_locations(
    gps: Option<GpsFix>,
    manual: Option<&GeographicLocation>,
    agent: Option<&GeographicLocation>,
) -> Option<GeographicLocation> {
    if let Some(fix) = gps {
        return Some(
            GeographicLocation::new(fix.latitude, fix.longitude, LocationSource::Gps)
                .with_altitude(fix.altitude)
                .with_accuracy(GPS_ACCURACY_M),
        );
    }

    if let Some(manual) = manual {
        return Some(GeographicLocation {
            source: LocationSource::Manual,
            timestamp: crate::types::now_rfc3339(),
            ..manual.clone()
        });
    }

    agent.map(|agent| GeographicLocation {
        latitude: agent.latitude,
        longitude: agent.longitude,
        altitude: agent.altitude,
        accuracy: agent.accuracy.map(|a| a + ESTIMATE_PENALTY_M),
        source: LocationSource::AgentEstimated,
        aoi_id: agent.aoi_id,
        aoi_name: agent.aoi_name.clone(),
        address: None,
        timestamp: crate::types::now_rfc3339(),
    })
}
