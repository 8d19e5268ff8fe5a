//! Visual memory records, the bounded recent list, and spatial recall.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::analysis::SceneAnalysis;
use crate::context::GeographicContext;
use crate::distance::haversine_distance;
use crate::types::GeographicLocation;

/// One entry of the recent geo-visual memory list kept in status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionMemoryEntry {
    pub path: String,
    pub description: String,
    pub location: Option<GeographicLocation>,
    pub spatial_context: String,
    pub timestamp: String,
    pub memory_id: Option<String>,
    pub location_confidence: f64,
}

/// Append `entry`, evicting the oldest entries so at most `limit` remain.
pub fn push_recent(entries: &mut Vec<VisionMemoryEntry>, entry: VisionMemoryEntry, limit: usize) {
    entries.push(entry);
    if entries.len() > limit {
        let excess = entries.len() - limit;
        entries.drain(..excess);
    }
}

/// A recent entry found near a query point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyMemory {
    pub entry: VisionMemoryEntry,
    pub distance_m: f64,
}

/// Entries whose location lies within `radius_m` of `(lat, lng)`, nearest first.
pub fn nearby_memories(entries: &[VisionMemoryEntry], lat: f64, lng: f64, radius_m: f64) -> Vec<NearbyMemory> {
    let mut found: Vec<NearbyMemory> = entries
        .iter()
        .filter_map(|entry| {
            let (mem_lat, mem_lng) = entry.location.as_ref()?.coordinates()?;
            let distance_m = haversine_distance(lat, lng, mem_lat, mem_lng);
            (distance_m <= radius_m).then(|| NearbyMemory {
                entry: entry.clone(),
                distance_m,
            })
        })
        .collect();

    found.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
    found
}

/// Multi-line memory stream record for a successful analysis.
pub fn format_memory_record(
    image_path: &str,
    analysis: &SceneAnalysis,
    location: Option<&GeographicLocation>,
    context: &GeographicContext,
) -> String {
    let mut record = format!(
        "Geo-vision analysis result:\n\
         - File path: {image_path}\n\
         - Scene description: {}\n\
         - Detected objects: {}\n\
         - Scene type: {}\n\
         - Spatial landmarks: {}\n\
         - Geographic consistency: {}\n\
         - Location confidence: {}\n\
         - Spatial context: {}\n\
         - Functional analysis: {}\n\
         - Temporal indicators: {}\n\
         - Location relevance: {}\n",
        analysis.description,
        analysis.objects.join(", "),
        analysis.scene_type,
        analysis.spatial_landmarks.join(", "),
        analysis.geographic_consistency,
        analysis.location_confidence,
        analysis.spatial_context,
        analysis.functional_analysis,
        analysis.temporal_indicators,
        analysis.location_relevance,
    );

    if let Some(location) = location {
        if let Some(coords) = location.format_coordinates() {
            record.push_str(&format!("- Capture coordinates: {coords}\n"));
        }
        record.push_str(&format!("- Location source: {}\n", location.source));
        if let Some(accuracy) = location.accuracy {
            record.push_str(&format!("- Location accuracy: {accuracy}m\n"));
        }
    }

    if let Some(distance) = &context.distance_from_agent {
        record.push_str(&format!("- Distance from agent: {distance}\n"));
    }

    record
}

/// Accumulated observations at one rounded coordinate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaceKnowledge {
    pub scenes: Vec<String>,
    pub objects: BTreeSet<String>,
    pub visits: u32,
    pub first_seen: String,
    pub last_seen: String,
}

/// Place knowledge keyed by `"{lat:.4},{lng:.4}"`.
pub type SpatialKnowledge = BTreeMap<String, PlaceKnowledge>;

/// Key for a coordinate, rounded to four decimals (about 11 m).
pub fn place_key(lat: f64, lng: f64) -> String {
    format!("{lat:.4},{lng:.4}")
}

/// Fold one observation into `knowledge`. Locations without coordinates are skipped.
pub fn record_observation(
    knowledge: &mut SpatialKnowledge,
    location: &GeographicLocation,
    scene_type: &str,
    objects: &[String],
) {
    let Some((lat, lng)) = location.coordinates() else {
        return;
    };

    let place = knowledge
        .entry(place_key(lat, lng))
        .or_insert_with(|| PlaceKnowledge {
            first_seen: location.timestamp.clone(),
            ..Default::default()
        });
    place.scenes.push(scene_type.to_string());
    place.objects.extend(objects.iter().cloned());
    place.visits += 1;
    place.last_seen = location.timestamp.clone();
}
