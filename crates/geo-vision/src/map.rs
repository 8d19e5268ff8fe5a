//! File-backed AOI catalog and a local XY projector.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::distance::{haversine_distance, valid_coordinate, EARTH_RADIUS_M};
use crate::services::{AoiService, CoordinateProjector, NearbyAoiQuery};
use crate::types::{AoiInfo, VisionError, VisionResult};

/// A set of AOIs with known centers.
#[derive(Debug, Clone, Default)]
pub struct AoiCatalog {
    aois: HashMap<i64, AoiInfo>,
}

impl AoiCatalog {
    pub fn new(aois: impl IntoIterator<Item = AoiInfo>) -> Self {
        Self {
            aois: aois.into_iter().map(|a| (a.id, a)).collect(),
        }
    }

    /// Load a JSON array of `{id, name, center_lat, center_lng}`.
    pub fn read_from_file(path: &Path) -> VisionResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let aois: Vec<AoiInfo> = serde_json::from_str(&text)?;
        tracing::info!("Loaded {} AOIs from {}", aois.len(), path.display());
        Ok(Self::new(aois))
    }

    pub fn len(&self) -> usize {
        self.aois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aois.is_empty()
    }
}

#[async_trait]
impl AoiService for AoiCatalog {
    async fn get_aoi_info(&self, aoi_id: i64) -> VisionResult<Option<AoiInfo>> {
        Ok(self.aois.get(&aoi_id).cloned())
    }
}

#[async_trait]
impl NearbyAoiQuery for AoiCatalog {
    async fn query_nearby_aois(&self, lat: f64, lng: f64, radius_m: f64) -> VisionResult<Vec<AoiInfo>> {
        if !valid_coordinate(lat, lng) {
            return Err(VisionError::LocationLookup(format!("invalid query point ({lat}, {lng})")));
        }

        let mut hits: Vec<(f64, &AoiInfo)> = self
            .aois
            .values()
            .filter_map(|aoi| {
                let d = haversine_distance(lat, lng, aoi.center_lat?, aoi.center_lng?);
                (d <= radius_m).then_some((d, aoi))
            })
            .collect();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.id.cmp(&b.1.id)));

        Ok(hits.into_iter().map(|(_, aoi)| aoi.clone()).collect())
    }
}

/// Equirectangular projection of local meters (x east, y north) around an origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalProjector {
    pub origin_lat: f64,
    pub origin_lng: f64,
}

impl LocalProjector {
    pub fn new(origin_lat: f64, origin_lng: f64) -> Self {
        Self { origin_lat, origin_lng }
    }
}

impl CoordinateProjector for LocalProjector {
    fn xy_to_latlng(&self, x: f64, y: f64) -> VisionResult<(f64, f64)> {
        if !x.is_finite() || !y.is_finite() {
            return Err(VisionError::LocationLookup(format!("non-finite XY ({x}, {y})")));
        }
        let cos_lat = self.origin_lat.to_radians().cos();
        if cos_lat.abs() < 1e-12 {
            return Err(VisionError::LocationLookup("projection origin at a pole".to_string()));
        }

        let lat = self.origin_lat + (y / EARTH_RADIUS_M).to_degrees();
        let lng = self.origin_lng + (x / (EARTH_RADIUS_M * cos_lat)).to_degrees();
        if !valid_coordinate(lat, lng) {
            return Err(VisionError::LocationLookup(format!("XY ({x}, {y}) projects off the globe")));
        }
        Ok((lat, lng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> AoiCatalog {
        AoiCatalog::new([
            AoiInfo {
                id: 1,
                name: Some("Taipei 101".to_string()),
                center_lat: Some(25.0340),
                center_lng: Some(121.5645),
            },
            AoiInfo {
                id: 2,
                name: Some("City Hall".to_string()),
                center_lat: Some(25.0375),
                center_lng: Some(121.5637),
            },
            AoiInfo {
                id: 3,
                name: Some("Palace Museum".to_string()),
                center_lat: Some(25.1023),
                center_lng: Some(121.5488),
            },
            AoiInfo {
                id: 4,
                name: None,
                center_lat: None,
                center_lng: None,
            },
        ])
    }

    #[test]
    fn test_lookup_by_id() {
        let catalog = catalog();
        let info = tokio_test::block_on(catalog.get_aoi_info(2)).unwrap().unwrap();
        assert_eq!(info.name.as_deref(), Some("City Hall"));
        assert!(tokio_test::block_on(catalog.get_aoi_info(99)).unwrap().is_none());
    }

    #[test]
    fn test_nearby_sorted_within_radius() {
        let catalog = catalog();
        let hits = tokio_test::block_on(catalog.query_nearby_aois(25.0330, 121.5654, 800.0)).unwrap();
        let ids: Vec<i64> = hits.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_nearby_rejects_invalid_point() {
        let catalog = catalog();
        assert!(tokio_test::block_on(catalog.query_nearby_aois(f64::NAN, 0.0, 500.0)).is_err());
    }

    #[test]
    fn test_catalog_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aois.json");
        std::fs::write(
            &path,
            r#"[{"id": 7, "name": "Harbor", "center_lat": 22.6, "center_lng": 120.3}]"#,
        )
        .unwrap();
        let catalog = AoiCatalog::read_from_file(&path).unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_projector_origin_and_offsets() {
        let projector = LocalProjector::new(25.0330, 121.5654);
        assert_eq!(projector.xy_to_latlng(0.0, 0.0).unwrap(), (25.0330, 121.5654));

        let (lat, lng) = projector.xy_to_latlng(300.0, 400.0).unwrap();
        let d = haversine_distance(25.0330, 121.5654, lat, lng);
        assert!((d - 500.0).abs() < 1.0, "got {d}");
        assert!(lat > 25.0330 && lng > 121.5654);
    }

    #[test]
    fn test_projector_rejects_bad_input() {
        let projector = LocalProjector::new(25.0, 121.0);
        assert!(projector.xy_to_latlng(f64::INFINITY, 0.0).is_err());
        assert!(projector.xy_to_latlng(0.0, 1e9).is_err());
        assert!(LocalProjector::new(90.0, 0.0).xy_to_latlng(1.0, 1.0).is_err());
    }
}
