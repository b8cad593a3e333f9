//! HTTP 与命令行共用的请求体。

use geocad_core::conversion::ConversionOptions;
use geocad_core::geo::{ElevationGrid, GeoFeature, GeoLocation, TerrainPoint};
use geocad_core::osm::{OsmElement, import_elements};
use geocad_engine::ConversionRequest;
use geocad_engine::errors::ConversionError;
use serde::Deserialize;
use tracing::debug;

/// `{elements, center, terrain?, options}`，`features` 可直接给出已适配的要素。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DxfRequest {
    #[serde(default)]
    pub elements: Vec<OsmElement>,
    #[serde(default)]
    pub features: Vec<GeoFeature>,
    pub center: GeoLocation,
    #[serde(default)]
    pub terrain: Option<Vec<Vec<TerrainPoint>>>,
    #[serde(default)]
    pub options: ConversionOptions,
}

impl DxfRequest {
    pub fn into_conversion(self) -> Result<ConversionRequest, ConversionError> {
        let elevation = match self.terrain {
            Some(rows) => ElevationGrid::new(rows)?,
            None => ElevationGrid::empty(),
        };
        let import = import_elements(self.elements);
        if import.dropped > 0 {
            debug!(dropped = import.dropped, "丢弃了没有几何的 OSM 元素");
        }
        let mut features = import.features;
        features.extend(self.features);
        Ok(ConversionRequest::new(features, self.center)
            .with_elevation(elevation)
            .with_options(self.options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overpass_payload_becomes_a_conversion_request() {
        let body = r#"{
            "elements": [
                {"type": "node", "id": 1, "lat": -23.55, "lon": -46.63, "tags": {"natural": "tree"}},
                {"type": "way", "id": 2, "nodes": [1, 2], "tags": {"highway": "primary"},
                 "geometry": [{"lat": -23.55, "lon": -46.63}, {"lat": -23.551, "lon": -46.631}]},
                {"type": "way", "id": 3, "nodes": []}
            ],
            "center": {"lat": -23.55, "lng": -46.63},
            "options": {"projection": "utm", "layerToggles": {"grid": true}}
        }"#;
        let request: DxfRequest = serde_json::from_str(body).expect("请求体合法");
        let conversion = request.into_conversion().expect("转换请求合法");
        assert_eq!(conversion.features.len(), 2);
        assert!(conversion.elevation.is_empty());
        let config = conversion.validate().expect("选项合法");
        assert!(config.layers.grid);
    }

    #[test]
    fn ragged_terrain_is_rejected() {
        let body = r#"{
            "center": {"lat": 0, "lng": 0},
            "terrain": [
                [{"lat": 0, "lng": 0, "elevation": 1}, {"lat": 0, "lng": 0.001, "elevation": 1}],
                [{"lat": 0.001, "lng": 0, "elevation": 1}]
            ]
        }"#;
        let request: DxfRequest = serde_json::from_str(body).expect("请求体合法");
        assert!(matches!(
            request.into_conversion(),
            Err(ConversionError::InvalidElevationGrid(_))
        ));
    }
}
