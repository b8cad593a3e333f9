//! Overpass API 元素到 [`GeoFeature`] 的适配。
//!
//! 仅接受带内联几何（`out geom`）的查询结果：节点直接取坐标，路径与关系成员取
//! `geometry` 字段。没有几何的元素会被丢弃并计数。

use serde::{Deserialize, Serialize};

use crate::geo::{GeoFeature, GeoLocation, RelationMember, Tags};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OsmCoordinate {
    pub lat: f64,
    pub lon: f64,
}

impl From<OsmCoordinate> for GeoLocation {
    fn from(value: OsmCoordinate) -> Self {
        GeoLocation::new(value.lat, value.lon)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsmMember {
    #[serde(rename = "type")]
    pub member_type: String,
    #[serde(rename = "ref")]
    pub reference: i64,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub geometry: Option<Vec<OsmCoordinate>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OsmElement {
    Node {
        id: i64,
        lat: f64,
        lon: f64,
        #[serde(default)]
        tags: Tags,
    },
    Way {
        id: i64,
        #[serde(default)]
        nodes: Vec<i64>,
        #[serde(default)]
        tags: Tags,
        #[serde(default)]
        geometry: Option<Vec<OsmCoordinate>>,
    },
    Relation {
        id: i64,
        #[serde(default)]
        members: Vec<OsmMember>,
        #[serde(default)]
        tags: Tags,
    },
}

/// 适配结果：成功转换的要素与被丢弃的元素数量。
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OsmImport {
    pub features: Vec<GeoFeature>,
    pub dropped: usize,
}

/// 把 Overpass 元素批量转换为要素列表，保持输入顺序。
pub fn import_elements<I>(elements: I) -> OsmImport
where
    I: IntoIterator<Item = OsmElement>,
{
    let mut import = OsmImport::default();
    for element in elements {
        match element.into_feature() {
            Some(feature) => import.features.push(feature),
            None => import.dropped += 1,
        }
    }
    import
}

impl OsmElement {
    pub fn id(&self) -> i64 {
        match self {
            OsmElement::Node { id, .. }
            | OsmElement::Way { id, .. }
            | OsmElement::Relation { id, .. } => *id,
        }
    }

    pub fn into_feature(self) -> Option<GeoFeature> {
        match self {
            OsmElement::Node { id, lat, lon, tags } => Some(GeoFeature::Point {
                id: format!("node/{id}"),
                location: GeoLocation::new(lat, lon),
                tags,
            }),
            OsmElement::Way {
                id, tags, geometry, ..
            } => path_feature(format!("way/{id}"), geometry?, tags),
            OsmElement::Relation { id, members, tags } => {
                let members: Vec<RelationMember> = members
                    .into_iter()
                    .filter_map(|member| {
                        let feature = path_feature(
                            format!("{}/{}", member.member_type, member.reference),
                            member.geometry?,
                            Tags::new(),
                        )?;
                        Some(RelationMember {
                            role: member.role,
                            feature,
                        })
                    })
                    .collect();
                if members.is_empty() {
                    return None;
                }
                Some(GeoFeature::Relation {
                    id: format!("relation/{id}"),
                    members,
                    tags,
                })
            }
        }
    }
}

/// 首尾相同且至少 4 个坐标的路径视为闭合面，其余为线。
fn path_feature(id: String, geometry: Vec<OsmCoordinate>, tags: Tags) -> Option<GeoFeature> {
    if geometry.is_empty() {
        return None;
    }
    let closed = geometry.len() >= 4 && geometry.first() == geometry.last();
    let coordinates: Vec<GeoLocation> = geometry.into_iter().map(GeoLocation::from).collect();
    Some(if closed {
        GeoFeature::Area {
            id,
            ring: coordinates,
            tags,
        }
    } else {
        GeoFeature::Line {
            id,
            points: coordinates,
            tags,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overpass_payload_is_adapted() {
        let json = r#"[
            {"type": "node", "id": 1, "lat": 1.0, "lon": 2.0, "tags": {"natural": "tree"}},
            {"type": "way", "id": 2, "nodes": [1, 2, 3, 1], "tags": {"building": "yes"},
             "geometry": [{"lat": 0.0, "lon": 0.0}, {"lat": 0.0, "lon": 0.001},
                          {"lat": 0.001, "lon": 0.001}, {"lat": 0.0, "lon": 0.0}]},
            {"type": "way", "id": 3, "tags": {"highway": "primary"},
             "geometry": [{"lat": 0.0, "lon": 0.0}, {"lat": 0.0, "lon": 0.001}]},
            {"type": "way", "id": 4, "tags": {"highway": "service"}},
            {"type": "relation", "id": 5, "tags": {"building": "yes"},
             "members": [
                {"type": "way", "ref": 10, "role": "outer",
                 "geometry": [{"lat": 0.0, "lon": 0.0}, {"lat": 0.0, "lon": 0.001},
                              {"lat": 0.001, "lon": 0.001}, {"lat": 0.0, "lon": 0.0}]},
                {"type": "way", "ref": 11, "role": "inner"}
             ]}
        ]"#;
        let elements: Vec<OsmElement> = serde_json::from_str(json).expect("overpass json");
        let import = import_elements(elements);

        assert_eq!(import.dropped, 1);
        assert_eq!(import.features.len(), 4);
        assert!(matches!(&import.features[0], GeoFeature::Point { id, .. } if id == "node/1"));
        assert!(matches!(&import.features[1], GeoFeature::Area { ring, .. } if ring.len() == 4));
        assert!(matches!(&import.features[2], GeoFeature::Line { .. }));
        match &import.features[3] {
            GeoFeature::Relation { members, tags, .. } => {
                assert_eq!(members.len(), 1);
                assert_eq!(members[0].role, "outer");
                assert_eq!(tags.get("building").map(String::as_str), Some("yes"));
            }
            other => panic!("期望关系要素，实际为 {other:?}"),
        }
    }

    #[test]
    fn short_closed_way_stays_a_line() {
        let way = OsmElement::Way {
            id: 9,
            nodes: Vec::new(),
            tags: Tags::new(),
            geometry: Some(vec![
                OsmCoordinate { lat: 0.0, lon: 0.0 },
                OsmCoordinate { lat: 1.0, lon: 0.0 },
                OsmCoordinate { lat: 0.0, lon: 0.0 },
            ]),
        };
        assert!(matches!(way.into_feature(), Some(GeoFeature::Line { .. })));
    }
}
