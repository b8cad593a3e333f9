//! 地理输入模型：要素、坐标与高程网格。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 要素属性表。使用有序映射，保证遍历顺序稳定。
pub type Tags = BTreeMap<String, String>;

/// WGS84 经纬度（度）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub lat: f64,
    #[serde(alias = "lon")]
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl GeoLocation {
    #[inline]
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// 关系成员：角色字符串加上成员自身的几何要素。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationMember {
    #[serde(default)]
    pub role: String,
    pub feature: GeoFeature,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GeoFeature {
    Point {
        id: String,
        location: GeoLocation,
        #[serde(default)]
        tags: Tags,
    },
    Line {
        id: String,
        points: Vec<GeoLocation>,
        #[serde(default)]
        tags: Tags,
    },
    /// 闭合面，约定首尾坐标相同。
    Area {
        id: String,
        ring: Vec<GeoLocation>,
        #[serde(default)]
        tags: Tags,
    },
    Relation {
        id: String,
        members: Vec<RelationMember>,
        #[serde(default)]
        tags: Tags,
    },
}

impl GeoFeature {
    pub fn id(&self) -> &str {
        match self {
            GeoFeature::Point { id, .. }
            | GeoFeature::Line { id, .. }
            | GeoFeature::Area { id, .. }
            | GeoFeature::Relation { id, .. } => id,
        }
    }

    pub fn tags(&self) -> &Tags {
        match self {
            GeoFeature::Point { tags, .. }
            | GeoFeature::Line { tags, .. }
            | GeoFeature::Area { tags, .. }
            | GeoFeature::Relation { tags, .. } => tags,
        }
    }

    #[inline]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags().get(key).map(String::as_str)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GeoFeature::Point { .. } => "point",
            GeoFeature::Line { .. } => "line",
            GeoFeature::Area { .. } => "area",
            GeoFeature::Relation { .. } => "relation",
        }
    }

    /// 线或面的坐标序列；点与关系返回空切片。
    pub fn coordinates(&self) -> &[GeoLocation] {
        match self {
            GeoFeature::Line { points, .. } => points,
            GeoFeature::Area { ring, .. } => ring,
            GeoFeature::Point { location, .. } => std::slice::from_ref(location),
            GeoFeature::Relation { .. } => &[],
        }
    }
}

/// 高程采样点。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerrainPoint {
    pub lat: f64,
    #[serde(alias = "lon")]
    pub lng: f64,
    pub elevation: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("高程网格第 {row} 行长度为 {found}，应为 {expected}")]
    RaggedRows {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("高程网格第 {row} 行只有 {len} 个采样，至少需要 2 个")]
    RowTooShort { row: usize, len: usize },
    #[error("高程网格至少需要 2 行，当前只有 {rows} 行")]
    TooFewRows { rows: usize },
}

/// 行优先的规则高程网格。空网格表示“没有地形”，其余情况要求各行等长且不少于 2。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<TerrainPoint>>", into = "Vec<Vec<TerrainPoint>>")]
pub struct ElevationGrid {
    rows: Vec<Vec<TerrainPoint>>,
}

impl ElevationGrid {
    pub fn new(rows: Vec<Vec<TerrainPoint>>) -> Result<Self, GridError> {
        if rows.is_empty() {
            return Ok(Self::default());
        }
        if rows.len() < 2 {
            return Err(GridError::TooFewRows { rows: rows.len() });
        }
        let expected = rows[0].len();
        for (index, row) in rows.iter().enumerate() {
            if row.len() < 2 {
                return Err(GridError::RowTooShort {
                    row: index,
                    len: row.len(),
                });
            }
            if row.len() != expected {
                return Err(GridError::RaggedRows {
                    row: index,
                    expected,
                    found: row.len(),
                });
            }
        }
        Ok(Self { rows })
    }

    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[inline]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn column_count(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    #[inline]
    pub fn rows(&self) -> &[Vec<TerrainPoint>] {
        &self.rows
    }

    #[inline]
    pub fn get(&self, row: usize, column: usize) -> Option<&TerrainPoint> {
        self.rows.get(row).and_then(|samples| samples.get(column))
    }

    pub fn samples(&self) -> impl Iterator<Item = &TerrainPoint> {
        self.rows.iter().flatten()
    }

    /// 最低与最高高程；空网格返回 None。
    pub fn elevation_range(&self) -> Option<(f64, f64)> {
        self.samples().fold(None, |range, sample| {
            let z = sample.elevation;
            Some(match range {
                None => (z, z),
                Some((low, high)) => (low.min(z), high.max(z)),
            })
        })
    }
}

impl TryFrom<Vec<Vec<TerrainPoint>>> for ElevationGrid {
    type Error = GridError;

    fn try_from(rows: Vec<Vec<TerrainPoint>>) -> Result<Self, Self::Error> {
        Self::new(rows)
    }
}

impl From<ElevationGrid> for Vec<Vec<TerrainPoint>> {
    fn from(grid: ElevationGrid) -> Self {
        grid.rows
    }
}
