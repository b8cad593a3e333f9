//! 转换选项。客户端提交的是宽松的 [`ConversionOptions`]，解析校验后得到
//! 完全确定处理过程的 [`ConversionConfig`]。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OptionError {
    #[error("无法识别的投影模式: {0}")]
    UnknownProjection(String),
    #[error("无法识别的简化级别: {0}")]
    UnknownSimplification(String),
    #[error("等高线间距必须为正数，当前为 {0}")]
    ContourInterval(f64),
    #[error("里程桩间距不能为负数，当前为 {0}")]
    StationInterval(f64),
    #[error("UTM 分带号必须在 1..=60 之间，当前为 {0}")]
    UtmZone(u8),
    #[error("等高线间距 {interval} 会产生 {count} 条等高线，超过上限 {limit}")]
    ContourLevels {
        interval: f64,
        count: f64,
        limit: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionMode {
    #[default]
    Local,
    Utm,
}

impl ProjectionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectionMode::Local => "local",
            ProjectionMode::Utm => "utm",
        }
    }
}

impl FromStr for ProjectionMode {
    type Err = OptionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(ProjectionMode::Local),
            "utm" => Ok(ProjectionMode::Utm),
            _ => Err(OptionError::UnknownProjection(value.to_string())),
        }
    }
}

impl fmt::Display for ProjectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimplificationLevel {
    #[default]
    Off,
    Low,
    Medium,
    High,
}

impl SimplificationLevel {
    /// Douglas-Peucker 容差（米）。
    pub fn tolerance(self) -> f64 {
        match self {
            SimplificationLevel::Off => 0.0,
            SimplificationLevel::Low => 0.5,
            SimplificationLevel::Medium => 1.5,
            SimplificationLevel::High => 4.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SimplificationLevel::Off => "off",
            SimplificationLevel::Low => "low",
            SimplificationLevel::Medium => "medium",
            SimplificationLevel::High => "high",
        }
    }
}

impl FromStr for SimplificationLevel {
    type Err = OptionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(SimplificationLevel::Off),
            "low" => Ok(SimplificationLevel::Low),
            "medium" => Ok(SimplificationLevel::Medium),
            "high" => Ok(SimplificationLevel::High),
            _ => Err(OptionError::UnknownSimplification(value.to_string())),
        }
    }
}

impl fmt::Display for SimplificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 图层开关。缺省时除坡度分析与坐标网格外全部开启。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayerToggles {
    pub buildings: bool,
    pub roads: bool,
    pub curbs: bool,
    pub nature: bool,
    pub terrain: bool,
    pub contours: bool,
    pub slope_analysis: bool,
    pub furniture: bool,
    pub labels: bool,
    pub dimensions: bool,
    pub grid: bool,
}

impl Default for LayerToggles {
    fn default() -> Self {
        Self {
            buildings: true,
            roads: true,
            curbs: true,
            nature: true,
            terrain: true,
            contours: true,
            slope_analysis: false,
            furniture: true,
            labels: true,
            dimensions: true,
            grid: false,
        }
    }
}

impl LayerToggles {
    pub fn all_off() -> Self {
        Self {
            buildings: false,
            roads: false,
            curbs: false,
            nature: false,
            terrain: false,
            contours: false,
            slope_analysis: false,
            furniture: false,
            labels: false,
            dimensions: false,
            grid: false,
        }
    }
}

/// 图签信息。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectMetadata {
    pub project_name: String,
    pub company_name: String,
    pub engineer_name: String,
    pub date: String,
    pub scale: String,
    pub revision: String,
}

impl ProjectMetadata {
    /// 图签中按顺序排列的（标题，内容）行。
    pub fn rows(&self) -> [(&'static str, &str); 6] {
        [
            ("PROJECT", self.project_name.as_str()),
            ("COMPANY", self.company_name.as_str()),
            ("ENGINEER", self.engineer_name.as_str()),
            ("DATE", self.date.as_str()),
            ("SCALE", self.scale.as_str()),
            ("REVISION", self.revision.as_str()),
        ]
    }
}

/// 客户端提交的原始选项，字符串字段在 [`ConversionOptions::resolve`] 中校验。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConversionOptions {
    pub projection: Option<String>,
    #[serde(alias = "simplificationLevel")]
    pub simplification: Option<String>,
    pub orthogonalize: Option<bool>,
    pub contour_interval: Option<f64>,
    pub station_interval: Option<f64>,
    #[serde(alias = "layerToggles")]
    pub layers: Option<LayerToggles>,
    pub project_metadata: Option<ProjectMetadata>,
    pub utm_zone: Option<u8>,
}

impl ConversionOptions {
    pub fn resolve(&self) -> Result<ConversionConfig, OptionError> {
        let defaults = ConversionConfig::default();
        let config = ConversionConfig {
            projection: match &self.projection {
                Some(raw) => raw.parse()?,
                None => defaults.projection,
            },
            simplification: match &self.simplification {
                Some(raw) => raw.parse()?,
                None => defaults.simplification,
            },
            orthogonalize: self.orthogonalize.unwrap_or(defaults.orthogonalize),
            contour_interval: self.contour_interval.unwrap_or(defaults.contour_interval),
            station_interval: self.station_interval.unwrap_or(defaults.station_interval),
            layers: self.layers.unwrap_or(defaults.layers),
            project_metadata: self.project_metadata.clone(),
            utm_zone: self.utm_zone,
        };
        config.validate()?;
        Ok(config)
    }
}

/// 一次转换的完整配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionConfig {
    pub projection: ProjectionMode,
    pub simplification: SimplificationLevel,
    pub orthogonalize: bool,
    pub contour_interval: f64,
    /// 0 表示不生成里程桩。
    pub station_interval: f64,
    pub layers: LayerToggles,
    pub project_metadata: Option<ProjectMetadata>,
    /// UTM 分带覆盖；缺省时由原点经度推算。
    pub utm_zone: Option<u8>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            projection: ProjectionMode::Local,
            simplification: SimplificationLevel::Off,
            orthogonalize: true,
            contour_interval: 1.0,
            station_interval: 20.0,
            layers: LayerToggles::default(),
            project_metadata: None,
            utm_zone: None,
        }
    }
}

impl ConversionConfig {
    pub fn validate(&self) -> Result<(), OptionError> {
        if !self.contour_interval.is_finite() || self.contour_interval <= 0.0 {
            return Err(OptionError::ContourInterval(self.contour_interval));
        }
        if !self.station_interval.is_finite() || self.station_interval < 0.0 {
            return Err(OptionError::StationInterval(self.station_interval));
        }
        if let Some(zone) = self.utm_zone {
            if !(1..=60).contains(&zone) {
                return Err(OptionError::UtmZone(zone));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_client_conventions() {
        let options: ConversionOptions = serde_json::from_str("{}").expect("empty options");
        let config = options.resolve().expect("defaults are valid");
        assert_eq!(config, ConversionConfig::default());
        assert!(config.layers.buildings);
        assert!(!config.layers.slope_analysis);
        assert!(!config.layers.grid);
    }

    #[test]
    fn aliases_and_partial_toggles_are_accepted() {
        let json = r#"{
            "projection": "UTM",
            "simplificationLevel": "medium",
            "contourInterval": 5,
            "layerToggles": {"buildings": false, "grid": true}
        }"#;
        let options: ConversionOptions = serde_json::from_str(json).expect("options json");
        let config = options.resolve().expect("valid options");
        assert_eq!(config.projection, ProjectionMode::Utm);
        assert_eq!(config.simplification, SimplificationLevel::Medium);
        assert!((config.simplification.tolerance() - 1.5).abs() < 1e-12);
        assert!(!config.layers.buildings);
        assert!(config.layers.grid);
        assert!(config.layers.roads);
    }

    #[test]
    fn unknown_modes_and_bad_intervals_are_rejected() {
        let options = ConversionOptions {
            projection: Some("mercator".into()),
            ..Default::default()
        };
        assert_eq!(
            options.resolve(),
            Err(OptionError::UnknownProjection("mercator".into()))
        );

        let options = ConversionOptions {
            contour_interval: Some(0.0),
            ..Default::default()
        };
        assert_eq!(options.resolve(), Err(OptionError::ContourInterval(0.0)));

        let options = ConversionOptions {
            station_interval: Some(-1.0),
            ..Default::default()
        };
        assert!(matches!(
            options.resolve(),
            Err(OptionError::StationInterval(_))
        ));

        let options = ConversionOptions {
            utm_zone: Some(61),
            ..Default::default()
        };
        assert_eq!(options.resolve(), Err(OptionError::UtmZone(61)));
    }
}
