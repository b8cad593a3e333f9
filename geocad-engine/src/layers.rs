//! 图层目录与要素分类规则。
//!
//! 分类由一张有序规则表完成：每条规则是一个“标签谓词 → 类别”的函数，按顺序
//! 求值，第一条命中的规则决定类别，全部未命中时落到 [`FeatureCategory::Other`]。

use geocad_core::conversion::LayerToggles;
use geocad_core::document::{CadDocument, Layer, LineType, SymbolKind};
use geocad_core::geo::Tags;
use serde::Serialize;

use crate::processing::parse_leading_number;

/// 语义图层。名称与颜色由 [`LayerRegistry`] 统一给出。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum LayerKey {
    Default,
    Buildings,
    BldResidential,
    BldCommercial,
    BldIndustrial,
    BldInstitutional,
    BldGeneric,
    RoadsHighway,
    RoadsMajor,
    RoadsMinor,
    RoadsService,
    RoadsCurbs,
    Bridges,
    Tunnels,
    Furniture,
    Signals,
    Nature,
    Water,
    InfraWater,
    InfraPowerMt,
    InfraPowerBt,
    InfraPowerPoles,
    InfraPowerLight,
    Terrain,
    Contours,
    AnalysisSlope,
    SlopeFlat,
    SlopeMild,
    SlopeModerate,
    SlopeSteep,
    Labels,
    Dimensions,
    Grid,
    TitleBlock,
}

/// 图层样式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LayerSpec {
    pub name: &'static str,
    pub color: i16,
    pub line_type: LineType,
}

const fn spec(name: &'static str, color: i16) -> LayerSpec {
    LayerSpec {
        name,
        color,
        line_type: LineType::Continuous,
    }
}

const fn dashed(name: &'static str, color: i16) -> LayerSpec {
    LayerSpec {
        name,
        color,
        line_type: LineType::Dashed,
    }
}

/// 固定的图层目录（名称 + ACI 颜色 + 线型）。
#[derive(Debug, Default, Clone, Copy)]
pub struct LayerRegistry;

impl LayerRegistry {
    pub fn new() -> Self {
        Self
    }

    pub fn spec(&self, key: LayerKey) -> LayerSpec {
        match key {
            LayerKey::Default => spec("0", 7),
            LayerKey::Buildings => spec("BUILDINGS", 2),
            LayerKey::BldResidential => spec("BLD_RESIDENTIAL", 2),
            LayerKey::BldCommercial => spec("BLD_COMMERCIAL", 4),
            LayerKey::BldIndustrial => spec("BLD_INDUSTRIAL", 6),
            LayerKey::BldInstitutional => spec("BLD_INSTITUTIONAL", 3),
            LayerKey::BldGeneric => spec("BLD_GENERIC", 2),
            LayerKey::RoadsHighway => spec("ROADS_HIGHWAY", 1),
            LayerKey::RoadsMajor => spec("ROADS_MAJOR", 1),
            LayerKey::RoadsMinor => spec("ROADS_MINOR", 7),
            LayerKey::RoadsService => spec("ROADS_SERVICE", 252),
            LayerKey::RoadsCurbs => spec("ROADS_CURBS", 8),
            LayerKey::Bridges => spec("BRIDGES", 4),
            LayerKey::Tunnels => dashed("TUNNELS", 8),
            LayerKey::Furniture => spec("FURNITURE", 34),
            LayerKey::Signals => spec("SIGNALS", 1),
            LayerKey::Nature => spec("NATURE", 3),
            LayerKey::Water => spec("WATER", 5),
            LayerKey::InfraWater => spec("INFRA_WATER", 5),
            LayerKey::InfraPowerMt => spec("INFRA_POWER_MT", 10),
            LayerKey::InfraPowerBt => spec("INFRA_POWER_BT", 50),
            LayerKey::InfraPowerPoles => spec("INFRA_POWER_POLES", 7),
            LayerKey::InfraPowerLight => spec("INFRA_POWER_LIGHT", 2),
            LayerKey::Terrain => spec("TERRAIN", 9),
            LayerKey::Contours => spec("CONTOURS", 8),
            LayerKey::AnalysisSlope => spec("ANALYSIS_SLOPE", 1),
            LayerKey::SlopeFlat => spec("ANALYSIS_SLOPE_FLAT", 112),
            LayerKey::SlopeMild => spec("ANALYSIS_SLOPE_MILD", 2),
            LayerKey::SlopeModerate => spec("ANALYSIS_SLOPE_MODERATE", 30),
            LayerKey::SlopeSteep => spec("ANALYSIS_SLOPE_STEEP", 1),
            LayerKey::Labels => spec("LABELS", 7),
            LayerKey::Dimensions => spec("DIMENSIONS", 140),
            LayerKey::Grid => dashed("GRID", 251),
            LayerKey::TitleBlock => spec("TITLE_BLOCK", 7),
        }
    }

    /// 在文档中登记图层（带样式）并返回图层名。
    pub fn register(&self, document: &mut CadDocument, key: LayerKey) -> &'static str {
        let spec = self.spec(key);
        document.add_layer(Layer::styled(spec.name, spec.color, spec.line_type));
        spec.name
    }
}

/// 建筑用途分区。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Zoning {
    Residential,
    Commercial,
    Industrial,
    Institutional,
    Generic,
}

const ZONING_TABLE: &[(Zoning, &[&str])] = &[
    (
        Zoning::Residential,
        &["house", "residential", "apartments", "detached", "terrace", "dormitory"],
    ),
    (
        Zoning::Commercial,
        &["commercial", "retail", "office", "shop", "hotel", "supermarket"],
    ),
    (
        Zoning::Industrial,
        &["industrial", "warehouse", "factory", "manufacture"],
    ),
    (
        Zoning::Institutional,
        &[
            "school",
            "hospital",
            "university",
            "church",
            "public",
            "government",
            "civic",
            "college",
            "kindergarten",
        ],
    ),
];

impl Zoning {
    /// 依次查看 `building`、`building:use`、`amenity`、`landuse` 标签。
    pub fn from_tags(tags: &Tags) -> Self {
        ["building", "building:use", "amenity", "landuse"]
            .iter()
            .filter_map(|key| tags.get(*key))
            .find_map(|value| {
                ZONING_TABLE
                    .iter()
                    .find(|(_, values)| values.contains(&value.as_str()))
                    .map(|(zoning, _)| *zoning)
            })
            .unwrap_or(Zoning::Generic)
    }

    pub fn layer(self) -> LayerKey {
        match self {
            Zoning::Residential => LayerKey::BldResidential,
            Zoning::Commercial => LayerKey::BldCommercial,
            Zoning::Industrial => LayerKey::BldIndustrial,
            Zoning::Institutional => LayerKey::BldInstitutional,
            Zoning::Generic => LayerKey::BldGeneric,
        }
    }

    /// 填充图案名，写入轮廓的扩展数据。
    pub fn hatch_pattern(self) -> &'static str {
        match self {
            Zoning::Residential => "ANSI31",
            Zoning::Commercial => "ANSI37",
            Zoning::Industrial => "ANSI32",
            Zoning::Institutional => "ANSI34",
            Zoning::Generic => "SOLID",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Zoning::Residential => "residential",
            Zoning::Commercial => "commercial",
            Zoning::Industrial => "industrial",
            Zoning::Institutional => "institutional",
            Zoning::Generic => "generic",
        }
    }
}

/// 道路等级。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RoadClass {
    Highway,
    Major,
    Minor,
    Service,
}

const ROAD_CLASS_TABLE: &[(&str, RoadClass)] = &[
    ("motorway", RoadClass::Highway),
    ("motorway_link", RoadClass::Highway),
    ("trunk", RoadClass::Highway),
    ("trunk_link", RoadClass::Highway),
    ("primary", RoadClass::Major),
    ("primary_link", RoadClass::Major),
    ("secondary", RoadClass::Major),
    ("secondary_link", RoadClass::Major),
    ("tertiary", RoadClass::Major),
    ("tertiary_link", RoadClass::Major),
    ("residential", RoadClass::Minor),
    ("unclassified", RoadClass::Minor),
    ("living_street", RoadClass::Minor),
    ("pedestrian", RoadClass::Minor),
    ("road", RoadClass::Minor),
];

/// 路面总宽（米），未列出的等级取 [`DEFAULT_ROAD_WIDTH`]。
const ROAD_WIDTH_TABLE: &[(&str, f64)] = &[
    ("motorway", 20.0),
    ("trunk", 16.0),
    ("primary", 14.0),
    ("secondary", 12.0),
    ("tertiary", 10.0),
    ("residential", 8.0),
    ("service", 5.0),
    ("living_street", 6.0),
    ("pedestrian", 4.0),
    ("footway", 2.0),
    ("path", 2.0),
    ("cycleway", 2.0),
];

pub const DEFAULT_ROAD_WIDTH: f64 = 6.0;

impl RoadClass {
    /// 未列出的 `highway` 值（service、track、footway……）归为支路。
    pub fn from_highway(value: &str) -> Self {
        ROAD_CLASS_TABLE
            .iter()
            .find(|(name, _)| *name == value)
            .map_or(RoadClass::Service, |(_, class)| *class)
    }

    pub fn layer(self) -> LayerKey {
        match self {
            RoadClass::Highway => LayerKey::RoadsHighway,
            RoadClass::Major => LayerKey::RoadsMajor,
            RoadClass::Minor => LayerKey::RoadsMinor,
            RoadClass::Service => LayerKey::RoadsService,
        }
    }
}

/// 路面宽度：显式的 `width` 标签优先，其次按等级查表。
pub fn road_width(tags: &Tags) -> f64 {
    if let Some(width) = tags.get("width").and_then(|raw| parse_leading_number(raw)) {
        if width > 0.0 {
            return width;
        }
    }
    tags.get("highway")
        .and_then(|highway| {
            ROAD_WIDTH_TABLE
                .iter()
                .find(|(name, _)| name == highway)
                .map(|(_, width)| *width)
        })
        .unwrap_or(DEFAULT_ROAD_WIDTH)
}

/// 道路的结构形式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RoadStructure {
    AtGrade,
    Bridge,
    Tunnel,
}

impl RoadStructure {
    pub fn from_tags(tags: &Tags) -> Self {
        let flagged = |key: &str| tags.get(key).is_some_and(|value| value != "no");
        if flagged("bridge") {
            RoadStructure::Bridge
        } else if flagged("tunnel") {
            RoadStructure::Tunnel
        } else {
            RoadStructure::AtGrade
        }
    }
}

/// 坡度分级（度）：< 5 平缓，< 15 缓坡，< 30 中坡，其余陡坡。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SlopeClass {
    Flat,
    Mild,
    Moderate,
    Steep,
}

impl SlopeClass {
    pub fn from_degrees(degrees: f64) -> Self {
        if degrees < 5.0 {
            SlopeClass::Flat
        } else if degrees < 15.0 {
            SlopeClass::Mild
        } else if degrees < 30.0 {
            SlopeClass::Moderate
        } else {
            SlopeClass::Steep
        }
    }

    pub fn layer(self) -> LayerKey {
        match self {
            SlopeClass::Flat => LayerKey::SlopeFlat,
            SlopeClass::Mild => LayerKey::SlopeMild,
            SlopeClass::Moderate => LayerKey::SlopeModerate,
            SlopeClass::Steep => LayerKey::SlopeSteep,
        }
    }
}

/// 几何形态，用于区分点状符号与线/面要素。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryKind {
    Point,
    Path,
}

/// 分类结果。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum FeatureCategory {
    Building(Zoning),
    Road {
        class: RoadClass,
        structure: RoadStructure,
        width: f64,
    },
    Water,
    Vegetation,
    PowerLine { layer: LayerKey },
    Symbol { symbol: SymbolKind, layer: LayerKey },
    StreetFurniture,
    Other,
}

impl FeatureCategory {
    /// 该类别是否被图层开关启用。
    pub fn is_enabled(&self, toggles: &LayerToggles) -> bool {
        match self {
            FeatureCategory::Building(_) => toggles.buildings,
            FeatureCategory::Road { .. } => toggles.roads,
            FeatureCategory::Water | FeatureCategory::Vegetation => toggles.nature,
            FeatureCategory::Symbol {
                symbol: SymbolKind::Tree,
                ..
            } => toggles.nature,
            FeatureCategory::Symbol { .. }
            | FeatureCategory::StreetFurniture
            | FeatureCategory::PowerLine { .. } => toggles.furniture,
            FeatureCategory::Other => true,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FeatureCategory::Building(_) => "building",
            FeatureCategory::Road { .. } => "road",
            FeatureCategory::Water => "water",
            FeatureCategory::Vegetation => "vegetation",
            FeatureCategory::PowerLine { .. } => "power_line",
            FeatureCategory::Symbol { .. } => "symbol",
            FeatureCategory::StreetFurniture => "street_furniture",
            FeatureCategory::Other => "other",
        }
    }
}

type Rule = fn(&Tags, GeometryKind) -> Option<FeatureCategory>;

fn tag_is(tags: &Tags, key: &str, values: &[&str]) -> bool {
    tags.get(key)
        .is_some_and(|value| values.contains(&value.as_str()))
}

fn building_rule(tags: &Tags, kind: GeometryKind) -> Option<FeatureCategory> {
    let is_building = tags.contains_key("building") || tags.contains_key("building:part");
    (is_building && kind == GeometryKind::Path).then(|| FeatureCategory::Building(Zoning::from_tags(tags)))
}

fn point_symbol_rule(tags: &Tags, kind: GeometryKind) -> Option<FeatureCategory> {
    if kind != GeometryKind::Point {
        return None;
    }
    let (symbol, layer) = if tag_is(tags, "highway", &["traffic_signals"]) {
        (SymbolKind::TrafficSignal, LayerKey::Signals)
    } else if tag_is(tags, "highway", &["street_lamp"]) {
        (SymbolKind::Pole, LayerKey::InfraPowerLight)
    } else if tag_is(tags, "emergency", &["fire_hydrant"]) {
        (SymbolKind::Hydrant, LayerKey::InfraWater)
    } else if tag_is(tags, "natural", &["tree"]) {
        (SymbolKind::Tree, LayerKey::Nature)
    } else if tag_is(tags, "power", &["pole", "tower"]) {
        (SymbolKind::Pole, LayerKey::InfraPowerPoles)
    } else {
        return None;
    };
    Some(FeatureCategory::Symbol { symbol, layer })
}

fn furniture_rule(tags: &Tags, kind: GeometryKind) -> Option<FeatureCategory> {
    let furniture = tag_is(
        tags,
        "amenity",
        &["bench", "waste_basket", "bicycle_parking", "post_box"],
    ) || tag_is(tags, "leisure", &["picnic_table"]);
    (furniture && kind == GeometryKind::Point).then_some(FeatureCategory::StreetFurniture)
}

fn road_rule(tags: &Tags, kind: GeometryKind) -> Option<FeatureCategory> {
    if kind != GeometryKind::Path {
        return None;
    }
    let highway = tags.get("highway")?;
    Some(FeatureCategory::Road {
        class: RoadClass::from_highway(highway),
        structure: RoadStructure::from_tags(tags),
        width: road_width(tags),
    })
}

fn power_line_rule(tags: &Tags, kind: GeometryKind) -> Option<FeatureCategory> {
    if kind != GeometryKind::Path {
        return None;
    }
    if tag_is(tags, "power", &["line"]) {
        Some(FeatureCategory::PowerLine {
            layer: LayerKey::InfraPowerMt,
        })
    } else if tag_is(tags, "power", &["minor_line", "cable"]) {
        Some(FeatureCategory::PowerLine {
            layer: LayerKey::InfraPowerBt,
        })
    } else {
        None
    }
}

fn water_rule(tags: &Tags, kind: GeometryKind) -> Option<FeatureCategory> {
    let water = tags.contains_key("waterway")
        || tag_is(tags, "natural", &["water"])
        || tag_is(tags, "landuse", &["reservoir"]);
    (water && kind == GeometryKind::Path).then_some(FeatureCategory::Water)
}

fn vegetation_rule(tags: &Tags, kind: GeometryKind) -> Option<FeatureCategory> {
    let vegetation = tags.contains_key("natural")
        || tag_is(
            tags,
            "landuse",
            &["grass", "forest", "meadow", "orchard", "farmland"],
        )
        || tag_is(tags, "leisure", &["park", "garden"]);
    (vegetation && kind == GeometryKind::Path).then_some(FeatureCategory::Vegetation)
}

/// 有序分类规则表。
pub const CLASSIFICATION_RULES: &[(&str, Rule)] = &[
    ("building", building_rule),
    ("point_symbol", point_symbol_rule),
    ("street_furniture", furniture_rule),
    ("road", road_rule),
    ("power_line", power_line_rule),
    ("water", water_rule),
    ("vegetation", vegetation_rule),
];

/// 按规则表顺序分类，总能得到一个类别。
pub fn classify(tags: &Tags, kind: GeometryKind) -> FeatureCategory {
    CLASSIFICATION_RULES
        .iter()
        .find_map(|(_, rule)| rule(tags, kind))
        .unwrap_or(FeatureCategory::Other)
}

/// 类别对应的主图层；点状“其他”要素没有图层（不输出）。
pub fn primary_layer(category: &FeatureCategory, kind: GeometryKind) -> Option<LayerKey> {
    match category {
        FeatureCategory::Building(zoning) => Some(zoning.layer()),
        FeatureCategory::Road {
            class, structure, ..
        } => Some(match structure {
            RoadStructure::Bridge => LayerKey::Bridges,
            RoadStructure::Tunnel => LayerKey::Tunnels,
            RoadStructure::AtGrade => class.layer(),
        }),
        FeatureCategory::Water => Some(LayerKey::Water),
        FeatureCategory::Vegetation => Some(LayerKey::Nature),
        FeatureCategory::PowerLine { layer } | FeatureCategory::Symbol { layer, .. } => {
            Some(*layer)
        }
        FeatureCategory::StreetFurniture => Some(LayerKey::Furniture),
        FeatureCategory::Other => match kind {
            GeometryKind::Point => None,
            GeometryKind::Path => Some(LayerKey::Default),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn buildings_are_zoned_and_fall_back_to_generic() {
        let house = classify(&tags(&[("building", "house")]), GeometryKind::Path);
        assert_eq!(house, FeatureCategory::Building(Zoning::Residential));

        let school = classify(
            &tags(&[("building", "yes"), ("amenity", "school")]),
            GeometryKind::Path,
        );
        assert_eq!(school, FeatureCategory::Building(Zoning::Institutional));

        let unknown = classify(&tags(&[("building", "yes")]), GeometryKind::Path);
        assert_eq!(unknown, FeatureCategory::Building(Zoning::Generic));
        assert_eq!(
            primary_layer(&unknown, GeometryKind::Path),
            Some(LayerKey::BldGeneric)
        );
        assert_eq!(Zoning::Commercial.hatch_pattern(), "ANSI37");
    }

    #[test]
    fn roads_use_class_table_and_structures() {
        let primary = classify(&tags(&[("highway", "primary")]), GeometryKind::Path);
        assert_eq!(
            primary,
            FeatureCategory::Road {
                class: RoadClass::Major,
                structure: RoadStructure::AtGrade,
                width: 14.0,
            }
        );
        let bridge = classify(
            &tags(&[("highway", "motorway"), ("bridge", "yes")]),
            GeometryKind::Path,
        );
        assert_eq!(
            primary_layer(&bridge, GeometryKind::Path),
            Some(LayerKey::Bridges)
        );
        assert_eq!(RoadClass::from_highway("track"), RoadClass::Service);
        assert_eq!(road_width(&tags(&[("highway", "busway")])), DEFAULT_ROAD_WIDTH);
        assert_eq!(
            road_width(&tags(&[("highway", "primary"), ("width", "9.5")])),
            9.5
        );
    }

    #[test]
    fn rule_order_is_respected() {
        // 既是建筑又带 highway 标签时按建筑处理。
        let both = classify(
            &tags(&[("building", "yes"), ("highway", "service")]),
            GeometryKind::Path,
        );
        assert!(matches!(both, FeatureCategory::Building(_)));

        let signal = classify(&tags(&[("highway", "traffic_signals")]), GeometryKind::Point);
        assert_eq!(
            signal,
            FeatureCategory::Symbol {
                symbol: SymbolKind::TrafficSignal,
                layer: LayerKey::Signals,
            }
        );

        let pond = classify(&tags(&[("natural", "water")]), GeometryKind::Path);
        assert_eq!(pond, FeatureCategory::Water);
        let wood = classify(&tags(&[("natural", "wood")]), GeometryKind::Path);
        assert_eq!(wood, FeatureCategory::Vegetation);
    }

    #[test]
    fn unmatched_features_resolve_to_other() {
        let fence = classify(&tags(&[("barrier", "fence")]), GeometryKind::Path);
        assert_eq!(fence, FeatureCategory::Other);
        assert_eq!(
            primary_layer(&fence, GeometryKind::Path),
            Some(LayerKey::Default)
        );
        assert_eq!(primary_layer(&fence, GeometryKind::Point), None);
    }

    #[test]
    fn toggles_gate_categories() {
        let mut toggles = LayerToggles::default();
        toggles.nature = false;
        let tree = FeatureCategory::Symbol {
            symbol: SymbolKind::Tree,
            layer: LayerKey::Nature,
        };
        assert!(!tree.is_enabled(&toggles));
        let hydrant = FeatureCategory::Symbol {
            symbol: SymbolKind::Hydrant,
            layer: LayerKey::InfraWater,
        };
        assert!(hydrant.is_enabled(&toggles));
    }

    #[test]
    fn registry_registers_styled_layers() {
        let mut document = CadDocument::new();
        let registry = LayerRegistry::new();
        let name = registry.register(&mut document, LayerKey::SlopeSteep);
        assert_eq!(name, "ANALYSIS_SLOPE_STEEP");
        assert_eq!(document.layer(name).map(|layer| layer.color), Some(1));
        assert_eq!(SlopeClass::from_degrees(4.9), SlopeClass::Flat);
        assert_eq!(SlopeClass::from_degrees(15.0), SlopeClass::Moderate);
        assert_eq!(SlopeClass::from_degrees(45.0), SlopeClass::Steep);
    }
}
