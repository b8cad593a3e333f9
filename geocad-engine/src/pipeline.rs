//! 转换流水线：投影、几何加工、分类与编码串成一次完整的 DXF 生成。
//!
//! 进度分五段：等高线 (0–10)、要素主循环 (10–80)、坐标网格 (80–85)、
//! 地形网格与坡度分析 (85–95)、图签与编码 (95–100)。单个要素的失败只记为跳过。

use std::borrow::Cow;

use geocad_core::conversion::{ConversionConfig, ConversionOptions, ProjectionMode};
use geocad_core::document::{APPLICATION_NAME, CadDocument, ExtendedData};
use geocad_core::geo::{ElevationGrid, GeoFeature, GeoLocation, Tags};
use geocad_core::geometry::{Bounds2D, Point2, Vector2};
use geocad_io::DxfWriter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{ConversionError, FeatureError};
use crate::layers::{
    FeatureCategory, GeometryKind, LayerKey, LayerRegistry, RoadStructure, SlopeClass, Zoning,
    classify, primary_layer,
};
use crate::processing::{
    FLOW_RELIEF_THRESHOLD, STATION_TICK_HALF_LENGTH, building_height, cell_slopes, dominant_angle,
    extrude_ring, flow_vectors, offset_polyline, offset_ring, orthogonalize, readable_rotation, ring_centroid,
    signed_area, simplify, simplify_ring, stations, validate_line, validate_ring,
};
use crate::progress::{NoopProgress, Phase, ProgressSink};
use crate::projection::Projector;
use crate::terrain::{
    ProjectedGrid, TerrainSampler, check_contour_levels, contour_levels, is_index_level,
    trace_contours,
};

/// 主循环每处理这么多要素上报一次进度、检查取消并让出线程。
pub const YIELD_EVERY: usize = 100;

const LABEL_HEIGHT: f64 = 1.5;
const DIMENSION_TEXT_HEIGHT: f64 = 0.8;
const DIMENSION_OFFSET: f64 = 1.5;
const MIN_DIMENSIONED_EDGE: f64 = 0.5;
const STATION_TEXT_HEIGHT: f64 = 1.0;
const CONTOUR_LABEL_HEIGHT: f64 = 1.2;
const FURNITURE_RADIUS: f64 = 0.4;
const GRID_TARGET_LINES: f64 = 8.0;
const GRID_TEXT_HEIGHT: f64 = 2.0;
const TITLE_ROW_HEIGHT: f64 = 5.0;
const TITLE_MIN_WIDTH: f64 = 120.0;
const TITLE_MARGIN: f64 = 10.0;

/// 一次转换的输入。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRequest {
    pub features: Vec<GeoFeature>,
    pub origin: GeoLocation,
    #[serde(default)]
    pub elevation: ElevationGrid,
    #[serde(default)]
    pub options: ConversionOptions,
}

impl ConversionRequest {
    pub fn new(features: Vec<GeoFeature>, origin: GeoLocation) -> Self {
        Self {
            features,
            origin,
            elevation: ElevationGrid::empty(),
            options: ConversionOptions::default(),
        }
    }

    pub fn with_elevation(mut self, elevation: ElevationGrid) -> Self {
        self.elevation = elevation;
        self
    }

    pub fn with_options(mut self, options: ConversionOptions) -> Self {
        self.options = options;
        self
    }

    /// 在启动任何处理之前检查全部前置条件。
    pub fn validate(&self) -> Result<ConversionConfig, ConversionError> {
        let config = self.options.resolve()?;
        if !self.origin.is_finite() {
            return Err(ConversionError::InvalidOrigin {
                lat: self.origin.lat,
                lng: self.origin.lng,
            });
        }
        if config.layers.contours {
            check_contour_levels(self.elevation.elevation_range(), config.contour_interval)?;
        }
        Ok(config)
    }
}

/// 被跳过的要素及原因。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFeature {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionReport {
    pub feature_count: usize,
    /// 至少产出一个实体的要素数。
    pub encoded: usize,
    /// 因图层开关关闭而忽略的要素数。
    pub filtered: usize,
    pub skipped: Vec<SkippedFeature>,
    pub entity_count: usize,
    pub layer_count: usize,
    pub byte_count: usize,
}

#[derive(Debug, Clone)]
pub struct ConversionOutput {
    pub bytes: Vec<u8>,
    pub document: CadDocument,
    pub report: ConversionReport,
}

/// 同步转换入口，不上报进度。
pub fn convert(request: &ConversionRequest) -> Result<ConversionOutput, ConversionError> {
    convert_with_progress(request, &NoopProgress)
}

pub fn convert_with_progress(
    request: &ConversionRequest,
    progress: &dyn ProgressSink,
) -> Result<ConversionOutput, ConversionError> {
    let config = request.validate()?;
    info!(
        features = request.features.len(),
        projection = %config.projection,
        simplification = %config.simplification,
        "开始转换"
    );

    let projector = Projector::new(request.origin.clone(), config.projection, config.utm_zone);
    let grid = ProjectedGrid::from_grid(&request.elevation, &projector);
    let sampler = TerrainSampler::from_projected(grid);
    let mut builder = DrawingBuilder::new(&config, &projector, &sampler);
    builder.report.feature_count = request.features.len();

    progress.report(Phase::CONTOURS.start, "生成等高线");
    builder.draw_contours()?;
    checkpoint(progress, Phase::CONTOURS.end, "等高线完成")?;

    let total = request.features.len();
    for (index, feature) in request.features.iter().enumerate() {
        if index > 0 && index % YIELD_EVERY == 0 {
            checkpoint(
                progress,
                Phase::FEATURES.at(index, total),
                &format!("处理要素 {index}/{total}"),
            )?;
            std::thread::yield_now();
        }
        builder.add_feature(feature);
    }
    checkpoint(progress, Phase::FEATURES.end, "要素处理完成")?;

    builder.draw_grid();
    checkpoint(progress, Phase::GRID.end, "坐标网格完成")?;

    builder.draw_terrain();
    checkpoint(progress, Phase::TERRAIN.end, "地形分析完成")?;

    builder.draw_title_block();
    builder.draw_projection_label();
    let (document, mut report) = builder.finish();
    let bytes = DxfWriter::new().encode(&document)?;
    report.byte_count = bytes.len();
    progress.report(Phase::ASSEMBLY.end, "转换完成");

    info!(
        encoded = report.encoded,
        skipped = report.skipped.len(),
        entities = report.entity_count,
        bytes = report.byte_count,
        "转换完成"
    );
    Ok(ConversionOutput {
        bytes,
        document,
        report,
    })
}

fn checkpoint(progress: &dyn ProgressSink, pct: u8, message: &str) -> Result<(), ConversionError> {
    if progress.is_cancelled() {
        info!(progress = pct, "转换被取消");
        return Err(ConversionError::Cancelled);
    }
    progress.report(pct, message);
    Ok(())
}

/// 已投影、待分类的要素几何。
enum Shape {
    Point(Point2),
    Line(Vec<Point2>),
    Area(Vec<Point2>),
}

impl Shape {
    fn kind(&self) -> GeometryKind {
        match self {
            Shape::Point(_) => GeometryKind::Point,
            Shape::Line(_) | Shape::Area(_) => GeometryKind::Path,
        }
    }
}

struct DrawingBuilder<'a> {
    config: &'a ConversionConfig,
    projector: &'a Projector,
    sampler: &'a TerrainSampler,
    registry: LayerRegistry,
    document: CadDocument,
    report: ConversionReport,
}

impl<'a> DrawingBuilder<'a> {
    fn new(
        config: &'a ConversionConfig,
        projector: &'a Projector,
        sampler: &'a TerrainSampler,
    ) -> Self {
        Self {
            config,
            projector,
            sampler,
            registry: LayerRegistry::new(),
            document: CadDocument::new(),
            report: ConversionReport::default(),
        }
    }

    fn layer(&mut self, key: LayerKey) -> &'static str {
        self.registry.register(&mut self.document, key)
    }

    fn finish(self) -> (CadDocument, ConversionReport) {
        let mut report = self.report;
        report.entity_count = self.document.entity_count();
        report.layer_count = self.document.layers().count();
        (self.document, report)
    }

    fn skip(&mut self, id: &str, error: &FeatureError) {
        warn!(feature = id, reason = %error, "要素已跳过");
        self.report.skipped.push(SkippedFeature {
            id: id.to_string(),
            reason: error.to_string(),
        });
    }

    fn add_feature(&mut self, feature: &GeoFeature) {
        match self.process(feature, Cow::Borrowed(feature.tags()), false) {
            Ok(true) => self.report.encoded += 1,
            Ok(false) => {}
            Err(error) => self.skip(feature.id(), &error),
        }
    }

    /// 处理一个要素，返回是否产出了实体。关系的成员各自独立处理。
    fn process(
        &mut self,
        feature: &GeoFeature,
        tags: Cow<'_, Tags>,
        inner: bool,
    ) -> Result<bool, FeatureError> {
        if let GeoFeature::Relation { members, .. } = feature {
            if members.is_empty() {
                return Err(FeatureError::MissingGeometry);
            }
            let mut produced = false;
            for member in members {
                let mut merged = tags.clone().into_owned();
                for (key, value) in member.feature.tags() {
                    merged.insert(key.clone(), value.clone());
                }
                let member_inner = inner || member.role == "inner";
                match self.process(&member.feature, Cow::Owned(merged), member_inner) {
                    Ok(done) => produced |= done,
                    Err(error) => {
                        let id = format!("{}:{}", feature.id(), member.feature.id());
                        self.skip(&id, &error);
                    }
                }
            }
            return Ok(produced);
        }

        let shape = self.project(feature)?;
        let category = classify(&tags, shape.kind());
        if !category.is_enabled(&self.config.layers) {
            self.report.filtered += 1;
            return Ok(false);
        }
        let Some(layer_key) = primary_layer(&category, shape.kind()) else {
            return Ok(false);
        };
        debug!(feature = feature.id(), category = category.name(), "要素分类");

        match (category, shape) {
            (FeatureCategory::Building(zoning), Shape::Line(points) | Shape::Area(points)) => {
                self.draw_building(feature.id(), &tags, zoning, layer_key, &points, inner)?;
            }
            (FeatureCategory::Road { structure, width, .. }, Shape::Line(points)) => {
                self.draw_road(feature.id(), &tags, structure, width, layer_key, &points, false)?;
            }
            (FeatureCategory::Road { structure, width, .. }, Shape::Area(points)) => {
                self.draw_road(feature.id(), &tags, structure, width, layer_key, &points, true)?;
            }
            (FeatureCategory::Symbol { symbol, .. }, Shape::Point(point)) => {
                let layer = self.layer(layer_key);
                self.document.add_symbol(symbol, point, 0.0, layer);
            }
            (FeatureCategory::StreetFurniture, Shape::Point(point)) => {
                let layer = self.layer(layer_key);
                self.document.add_circle(point, FURNITURE_RADIUS, layer);
            }
            (category, Shape::Line(points)) => {
                let line = simplify(&validate_line(&points)?, self.tolerance());
                let layer = self.layer(layer_key);
                let id = self.document.add_polyline(line, false, layer);
                self.document
                    .attach_xdata(id, feature_xdata(feature.id(), category.name(), &tags));
            }
            (category, Shape::Area(points)) => {
                let ring = simplify_ring(&validate_ring(&points)?, self.tolerance());
                let layer = self.layer(layer_key);
                let id = self.document.add_polyline(open_ring(&ring), true, layer);
                self.document
                    .attach_xdata(id, feature_xdata(feature.id(), category.name(), &tags));
            }
            (_, Shape::Point(_)) => return Ok(false),
        }
        Ok(true)
    }

    fn tolerance(&self) -> f64 {
        self.config.simplification.tolerance()
    }

    fn project(&self, feature: &GeoFeature) -> Result<Shape, FeatureError> {
        let finite: Vec<&GeoLocation> = feature
            .coordinates()
            .iter()
            .filter(|location| location.is_finite())
            .collect();
        let projected: Vec<Point2> = finite
            .iter()
            .map(|location| self.projector.project(location))
            .collect();
        match feature {
            GeoFeature::Point { .. } => projected
                .first()
                .copied()
                .map(Shape::Point)
                .ok_or(FeatureError::MissingGeometry),
            GeoFeature::Line { .. } if projected.is_empty() => Err(FeatureError::MissingGeometry),
            GeoFeature::Area { .. } if projected.is_empty() => Err(FeatureError::MissingGeometry),
            GeoFeature::Line { .. } => Ok(Shape::Line(projected)),
            GeoFeature::Area { .. } => Ok(Shape::Area(projected)),
            GeoFeature::Relation { .. } => Err(FeatureError::MissingGeometry),
        }
    }

    fn draw_building(
        &mut self,
        id: &str,
        tags: &Tags,
        zoning: Zoning,
        layer_key: LayerKey,
        points: &[Point2],
        inner: bool,
    ) -> Result<(), FeatureError> {
        let ring = simplify_ring(&validate_ring(points)?, self.tolerance());
        let (ring, angle) = if self.config.orthogonalize {
            let squared = orthogonalize(&ring);
            (squared.ring, squared.angle)
        } else {
            let angle = dominant_angle(&ring).unwrap_or(0.0);
            (ring, angle)
        };
        let height = building_height(tags);

        let layer = self.layer(layer_key);
        let footprint = self.document.add_polyline(open_ring(&ring), true, layer);
        let xdata = feature_xdata(id, "building", tags)
            .with("zoning", zoning.as_str())
            .with("hatch", zoning.hatch_pattern())
            .with("height", format!("{height:.2}"));
        self.document.attach_xdata(footprint, xdata);

        let centroid = ring_centroid(&ring);
        if !inner {
            let base = self.sampler.elevation_at(centroid.x(), centroid.y());
            let solids = self.layer(LayerKey::Buildings);
            for face in extrude_ring(&ring, base, height) {
                self.document.add_face3d(face, solids);
            }
        }

        if self.config.layers.labels {
            let labels = self.layer(LayerKey::Labels);
            let rotation = readable_rotation(angle);
            self.document.add_text(
                centroid,
                format!("H={height:.1}m"),
                LABEL_HEIGHT,
                rotation,
                labels,
            );
            if let Some(name) = tags.get("name") {
                let below = Vector2::new(angle.sin(), -angle.cos()).scale(LABEL_HEIGHT * 1.8);
                self.document
                    .add_text(centroid.translate(below), name.as_str(), LABEL_HEIGHT, rotation, labels);
            }
        }

        if self.config.layers.dimensions {
            self.draw_edge_dimensions(&ring);
        }
        Ok(())
    }

    /// 在每条边外侧标注边长。
    fn draw_edge_dimensions(&mut self, ring: &[Point2]) {
        let layer = self.layer(LayerKey::Dimensions);
        // 逆时针环的左法线朝内。
        let outward = if signed_area(ring) > 0.0 { -1.0 } else { 1.0 };
        for pair in ring.windows(2) {
            let edge = pair[0].vector_to(pair[1]);
            let length = edge.length();
            if length < MIN_DIMENSIONED_EDGE {
                continue;
            }
            let Some(direction) = edge.normalize() else {
                continue;
            };
            let anchor = pair[0]
                .lerp(pair[1], 0.5)
                .translate(direction.perp().scale(outward * DIMENSION_OFFSET));
            self.document.add_text(
                anchor,
                format!("{length:.2}"),
                DIMENSION_TEXT_HEIGHT,
                readable_rotation(edge.angle()),
                layer,
            );
        }
    }

    fn draw_road(
        &mut self,
        id: &str,
        tags: &Tags,
        structure: RoadStructure,
        width: f64,
        layer_key: LayerKey,
        points: &[Point2],
        closed: bool,
    ) -> Result<(), FeatureError> {
        // 闭合道路（环岛等）的中心线保留首尾重复点，里程沿整圈计算。
        let centerline = if closed {
            simplify_ring(&validate_ring(points)?, self.tolerance())
        } else {
            simplify(&validate_line(points)?, self.tolerance())
        };
        let layer = self.layer(layer_key);
        let road = if closed {
            self.document.add_polyline(open_ring(&centerline), true, layer)
        } else {
            self.document.add_polyline(centerline.clone(), false, layer)
        };
        let mut xdata = feature_xdata(id, "road", tags).with("width", format!("{width:.2}"));
        if structure != RoadStructure::AtGrade {
            xdata.push("structure", format!("{structure:?}").to_lowercase());
        }
        self.document.attach_xdata(road, xdata);

        if self.config.layers.curbs {
            let curbs = self.layer(LayerKey::RoadsCurbs);
            for side in [1.0, -1.0] {
                let distance = side * width / 2.0;
                if closed {
                    let edge = offset_ring(&centerline, distance);
                    self.document.add_polyline(edge, true, curbs);
                } else {
                    let edge = offset_polyline(&centerline, distance);
                    self.document.add_polyline(edge, false, curbs);
                }
            }
        }

        if self.config.layers.dimensions && self.config.station_interval > 0.0 {
            let dimensions = self.layer(LayerKey::Dimensions);
            for station in stations(&centerline, self.config.station_interval) {
                let (start, end) = station.tick(STATION_TICK_HALF_LENGTH);
                self.document
                    .add_line(start.with_z(0.0), end.with_z(0.0), dimensions);
                let normal = Vector2::new(-station.tangent.sin(), station.tangent.cos());
                let anchor = station
                    .position
                    .translate(normal.scale(STATION_TICK_HALF_LENGTH + 0.5));
                self.document.add_text(
                    anchor,
                    station.label(),
                    STATION_TEXT_HEIGHT,
                    station.label_rotation(),
                    dimensions,
                );
            }
        }

        if self.config.layers.labels {
            if let Some(name) = tags.get("name") {
                let labels = self.layer(LayerKey::Labels);
                // 折线至少两个顶点，取中间一段。
                let middle = (centerline.len() / 2).max(1);
                let (a, b) = (centerline[middle - 1], centerline[middle]);
                self.document.add_text(
                    a.lerp(b, 0.5),
                    name.as_str(),
                    LABEL_HEIGHT,
                    readable_rotation(a.vector_to(b).angle()),
                    labels,
                );
            }
        }
        Ok(())
    }

    fn draw_contours(&mut self) -> Result<(), ConversionError> {
        if !self.config.layers.contours || self.sampler.is_empty() {
            return Ok(());
        }
        let sampler = self.sampler;
        let grid = sampler.grid();
        let interval = self.config.contour_interval;
        let levels = contour_levels(grid.elevation_range(), interval)?;
        debug!(levels = levels.len(), interval, "等高线层数");
        let layer = self.layer(LayerKey::Contours);
        for level in levels {
            let labelled = self.config.layers.labels && is_index_level(level, interval);
            for contour in trace_contours(grid, level) {
                let anchor = contour.points.get(contour.points.len() / 2).copied();
                if let Some(anchor) = anchor.filter(|_| labelled) {
                    self.document.add_text(
                        anchor,
                        format_level(level),
                        CONTOUR_LABEL_HEIGHT,
                        0.0,
                        layer,
                    );
                }
                self.document
                    .add_polyline_at_elevation(contour.points, contour.closed, level, layer);
            }
        }
        Ok(())
    }

    fn draw_grid(&mut self) {
        if !self.config.layers.grid {
            return;
        }
        let Some(bounds) = self.document.bounds() else {
            return;
        };
        let step = nice_step(bounds.width().max(bounds.height()) / GRID_TARGET_LINES);
        if step <= 0.0 {
            return;
        }
        let layer = self.layer(LayerKey::Grid);
        let (min, max) = (bounds.min(), bounds.max());
        let x0 = (min.x() / step).floor() as i64;
        let x1 = (max.x() / step).ceil() as i64;
        let y0 = (min.y() / step).floor() as i64;
        let y1 = (max.y() / step).ceil() as i64;
        let (bottom, top) = (y0 as f64 * step, y1 as f64 * step);
        let (left, right) = (x0 as f64 * step, x1 as f64 * step);

        for ix in x0..=x1 {
            let x = ix as f64 * step;
            self.document
                .add_line(Point2::new(x, bottom).with_z(0.0), Point2::new(x, top).with_z(0.0), layer);
            self.document.add_text(
                Point2::new(x, bottom - GRID_TEXT_HEIGHT * 2.0),
                format!("E {x:.0}"),
                GRID_TEXT_HEIGHT,
                90.0,
                layer,
            );
        }
        for iy in y0..=y1 {
            let y = iy as f64 * step;
            self.document
                .add_line(Point2::new(left, y).with_z(0.0), Point2::new(right, y).with_z(0.0), layer);
            self.document.add_text(
                Point2::new(left - GRID_TEXT_HEIGHT * 8.0, y),
                format!("N {y:.0}"),
                GRID_TEXT_HEIGHT,
                0.0,
                layer,
            );
        }
    }

    fn draw_terrain(&mut self) {
        let sampler = self.sampler;
        let grid = sampler.grid();
        if grid.is_empty() {
            return;
        }
        if self.config.layers.terrain {
            let layer = self.layer(LayerKey::Terrain);
            for face in grid.mesh_faces() {
                self.document.add_face3d(face, layer);
            }
        }
        if self.config.layers.slope_analysis {
            let cells = cell_slopes(grid);
            for cell in &cells {
                let layer = self.layer(SlopeClass::from_degrees(cell.slope_deg).layer());
                self.document.add_polyline(cell.corners, true, layer);
            }
            let arrows = flow_vectors(&cells, FLOW_RELIEF_THRESHOLD);
            debug!(cells = cells.len(), arrows = arrows.len(), "坡度分析");
            let layer = self.layer(LayerKey::AnalysisSlope);
            for arrow in arrows {
                for (start, end) in [
                    (arrow.tail, arrow.tip),
                    (arrow.tip, arrow.left_wing),
                    (arrow.tip, arrow.right_wing),
                ] {
                    self.document.add_line(start.with_z(0.0), end.with_z(0.0), layer);
                }
            }
        }
    }

    fn drawing_bounds(&self) -> Bounds2D {
        self.document.bounds().unwrap_or_else(|| {
            let origin = self.projector.origin_point();
            Bounds2D::new(origin, origin)
        })
    }

    /// 图框与元数据行放在图面下方。
    fn draw_title_block(&mut self) {
        let Some(metadata) = self.config.project_metadata.clone() else {
            return;
        };
        let bounds = self.drawing_bounds();
        let rows = metadata.rows();
        let width = bounds.width().max(TITLE_MIN_WIDTH);
        let height = TITLE_ROW_HEIGHT * rows.len() as f64;
        let left = bounds.min().x();
        let top = bounds.min().y() - TITLE_MARGIN;
        let bottom = top - height;

        let layer = self.layer(LayerKey::TitleBlock);
        self.document.add_polyline(
            [
                Point2::new(left, bottom),
                Point2::new(left + width, bottom),
                Point2::new(left + width, top),
                Point2::new(left, top),
            ],
            true,
            layer,
        );
        for (index, (label, value)) in rows.iter().enumerate() {
            let row_top = top - TITLE_ROW_HEIGHT * index as f64;
            if index > 0 {
                self.document.add_line(
                    Point2::new(left, row_top).with_z(0.0),
                    Point2::new(left + width, row_top).with_z(0.0),
                    layer,
                );
            }
            let value = if value.is_empty() { "-" } else { *value };
            self.document.add_text(
                Point2::new(left + 2.0, row_top - TITLE_ROW_HEIGHT * 0.7),
                format!("{label}: {value}"),
                TITLE_ROW_HEIGHT * 0.5,
                0.0,
                layer,
            );
        }
    }

    fn draw_projection_label(&mut self) {
        if self.config.projection != ProjectionMode::Utm {
            return;
        }
        let Some(zone) = self.projector.zone() else {
            return;
        };
        let bounds = self.drawing_bounds();
        let layer = self.layer(LayerKey::Labels);
        let anchor = Point2::new(bounds.min().x(), bounds.max().y() + LABEL_HEIGHT * 3.0);
        self.document
            .add_text(anchor, zone.label(), LABEL_HEIGHT * 2.0, 0.0, layer);
    }
}

fn feature_xdata(id: &str, category: &str, tags: &Tags) -> ExtendedData {
    let mut xdata = ExtendedData::new(APPLICATION_NAME)
        .with("source", id)
        .with("category", category);
    for key in ["name", "highway", "building", "natural", "waterway", "power", "voltage"] {
        if let Some(value) = tags.get(key) {
            xdata.push(key, value);
        }
    }
    xdata
}

/// 多段线实体用闭合标志表达闭合，顶点中不再重复首点。
fn open_ring(ring: &[Point2]) -> Vec<Point2> {
    let mut vertices = ring.to_vec();
    if vertices.len() > 1 && vertices.first() == vertices.last() {
        vertices.pop();
    }
    vertices
}

fn format_level(level: f64) -> String {
    if (level - level.round()).abs() < 1e-6 {
        format!("{level:.0}")
    } else {
        format!("{level:.1}")
    }
}

/// 取 1/2/5 × 10^k 中不小于 `raw` 的最小值。
fn nice_step(raw: f64) -> f64 {
    if !raw.is_finite() || raw <= 0.0 {
        return 0.0;
    }
    let magnitude = 10f64.powf(raw.log10().floor());
    [1.0, 2.0, 5.0, 10.0]
        .into_iter()
        .map(|factor| factor * magnitude)
        .find(|step| *step >= raw)
        .unwrap_or(10.0 * magnitude)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nice_step_rounds_up_to_1_2_5_series() {
        assert_eq!(nice_step(0.0), 0.0);
        assert!((nice_step(7.0) - 10.0).abs() < 1e-9);
        assert!((nice_step(13.0) - 20.0).abs() < 1e-9);
        assert!((nice_step(41.0) - 50.0).abs() < 1e-9);
        assert!((nice_step(0.3) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn contour_levels_are_formatted_compactly() {
        assert_eq!(format_level(120.0), "120");
        assert_eq!(format_level(2.5), "2.5");
    }

    #[test]
    fn open_ring_drops_the_closing_vertex() {
        let ring = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 0.0),
        ];
        assert_eq!(open_ring(&ring).len(), 3);
    }
}
