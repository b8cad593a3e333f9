pub mod conversion;
pub mod geo;
pub mod osm;

pub mod geometry {
    use glam::{DVec2, DVec3};
    use serde::{Deserialize, Serialize};

    /// 平面点（单位：米），内部以 `glam::DVec2` 表示。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn vector_to(self, other: Point2) -> Vector2 {
            Vector2(other.0 - self.0)
        }

        #[inline]
        pub fn distance(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }

        /// 线性插值，`t = 0` 返回自身，`t = 1` 返回 `other`。
        #[inline]
        pub fn lerp(self, other: Point2, t: f64) -> Self {
            Self(self.0.lerp(other.0, t))
        }

        #[inline]
        pub fn with_z(self, z: f64) -> Point3 {
            Point3::new(self.0.x, self.0.y, z)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_points(start: Point2, end: Point2) -> Self {
            Self(end.0 - start.0)
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.0.length()
        }

        #[inline]
        pub fn length_squared(self) -> f64 {
            self.0.length_squared()
        }

        /// 单位化；长度退化时返回 None。
        #[inline]
        pub fn normalize(self) -> Option<Self> {
            let len = self.0.length();
            if len <= f64::EPSILON {
                None
            } else {
                Some(Self(self.0 / len))
            }
        }

        /// 左手法向（逆时针旋转 90°）。
        #[inline]
        pub fn perp(self) -> Self {
            Self(self.0.perp())
        }

        #[inline]
        pub fn scale(self, factor: f64) -> Self {
            Self(self.0 * factor)
        }

        /// 相对 +X 轴的方向角（弧度）。
        #[inline]
        pub fn angle(self) -> f64 {
            self.0.y.atan2(self.0.x)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 三维点，供 3DFACE、LINE 等带高程的实体使用。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point3(pub DVec3);

    impl Point3 {
        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn xy(self) -> Point2 {
            Point2::new(self.0.x, self.0.y)
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }
    }

    impl From<DVec3> for Point3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    /// 轴对齐边界框，用于估算文档/实体范围。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        #[inline]
        pub fn width(&self) -> f64 {
            self.max.x() - self.min.x()
        }

        #[inline]
        pub fn height(&self) -> f64 {
            self.max.y() - self.min.y()
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        pub fn include_bounds(&mut self, other: &Bounds2D) {
            if other.is_empty() {
                return;
            }
            self.include_point(other.min);
            self.include_point(other.max);
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            debug_assert!(!self.is_empty());
            let center = (self.min.as_vec2() + self.max.as_vec2()) * 0.5;
            Point2::from_vec(center)
        }
    }
}

pub mod document {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Serialize};

    use crate::geometry::{Bounds2D, Point2, Point3, Vector2};

    /// 扩展数据默认使用的注册应用名（APPID）。
    pub const APPLICATION_NAME: &str = "GEOCAD";

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct EntityId(u64);

    impl EntityId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        /// 提供原始数值，便于序列化或日志输出。
        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    /// 图层线型。仅收录写出端实际用到的几种。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub enum LineType {
        #[default]
        Continuous,
        Dashed,
        Dotted,
    }

    impl LineType {
        pub const ALL: [LineType; 3] = [LineType::Continuous, LineType::Dashed, LineType::Dotted];

        pub fn dxf_name(self) -> &'static str {
            match self {
                LineType::Continuous => "CONTINUOUS",
                LineType::Dashed => "DASHED",
                LineType::Dotted => "DOT",
            }
        }

        pub fn description(self) -> &'static str {
            match self {
                LineType::Continuous => "Solid line",
                LineType::Dashed => "Dashed __ __ __",
                LineType::Dotted => "Dotted . . . .",
            }
        }

        /// 线型图案（正值为实线段，负值为空白），单位为图纸单位。
        pub fn pattern(self) -> &'static [f64] {
            match self {
                LineType::Continuous => &[],
                LineType::Dashed => &[0.5, -0.25],
                LineType::Dotted => &[0.0, -0.25],
            }
        }

        pub fn from_dxf_name(name: &str) -> Option<Self> {
            Self::ALL
                .into_iter()
                .find(|line_type| line_type.dxf_name().eq_ignore_ascii_case(name))
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Layer {
        pub name: String,
        /// AutoCAD 颜色索引（ACI）。
        pub color: i16,
        pub line_type: LineType,
        pub is_visible: bool,
    }

    impl Layer {
        #[inline]
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                color: 7,
                line_type: LineType::Continuous,
                is_visible: true,
            }
        }

        #[inline]
        pub fn styled(name: impl Into<String>, color: i16, line_type: LineType) -> Self {
            Self {
                name: name.into(),
                color,
                line_type,
                is_visible: true,
            }
        }
    }

    /// 附着在实体之后的扩展数据块（XDATA），按写入顺序保存 `key=value` 对。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ExtendedData {
        pub application: String,
        entries: Vec<(String, String)>,
    }

    impl ExtendedData {
        pub fn new(application: impl Into<String>) -> Self {
            Self {
                application: application.into(),
                entries: Vec::new(),
            }
        }

        /// 追加一项；键值中的换行会被压平成空格。
        pub fn push(&mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> &mut Self {
            self.entries
                .push((flatten_line(key.as_ref()), flatten_line(value.as_ref())));
            self
        }

        pub fn with(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
            self.push(key, value);
            self
        }

        #[inline]
        pub fn entries(&self) -> &[(String, String)] {
            &self.entries
        }

        pub fn get(&self, key: &str) -> Option<&str> {
            self.entries
                .iter()
                .find(|(candidate, _)| candidate == key)
                .map(|(_, value)| value.as_str())
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.entries.is_empty()
        }
    }

    fn flatten_line(raw: &str) -> String {
        raw.replace("\r\n", " ").replace(['\n', '\r'], " ")
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub enum Entity {
        Polyline(Polyline),
        Line(Line),
        Face3D(ThreeDFace),
        Text(Text),
        Insert(BlockReference),
        Circle(Circle),
    }

    impl Entity {
        #[inline]
        pub fn layer_name(&self) -> &str {
            match self {
                Entity::Polyline(polyline) => &polyline.layer,
                Entity::Line(line) => &line.layer,
                Entity::Face3D(face) => &face.layer,
                Entity::Text(text) => &text.layer,
                Entity::Insert(reference) => &reference.layer,
                Entity::Circle(circle) => &circle.layer,
            }
        }

        /// DXF 记录类型名。
        pub fn kind(&self) -> &'static str {
            match self {
                Entity::Polyline(_) => "LWPOLYLINE",
                Entity::Line(_) => "LINE",
                Entity::Face3D(_) => "3DFACE",
                Entity::Text(_) => "TEXT",
                Entity::Insert(_) => "INSERT",
                Entity::Circle(_) => "CIRCLE",
            }
        }

        /// 计算实体的 2D 轴对齐范围，文字与块参照退化为插入点。
        pub fn bounds(&self) -> Option<Bounds2D> {
            let mut bounds = Bounds2D::empty();
            match self {
                Entity::Polyline(polyline) => {
                    for vertex in &polyline.vertices {
                        bounds.include_point(*vertex);
                    }
                }
                Entity::Line(line) => {
                    bounds.include_point(line.start.xy());
                    bounds.include_point(line.end.xy());
                }
                Entity::Face3D(face) => {
                    for vertex in &face.vertices {
                        bounds.include_point(vertex.xy());
                    }
                }
                Entity::Text(text) => bounds.include_point(text.insert),
                Entity::Insert(reference) => bounds.include_point(reference.insert),
                Entity::Circle(circle) => {
                    let radius = circle.radius.abs();
                    let center = circle.center;
                    bounds.include_point(Point2::new(center.x() - radius, center.y() - radius));
                    bounds.include_point(Point2::new(center.x() + radius, center.y() + radius));
                }
            }
            if bounds.is_empty() {
                None
            } else {
                Some(bounds)
            }
        }
    }

    /// 轻量多段线（LWPOLYLINE），`elevation` 对应组码 38。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Polyline {
        pub vertices: Vec<Point2>,
        pub is_closed: bool,
        pub elevation: f64,
        pub layer: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Line {
        pub start: Point3,
        pub end: Point3,
        pub layer: String,
    }

    /// 3D 面（3DFACE）。三角形以重复第三个顶点表示。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ThreeDFace {
        pub layer: String,
        pub vertices: [Point3; 4],
    }

    impl ThreeDFace {
        pub fn triangle(a: Point3, b: Point3, c: Point3, layer: impl Into<String>) -> Self {
            Self {
                layer: layer.into(),
                vertices: [a, b, c, c],
            }
        }

        /// 计算未归一化的法向量。若顶点退化则返回 None。
        pub fn normal(&self) -> Option<glam::DVec3> {
            let a = self.vertices[0].as_vec3();
            let b = self.vertices[1].as_vec3();
            let c = self.vertices[2].as_vec3();
            let normal = (b - a).cross(c - a);
            if normal.length_squared() <= f64::EPSILON {
                None
            } else {
                Some(normal)
            }
        }

        /// 平均高度（Z 值）。
        pub fn average_height(&self) -> f64 {
            let sum: f64 = self.vertices.iter().map(|vertex| vertex.z()).sum();
            sum / (self.vertices.len() as f64)
        }
    }

    /// 单行文字，`rotation` 以度为单位（DXF 组码 50 的约定）。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Text {
        pub insert: Point2,
        pub content: String,
        pub height: f64,
        pub rotation: f64,
        pub layer: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Circle {
        pub center: Point2,
        pub radius: f64,
        pub layer: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct BlockReference {
        pub name: String,
        pub insert: Point2,
        pub scale: Vector2,
        /// 旋转角（度）。
        pub rotation: f64,
        pub layer: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct BlockDefinition {
        pub name: String,
        pub base_point: Point2,
        pub entities: Vec<Entity>,
    }

    /// 内置符号块：由固定的几何图元组成，插入时按需写入 BLOCKS 段。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum SymbolKind {
        Tree,
        Hydrant,
        Pole,
        TrafficSignal,
    }

    impl SymbolKind {
        pub const ALL: [SymbolKind; 4] = [
            SymbolKind::Tree,
            SymbolKind::Hydrant,
            SymbolKind::Pole,
            SymbolKind::TrafficSignal,
        ];

        pub fn block_name(self) -> &'static str {
            match self {
                SymbolKind::Tree => "SYM_TREE",
                SymbolKind::Hydrant => "SYM_HYDRANT",
                SymbolKind::Pole => "SYM_POLE",
                SymbolKind::TrafficSignal => "SYM_TRAFFIC_SIGNAL",
            }
        }

        pub fn from_block_name(name: &str) -> Option<Self> {
            Self::ALL
                .into_iter()
                .find(|kind| kind.block_name().eq_ignore_ascii_case(name))
        }

        /// 符号几何，以插入点为原点，单位米；块内实体统一放在 0 层。
        pub fn definition(self) -> BlockDefinition {
            let origin = Point2::new(0.0, 0.0);
            let circle = |radius: f64| {
                Entity::Circle(Circle {
                    center: origin,
                    radius,
                    layer: "0".to_string(),
                })
            };
            let line = |x1: f64, y1: f64, x2: f64, y2: f64| {
                Entity::Line(Line {
                    start: Point3::new(x1, y1, 0.0),
                    end: Point3::new(x2, y2, 0.0),
                    layer: "0".to_string(),
                })
            };
            let rectangle = |half_w: f64, half_h: f64| {
                Entity::Polyline(Polyline {
                    vertices: vec![
                        Point2::new(-half_w, -half_h),
                        Point2::new(half_w, -half_h),
                        Point2::new(half_w, half_h),
                        Point2::new(-half_w, half_h),
                    ],
                    is_closed: true,
                    elevation: 0.0,
                    layer: "0".to_string(),
                })
            };

            let entities = match self {
                SymbolKind::Tree => vec![
                    circle(2.0),
                    circle(0.3),
                    line(-2.0, 0.0, 2.0, 0.0),
                    line(0.0, -2.0, 0.0, 2.0),
                ],
                SymbolKind::Hydrant => vec![circle(0.5), rectangle(0.25, 0.25)],
                SymbolKind::Pole => vec![
                    circle(0.4),
                    line(-0.4, -0.4, 0.4, 0.4),
                    line(-0.4, 0.4, 0.4, -0.4),
                ],
                SymbolKind::TrafficSignal => {
                    let lamp = |y: f64| {
                        Entity::Circle(Circle {
                            center: Point2::new(0.0, y),
                            radius: 0.2,
                            layer: "0".to_string(),
                        })
                    };
                    vec![rectangle(0.35, 0.9), lamp(-0.55), lamp(0.0), lamp(0.55)]
                }
            };

            BlockDefinition {
                name: self.block_name().to_string(),
                base_point: origin,
                entities,
            }
        }
    }

    /// 文档中的一条实体记录：实体本身加可选的扩展数据。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct DocumentEntity {
        pub id: EntityId,
        pub entity: Entity,
        pub xdata: Option<ExtendedData>,
    }

    /// CAD 文档：图层表、块定义与实体列表。图层与块使用有序映射，保证输出稳定。
    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct CadDocument {
        layers: BTreeMap<String, Layer>,
        entities: Vec<DocumentEntity>,
        next_entity_id: u64,
        blocks: BTreeMap<String, BlockDefinition>,
    }

    impl CadDocument {
        pub fn new() -> Self {
            let mut doc = Self::default();
            doc.ensure_layer("0");
            doc
        }

        /// 若图层不存在则以默认样式创建。
        pub fn ensure_layer(&mut self, name: impl AsRef<str>) {
            let key = name.as_ref();
            self.layers
                .entry(key.to_string())
                .or_insert_with(|| Layer::new(key));
        }

        /// 注册带样式的图层；已存在的同名图层保持不变。
        pub fn add_layer(&mut self, layer: Layer) {
            self.layers.entry(layer.name.clone()).or_insert(layer);
        }

        pub fn layer(&self, name: &str) -> Option<&Layer> {
            self.layers.get(name)
        }

        pub fn layers(&self) -> impl Iterator<Item = &Layer> {
            self.layers.values()
        }

        #[inline]
        pub fn has_layer(&self, name: &str) -> bool {
            self.layers.contains_key(name)
        }

        /// 直接追加实体，不做图层补全；写出时会校验图层是否存在。
        pub fn add_entity(&mut self, entity: Entity) -> EntityId {
            let id = self.next_id();
            self.entities.push(DocumentEntity {
                id,
                entity,
                xdata: None,
            });
            id
        }

        pub fn add_polyline<I>(
            &mut self,
            vertices: I,
            is_closed: bool,
            layer: impl Into<String>,
        ) -> EntityId
        where
            I: IntoIterator<Item = Point2>,
        {
            self.add_polyline_at_elevation(vertices, is_closed, 0.0, layer)
        }

        pub fn add_polyline_at_elevation<I>(
            &mut self,
            vertices: I,
            is_closed: bool,
            elevation: f64,
            layer: impl Into<String>,
        ) -> EntityId
        where
            I: IntoIterator<Item = Point2>,
        {
            let layer = layer.into();
            self.ensure_layer(&layer);
            self.add_entity(Entity::Polyline(Polyline {
                vertices: vertices.into_iter().collect(),
                is_closed,
                elevation,
                layer,
            }))
        }

        pub fn add_line(&mut self, start: Point3, end: Point3, layer: impl Into<String>) -> EntityId {
            let layer = layer.into();
            self.ensure_layer(&layer);
            self.add_entity(Entity::Line(Line { start, end, layer }))
        }

        pub fn add_face3d(&mut self, vertices: [Point3; 4], layer: impl Into<String>) -> EntityId {
            let layer = layer.into();
            self.ensure_layer(&layer);
            self.add_entity(Entity::Face3D(ThreeDFace { layer, vertices }))
        }

        pub fn add_text(
            &mut self,
            insert: Point2,
            content: impl Into<String>,
            height: f64,
            rotation: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            let layer = layer.into();
            self.ensure_layer(&layer);
            self.add_entity(Entity::Text(Text {
                insert,
                content: content.into(),
                height,
                rotation,
                layer,
            }))
        }

        pub fn add_circle(
            &mut self,
            center: Point2,
            radius: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            let layer = layer.into();
            self.ensure_layer(&layer);
            self.add_entity(Entity::Circle(Circle {
                center,
                radius,
                layer,
            }))
        }

        /// 插入内置符号，并自动登记对应的块定义。
        pub fn add_symbol(
            &mut self,
            symbol: SymbolKind,
            insert: Point2,
            rotation: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            let layer = layer.into();
            self.ensure_layer(&layer);
            let definition = symbol.definition();
            let name = definition.name.clone();
            self.add_block_definition(definition);
            self.add_entity(Entity::Insert(BlockReference {
                name,
                insert,
                scale: Vector2::new(1.0, 1.0),
                rotation,
                layer,
            }))
        }

        pub fn add_block_definition(&mut self, definition: BlockDefinition) {
            self.blocks
                .entry(definition.name.clone())
                .or_insert(definition);
        }

        /// 为已有实体附加扩展数据，返回实体是否存在。
        pub fn attach_xdata(&mut self, id: EntityId, xdata: ExtendedData) -> bool {
            match self.position(id) {
                Some(index) => {
                    self.entities[index].xdata = if xdata.is_empty() { None } else { Some(xdata) };
                    true
                }
                None => false,
            }
        }

        pub fn entity(&self, id: EntityId) -> Option<&Entity> {
            self.position(id).map(|index| &self.entities[index].entity)
        }

        /// 实体只追加、编号递增，按编号二分查找。
        fn position(&self, id: EntityId) -> Option<usize> {
            self.entities
                .binary_search_by_key(&id, |record| record.id)
                .ok()
        }

        pub fn entities(&self) -> impl Iterator<Item = &DocumentEntity> {
            self.entities.iter()
        }

        #[inline]
        pub fn entity_count(&self) -> usize {
            self.entities.len()
        }

        pub fn entities_on_layer<'a>(
            &'a self,
            layer: &'a str,
        ) -> impl Iterator<Item = &'a Entity> + 'a {
            self.entities
                .iter()
                .filter(move |record| record.entity.layer_name() == layer)
                .map(|record| &record.entity)
        }

        pub fn block(&self, name: &str) -> Option<&BlockDefinition> {
            self.blocks.get(name)
        }

        pub fn blocks(&self) -> impl Iterator<Item = &BlockDefinition> {
            self.blocks.values()
        }

        /// 被 INSERT 实体实际引用到的块定义，按名称排序。
        pub fn referenced_blocks(&self) -> Vec<&BlockDefinition> {
            self.blocks
                .values()
                .filter(|block| {
                    self.entities.iter().any(|record| {
                        matches!(&record.entity, Entity::Insert(reference) if reference.name == block.name)
                    })
                })
                .collect()
        }

        /// 引用了图层表中不存在图层的实体 ID。
        pub fn dangling_layer_references(&self) -> Vec<(EntityId, String)> {
            self.entities
                .iter()
                .filter(|record| !self.layers.contains_key(record.entity.layer_name()))
                .map(|record| (record.id, record.entity.layer_name().to_string()))
                .collect()
        }

        /// 文档整体范围。
        pub fn bounds(&self) -> Option<Bounds2D> {
            let mut bounds = Bounds2D::empty();
            let mut has_bounds = false;
            for record in &self.entities {
                if let Some(entity_bounds) = record.entity.bounds() {
                    bounds.include_bounds(&entity_bounds);
                    has_bounds = true;
                }
            }
            if has_bounds { Some(bounds) } else { None }
        }

        fn next_id(&mut self) -> EntityId {
            let id = EntityId::new(self.next_entity_id);
            self.next_entity_id += 1;
            id
        }
    }

}
