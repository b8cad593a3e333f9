//! DXF（AC1015）文本写出。
//!
//! 段顺序固定为 HEADER → TABLES → BLOCKS → ENTITIES → EOF。写出只依赖文档内容，
//! 句柄按写出顺序分配，同一文档多次写出得到逐字节相同的结果。

use geocad_core::document::{
    BlockDefinition, CadDocument, Circle, Entity, ExtendedData, Layer, LineType, Polyline, Text,
    ThreeDFace, APPLICATION_NAME,
};
use geocad_core::geometry::{Bounds2D, Point2, Point3};
use tracing::debug;

use crate::IoError;

/// 写出的格式版本标记。
pub const DXF_VERSION: &str = "AC1015";

/// 单条 1000 组码字符串的最大字节数。
const XDATA_STRING_LIMIT: usize = 255;

const HANDLE_BLOCK_RECORD_TABLE: u64 = 0x1;
const HANDLE_LAYER_TABLE: u64 = 0x2;
const HANDLE_LTYPE_TABLE: u64 = 0x5;
const HANDLE_APPID_TABLE: u64 = 0x9;
const FIRST_FREE_HANDLE: u64 = 0x20;

/// 把 [`CadDocument`] 编码为 DXF 字节流的纯函数封装。
#[derive(Debug, Default, Clone, Copy)]
pub struct DxfWriter;

impl DxfWriter {
    pub fn new() -> Self {
        Self
    }

    pub fn encode(&self, document: &CadDocument) -> Result<Vec<u8>, IoError> {
        encode_document(document).map(String::into_bytes)
    }

    pub fn encode_to_string(&self, document: &CadDocument) -> Result<String, IoError> {
        encode_document(document)
    }
}

/// 编码入口。所有实体引用的图层都必须已在图层表中注册。
pub fn encode_document(document: &CadDocument) -> Result<String, IoError> {
    let dangling = document.dangling_layer_references();
    if let Some((id, layer)) = dangling.first() {
        return Err(IoError::InvalidDocument(format!(
            "实体 #{} 引用了未登记的图层 {layer}（共 {} 处悬空引用）",
            id.get(),
            dangling.len()
        )));
    }

    let mut body = GroupWriter::new(FIRST_FREE_HANDLE);
    write_tables(&mut body, document)?;
    write_blocks(&mut body, document)?;
    write_entities(&mut body, document)?;

    let mut header = GroupWriter::new(0);
    write_header(&mut header, document, body.next_handle)?;

    let mut output = header.finish();
    output.push_str(&body.finish());
    output.push_str("  0\nEOF\n");
    debug!(
        entities = document.entity_count(),
        bytes = output.len(),
        "DXF 编码完成"
    );
    Ok(output)
}

struct GroupWriter {
    buffer: String,
    next_handle: u64,
}

impl GroupWriter {
    fn new(first_handle: u64) -> Self {
        Self {
            buffer: String::new(),
            next_handle: first_handle,
        }
    }

    fn finish(self) -> String {
        self.buffer
    }

    fn pair(&mut self, code: i32, value: &str) {
        self.buffer.push_str(&format!("{code:>3}\n"));
        self.buffer.push_str(value);
        self.buffer.push('\n');
    }

    fn int(&mut self, code: i32, value: i64) {
        self.pair(code, &value.to_string());
    }

    fn real(&mut self, code: i32, value: f64, context: &str) -> Result<(), IoError> {
        let formatted = format_real(value).ok_or_else(|| {
            IoError::InvalidDocument(format!("{context} 含非有限数值（组码 {code}）"))
        })?;
        self.pair(code, &formatted);
        Ok(())
    }

    fn point2(&mut self, base: i32, point: Point2, context: &str) -> Result<(), IoError> {
        self.real(base, point.x(), context)?;
        self.real(base + 10, point.y(), context)?;
        self.real(base + 20, 0.0, context)
    }

    fn point3(&mut self, base: i32, point: Point3, context: &str) -> Result<(), IoError> {
        self.real(base, point.x(), context)?;
        self.real(base + 10, point.y(), context)?;
        self.real(base + 20, point.z(), context)
    }

    fn allocate_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn handle(&mut self) {
        let handle = self.allocate_handle();
        self.pair(5, &format!("{handle:X}"));
    }

    fn section_start(&mut self, name: &str) {
        self.pair(0, "SECTION");
        self.pair(2, name);
    }

    fn section_end(&mut self) {
        self.pair(0, "ENDSEC");
    }

    fn table_start(&mut self, name: &str, handle: u64, count: usize) {
        self.pair(0, "TABLE");
        self.pair(2, name);
        self.pair(5, &format!("{handle:X}"));
        self.pair(100, "AcDbSymbolTable");
        self.int(70, count as i64);
    }

    fn table_end(&mut self) {
        self.pair(0, "ENDTAB");
    }
}

/// 固定 6 位小数，去掉多余的零；非有限值返回 None。
fn format_real(value: f64) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    let mut text = format!("{value:.6}");
    if text.contains('.') {
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
    }
    if text == "-0" {
        text = "0".to_string();
    }
    Some(text)
}

/// 单行字符串值不能包含换行。
fn single_line(raw: &str) -> String {
    raw.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

fn truncate_bytes(raw: &str, limit: usize) -> &str {
    if raw.len() <= limit {
        return raw;
    }
    let mut end = limit;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    &raw[..end]
}

fn write_header(
    writer: &mut GroupWriter,
    document: &CadDocument,
    handle_seed: u64,
) -> Result<(), IoError> {
    let extents = document
        .bounds()
        .unwrap_or_else(|| Bounds2D::new(Point2::new(0.0, 0.0), Point2::new(0.0, 0.0)));

    writer.section_start("HEADER");
    writer.pair(9, "$ACADVER");
    writer.pair(1, DXF_VERSION);
    writer.pair(9, "$INSUNITS");
    // 6 = 米
    writer.int(70, 6);
    writer.pair(9, "$MEASUREMENT");
    writer.int(70, 1);
    writer.pair(9, "$EXTMIN");
    writer.point2(10, extents.min(), "$EXTMIN")?;
    writer.pair(9, "$EXTMAX");
    writer.point2(10, extents.max(), "$EXTMAX")?;
    writer.pair(9, "$CLAYER");
    writer.pair(8, "0");
    writer.pair(9, "$HANDSEED");
    writer.pair(5, &format!("{handle_seed:X}"));
    writer.section_end();
    Ok(())
}

fn write_tables(writer: &mut GroupWriter, document: &CadDocument) -> Result<(), IoError> {
    writer.section_start("TABLES");

    writer.table_start("LTYPE", HANDLE_LTYPE_TABLE, LineType::ALL.len());
    for line_type in LineType::ALL {
        write_line_type(writer, line_type)?;
    }
    writer.table_end();

    let layers: Vec<&Layer> = document.layers().collect();
    writer.table_start("LAYER", HANDLE_LAYER_TABLE, layers.len());
    for layer in layers {
        write_layer(writer, layer);
    }
    writer.table_end();

    writer.table_start("APPID", HANDLE_APPID_TABLE, 1);
    writer.pair(0, "APPID");
    writer.handle();
    writer.pair(330, &format!("{HANDLE_APPID_TABLE:X}"));
    writer.pair(100, "AcDbSymbolTableRecord");
    writer.pair(100, "AcDbRegAppTableRecord");
    writer.pair(2, APPLICATION_NAME);
    writer.int(70, 0);
    writer.table_end();

    let blocks = document.referenced_blocks();
    writer.table_start("BLOCK_RECORD", HANDLE_BLOCK_RECORD_TABLE, blocks.len());
    for block in blocks {
        writer.pair(0, "BLOCK_RECORD");
        writer.handle();
        writer.pair(330, &format!("{HANDLE_BLOCK_RECORD_TABLE:X}"));
        writer.pair(100, "AcDbSymbolTableRecord");
        writer.pair(100, "AcDbBlockTableRecord");
        writer.pair(2, &block.name);
    }
    writer.table_end();

    writer.section_end();
    Ok(())
}

fn write_line_type(writer: &mut GroupWriter, line_type: LineType) -> Result<(), IoError> {
    let pattern = line_type.pattern();
    let total: f64 = pattern.iter().map(|segment| segment.abs()).sum();

    writer.pair(0, "LTYPE");
    writer.handle();
    writer.pair(330, &format!("{HANDLE_LTYPE_TABLE:X}"));
    writer.pair(100, "AcDbSymbolTableRecord");
    writer.pair(100, "AcDbLinetypeTableRecord");
    writer.pair(2, line_type.dxf_name());
    writer.int(70, 0);
    writer.pair(3, line_type.description());
    writer.int(72, 65);
    writer.int(73, pattern.len() as i64);
    writer.real(40, total, "LTYPE 图案总长")?;
    for segment in pattern {
        writer.real(49, *segment, "LTYPE 图案段")?;
        writer.int(74, 0);
    }
    Ok(())
}

fn write_layer(writer: &mut GroupWriter, layer: &Layer) {
    let color = if layer.is_visible {
        layer.color
    } else {
        -layer.color.abs()
    };
    writer.pair(0, "LAYER");
    writer.handle();
    writer.pair(330, &format!("{HANDLE_LAYER_TABLE:X}"));
    writer.pair(100, "AcDbSymbolTableRecord");
    writer.pair(100, "AcDbLayerTableRecord");
    writer.pair(2, &layer.name);
    writer.int(70, 0);
    writer.int(62, i64::from(color));
    writer.pair(6, layer.line_type.dxf_name());
}

fn write_blocks(writer: &mut GroupWriter, document: &CadDocument) -> Result<(), IoError> {
    writer.section_start("BLOCKS");
    for block in document.referenced_blocks() {
        write_block(writer, block)?;
    }
    writer.section_end();
    Ok(())
}

fn write_block(writer: &mut GroupWriter, block: &BlockDefinition) -> Result<(), IoError> {
    writer.pair(0, "BLOCK");
    writer.handle();
    writer.pair(100, "AcDbEntity");
    writer.pair(8, "0");
    writer.pair(100, "AcDbBlockBegin");
    writer.pair(2, &block.name);
    writer.int(70, 0);
    writer.point2(10, block.base_point, "BLOCK 基点")?;
    writer.pair(3, &block.name);
    writer.pair(1, "");

    for entity in &block.entities {
        write_entity(writer, entity, None)?;
    }

    writer.pair(0, "ENDBLK");
    writer.handle();
    writer.pair(100, "AcDbEntity");
    writer.pair(8, "0");
    writer.pair(100, "AcDbBlockEnd");
    Ok(())
}

fn write_entities(writer: &mut GroupWriter, document: &CadDocument) -> Result<(), IoError> {
    writer.section_start("ENTITIES");
    for record in document.entities() {
        write_entity(writer, &record.entity, record.xdata.as_ref()).map_err(|err| match err {
            IoError::InvalidDocument(message) => {
                IoError::InvalidDocument(format!("实体 #{}: {message}", record.id.get()))
            }
            other => other,
        })?;
    }
    writer.section_end();
    Ok(())
}

fn write_entity(
    writer: &mut GroupWriter,
    entity: &Entity,
    xdata: Option<&ExtendedData>,
) -> Result<(), IoError> {
    writer.pair(0, entity.kind());
    writer.handle();
    writer.pair(100, "AcDbEntity");
    writer.pair(8, entity.layer_name());

    match entity {
        Entity::Polyline(polyline) => write_polyline(writer, polyline)?,
        Entity::Line(line) => {
            writer.pair(100, "AcDbLine");
            writer.point3(10, line.start, "LINE 起点")?;
            writer.point3(11, line.end, "LINE 终点")?;
        }
        Entity::Face3D(face) => write_face(writer, face)?,
        Entity::Text(text) => write_text(writer, text)?,
        Entity::Insert(reference) => {
            writer.pair(100, "AcDbBlockReference");
            writer.pair(2, &reference.name);
            writer.point2(10, reference.insert, "INSERT 插入点")?;
            writer.real(41, reference.scale.x(), "INSERT 缩放 X")?;
            writer.real(42, reference.scale.y(), "INSERT 缩放 Y")?;
            writer.real(50, reference.rotation, "INSERT 旋转角")?;
        }
        Entity::Circle(circle) => write_circle(writer, circle)?,
    }

    if let Some(xdata) = xdata {
        write_xdata(writer, xdata);
    }
    Ok(())
}

fn write_polyline(writer: &mut GroupWriter, polyline: &Polyline) -> Result<(), IoError> {
    writer.pair(100, "AcDbPolyline");
    writer.int(90, polyline.vertices.len() as i64);
    writer.int(70, if polyline.is_closed { 1 } else { 0 });
    writer.real(38, polyline.elevation, "LWPOLYLINE 标高")?;
    for vertex in &polyline.vertices {
        writer.real(10, vertex.x(), "LWPOLYLINE 顶点 X")?;
        writer.real(20, vertex.y(), "LWPOLYLINE 顶点 Y")?;
    }
    Ok(())
}

fn write_face(writer: &mut GroupWriter, face: &ThreeDFace) -> Result<(), IoError> {
    writer.pair(100, "AcDbFace");
    for (index, vertex) in face.vertices.iter().enumerate() {
        writer.point3(10 + index as i32, *vertex, "3DFACE 顶点")?;
    }
    Ok(())
}

fn write_text(writer: &mut GroupWriter, text: &Text) -> Result<(), IoError> {
    writer.pair(100, "AcDbText");
    writer.point2(10, text.insert, "TEXT 插入点")?;
    writer.real(40, text.height, "TEXT 高度")?;
    writer.pair(1, &single_line(&text.content));
    writer.real(50, text.rotation, "TEXT 旋转角")?;
    writer.pair(100, "AcDbText");
    Ok(())
}

fn write_circle(writer: &mut GroupWriter, circle: &Circle) -> Result<(), IoError> {
    writer.pair(100, "AcDbCircle");
    writer.point2(10, circle.center, "CIRCLE 圆心")?;
    writer.real(40, circle.radius, "CIRCLE 半径")?;
    Ok(())
}

fn write_xdata(writer: &mut GroupWriter, xdata: &ExtendedData) {
    if xdata.is_empty() {
        return;
    }
    writer.pair(1001, &xdata.application);
    for (key, value) in xdata.entries() {
        let line = single_line(&format!("{key}={value}"));
        writer.pair(1000, truncate_bytes(&line, XDATA_STRING_LIMIT));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reals_are_trimmed_and_normalised() {
        assert_eq!(format_real(20.0).as_deref(), Some("20"));
        assert_eq!(format_real(1.25).as_deref(), Some("1.25"));
        assert_eq!(format_real(-0.0000001).as_deref(), Some("0"));
        assert_eq!(format_real(-3.5).as_deref(), Some("-3.5"));
        assert_eq!(format_real(f64::NAN), None);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "ação".repeat(100);
        let cut = truncate_bytes(&text, XDATA_STRING_LIMIT);
        assert!(cut.len() <= XDATA_STRING_LIMIT);
        assert!(text.starts_with(cut));
    }

    #[test]
    fn header_carries_version_and_sections_are_ordered() {
        let mut doc = CadDocument::new();
        doc.add_line(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(5.0, 5.0, 0.0),
            "ROADS_MAJOR",
        );
        let text = encode_document(&doc).expect("encode");
        assert!(text.contains("$ACADVER\n  1\nAC1015\n"));
        let positions: Vec<usize> = ["HEADER", "TABLES", "BLOCKS", "ENTITIES"]
            .iter()
            .map(|name| {
                text.find(&format!("  2\n{name}\n"))
                    .unwrap_or_else(|| panic!("缺少 {name} 段"))
            })
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(text.ends_with("  0\nEOF\n"));
    }

    #[test]
    fn non_finite_coordinates_fail_encoding() {
        let mut doc = CadDocument::new();
        doc.add_circle(Point2::new(f64::NAN, 0.0), 1.0, "0");
        let err = encode_document(&doc).expect_err("NaN must be rejected");
        assert!(matches!(err, IoError::InvalidDocument(message) if message.contains("实体 #0")));
    }
}
