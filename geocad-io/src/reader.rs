//! 读取本系统写出的 DXF 子集，回读为 [`CadDocument`]。
//!
//! 支持 LAYER 表、BLOCKS 段以及 LWPOLYLINE / LINE / 3DFACE / TEXT / INSERT / CIRCLE
//! 六种实体和其后的扩展数据（1001/1000）。其它段与表直接跳过。

use std::convert::TryFrom;

use geocad_core::document::{
    BlockDefinition, BlockReference, CadDocument, Circle, Entity, ExtendedData, Layer, Line,
    LineType, Polyline, Text, ThreeDFace,
};
use geocad_core::geometry::{Point2, Point3, Vector2};
use serde::Serialize;

#[derive(Debug)]
pub(crate) enum DxfError {
    Unsupported { feature: String },
    Invalid { message: String },
}

impl DxfError {
    fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// 解析结果的附加信息：文件头中的版本标记。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HeaderInfo {
    pub version: Option<String>,
}

pub(crate) struct DxfParser<'a> {
    reader: DxfReader<'a>,
    header: HeaderInfo,
}

/// 实体公共字段：图层与扩展数据。
#[derive(Default)]
struct EntityCommon {
    layer: Option<String>,
    xdata: Option<ExtendedData>,
}

impl EntityCommon {
    /// 处理公共组码，返回该组码是否已被消费。
    fn accept(&mut self, code: i32, value: &str) -> bool {
        match code {
            8 => {
                self.layer = Some(value.trim().to_string());
                true
            }
            1001 => {
                self.xdata = Some(ExtendedData::new(value.trim()));
                true
            }
            1000 => {
                if let Some(xdata) = self.xdata.as_mut() {
                    match value.split_once('=') {
                        Some((key, item)) => xdata.push(key, item),
                        None => xdata.push(value, ""),
                    };
                }
                true
            }
            _ => false,
        }
    }

    fn layer(&mut self) -> String {
        self.layer.take().unwrap_or_else(|| "0".to_string())
    }
}

impl<'a> DxfParser<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self {
            reader: DxfReader::new(source),
            header: HeaderInfo::default(),
        }
    }

    pub(crate) fn parse(mut self) -> Result<(CadDocument, HeaderInfo), DxfError> {
        let mut document = CadDocument::new();
        while let Some((code, value)) = self.reader.next_pair()? {
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "意外的组码 {code}（期望 0 表示 SECTION/EOF）"
                )));
            }
            match value.as_str() {
                "SECTION" => {
                    let (name_code, name) = self
                        .reader
                        .next_pair()?
                        .ok_or_else(|| DxfError::invalid("SECTION 缺少名称（组码 2）"))?;
                    if name_code != 2 {
                        return Err(DxfError::invalid(format!(
                            "SECTION 名称使用了组码 {name_code}（期望 2）"
                        )));
                    }
                    match name.as_str() {
                        "HEADER" => self.parse_header()?,
                        "TABLES" => self.parse_tables(&mut document)?,
                        "BLOCKS" => self.parse_blocks(&mut document)?,
                        "ENTITIES" => self.parse_entities(&mut document)?,
                        _ => self.skip_section()?,
                    }
                }
                "EOF" => break,
                unexpected => {
                    return Err(DxfError::invalid(format!(
                        "意外的标记 {unexpected}，期望 SECTION 或 EOF"
                    )));
                }
            }
        }
        Ok((document, self.header))
    }

    fn skip_section(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value == "ENDSEC" => break,
                Some(_) => continue,
                None => {
                    return Err(DxfError::invalid("SECTION 未找到 ENDSEC 终止标记"));
                }
            }
        }
        Ok(())
    }

    fn parse_header(&mut self) -> Result<(), DxfError> {
        let mut current_variable: Option<String> = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value == "ENDSEC" => break,
                Some((9, name)) => current_variable = Some(name.trim().to_string()),
                Some((1, value)) if current_variable.as_deref() == Some("$ACADVER") => {
                    self.header.version = Some(value.trim().to_string());
                }
                Some(_) => continue,
                None => return Err(DxfError::invalid("HEADER 段提前结束")),
            }
        }
        Ok(())
    }

    fn parse_tables(&mut self, document: &mut CadDocument) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::invalid("TABLES 段提前结束")),
            };
            match (code, value.as_str()) {
                (0, "ENDSEC") => break,
                (0, "LAYER") => {
                    let layer = self.parse_layer_entry()?;
                    document.add_layer(layer);
                }
                _ => continue,
            }
        }
        Ok(())
    }

    fn parse_layer_entry(&mut self) -> Result<Layer, DxfError> {
        let mut name = None;
        let mut color: i16 = 7;
        let mut line_type = LineType::Continuous;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    2 => name = Some(value.trim().to_string()),
                    62 => color = parse_i16(&value, "LAYER 颜色（组码 62）")?,
                    6 => {
                        line_type = LineType::from_dxf_name(value.trim()).ok_or_else(|| {
                            DxfError::unsupported(format!("暂不支持的线型 {}", value.trim()))
                        })?;
                    }
                    _ => {}
                },
                None => return Err(DxfError::invalid("LAYER 记录未正确结束")),
            }
        }

        let name = name.ok_or_else(|| DxfError::invalid("LAYER 缺少名称（组码 2）"))?;
        let mut layer = Layer::styled(name, color.abs(), line_type);
        layer.is_visible = color >= 0;
        Ok(layer)
    }

    fn parse_blocks(&mut self, document: &mut CadDocument) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::invalid("BLOCKS 段提前结束")),
            };
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "BLOCKS 段遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }

            match value.as_str() {
                "ENDSEC" => break,
                "BLOCK" => {
                    let definition = self.parse_block_definition()?;
                    document.add_block_definition(definition);
                }
                _ => self.skip_entity_body()?,
            }
        }
        Ok(())
    }

    fn parse_block_definition(&mut self) -> Result<BlockDefinition, DxfError> {
        let mut name: Option<String> = None;
        let mut base_x: f64 = 0.0;
        let mut base_y: f64 = 0.0;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    2 => name = Some(value.trim().to_string()),
                    10 => base_x = parse_f64(&value, "BLOCK 基点 X")?,
                    20 => base_y = parse_f64(&value, "BLOCK 基点 Y")?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("BLOCK 未正确结束")),
            }
        }

        let mut entities = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value == "ENDBLK" => {
                    self.skip_entity_body()?;
                    break;
                }
                Some((0, kind)) => {
                    let (entity, _) = self.parse_entity(&kind)?;
                    entities.push(entity);
                }
                Some((code, _)) => {
                    return Err(DxfError::invalid(format!(
                        "BLOCK 内遇到组码 {code}（期望 0 表示实体起始）"
                    )));
                }
                None => {
                    return Err(DxfError::invalid("BLOCK 定义未找到 ENDBLK 终止标记"));
                }
            }
        }

        let name = name.ok_or_else(|| DxfError::invalid("BLOCK 缺少名称（组码 2）"))?;
        Ok(BlockDefinition {
            name,
            base_point: Point2::new(base_x, base_y),
            entities,
        })
    }

    fn parse_entities(&mut self, document: &mut CadDocument) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::invalid("ENTITIES 段提前结束")),
            };
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "ENTITIES 段遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }

            match value.as_str() {
                "ENDSEC" => break,
                entity => {
                    let (parsed, xdata) = self.parse_entity(entity)?;
                    let id = document.add_entity(parsed);
                    if let Some(xdata) = xdata {
                        document.attach_xdata(id, xdata);
                    }
                }
            }
        }
        Ok(())
    }

    fn parse_entity(&mut self, kind: &str) -> Result<(Entity, Option<ExtendedData>), DxfError> {
        let mut common = EntityCommon::default();
        let entity = match kind {
            "LINE" => self.parse_line(&mut common)?,
            "CIRCLE" => self.parse_circle(&mut common)?,
            "LWPOLYLINE" => self.parse_lwpolyline(&mut common)?,
            "TEXT" => self.parse_text(&mut common)?,
            "INSERT" => self.parse_insert(&mut common)?,
            "3DFACE" => self.parse_3dface(&mut common)?,
            other => return Err(DxfError::unsupported(format!("暂不支持的实体类型 {other}"))),
        };
        Ok((entity, common.xdata))
    }

    /// 读取一个实体的全部组码，公共字段交给 `common`，其余交给 `handle`。
    fn read_body<F>(
        &mut self,
        common: &mut EntityCommon,
        context: &str,
        mut handle: F,
    ) -> Result<(), DxfError>
    where
        F: FnMut(i32, &str) -> Result<(), DxfError>,
    {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    return Ok(());
                }
                Some((code, value)) => {
                    if !common.accept(code, &value) {
                        handle(code, &value)?;
                    }
                }
                None => return Err(DxfError::invalid(format!("{context} 未正确结束"))),
            }
        }
    }

    fn parse_line(&mut self, common: &mut EntityCommon) -> Result<Entity, DxfError> {
        let mut start = [None; 3];
        let mut end = [None; 3];
        self.read_body(common, "LINE", |code, value| match code {
            10 => assign_coord(&mut start[0], value, "LINE 起点 X（组码 10）"),
            20 => assign_coord(&mut start[1], value, "LINE 起点 Y（组码 20）"),
            30 => assign_coord(&mut start[2], value, "LINE 起点 Z（组码 30）"),
            11 => assign_coord(&mut end[0], value, "LINE 终点 X（组码 11）"),
            21 => assign_coord(&mut end[1], value, "LINE 终点 Y（组码 21）"),
            31 => assign_coord(&mut end[2], value, "LINE 终点 Z（组码 31）"),
            _ => Ok(()),
        })?;

        let start = build_point(start, "LINE 起点")?;
        let end = build_point(end, "LINE 终点")?;
        Ok(Entity::Line(Line {
            start,
            end,
            layer: common.layer(),
        }))
    }

    fn parse_circle(&mut self, common: &mut EntityCommon) -> Result<Entity, DxfError> {
        let mut center_x = None;
        let mut center_y = None;
        let mut radius = None;
        self.read_body(common, "CIRCLE", |code, value| match code {
            10 => assign_coord(&mut center_x, value, "CIRCLE 圆心 X（组码 10）"),
            20 => assign_coord(&mut center_y, value, "CIRCLE 圆心 Y（组码 20）"),
            40 => assign_coord(&mut radius, value, "CIRCLE 半径（组码 40）"),
            _ => Ok(()),
        })?;

        let cx = center_x.ok_or_else(|| DxfError::invalid("CIRCLE 缺少圆心 X（组码 10）"))?;
        let cy = center_y.ok_or_else(|| DxfError::invalid("CIRCLE 缺少圆心 Y（组码 20）"))?;
        let radius = radius.ok_or_else(|| DxfError::invalid("CIRCLE 缺少半径（组码 40）"))?;
        Ok(Entity::Circle(Circle {
            center: Point2::new(cx, cy),
            radius,
            layer: common.layer(),
        }))
    }

    fn parse_lwpolyline(&mut self, common: &mut EntityCommon) -> Result<Entity, DxfError> {
        let mut is_closed = false;
        let mut elevation = 0.0;
        let mut declared: Option<i32> = None;
        let mut vertices: Vec<Point2> = Vec::new();
        let mut pending_x: Option<f64> = None;
        self.read_body(common, "LWPOLYLINE", |code, value| {
            match code {
                70 => {
                    let flag = parse_i32(value, "LWPOLYLINE 标志")?;
                    is_closed = flag & 0x01 == 0x01;
                }
                90 => declared = Some(parse_i32(value, "LWPOLYLINE 顶点数")?),
                38 => elevation = parse_f64(value, "LWPOLYLINE 标高")?,
                10 => {
                    let x = parse_f64(value, "LWPOLYLINE 顶点 X")?;
                    if pending_x.replace(x).is_some() {
                        return Err(DxfError::invalid("LWPOLYLINE 顶点缺少对应的 Y（组码 20）"));
                    }
                }
                20 => {
                    let y = parse_f64(value, "LWPOLYLINE 顶点 Y")?;
                    let x = pending_x
                        .take()
                        .ok_or_else(|| DxfError::invalid("LWPOLYLINE 顶点缺少对应的 X（组码 10）"))?;
                    vertices.push(Point2::new(x, y));
                }
                _ => {}
            }
            Ok(())
        })?;

        if pending_x.is_some() {
            return Err(DxfError::invalid(
                "LWPOLYLINE 顶点坐标成对出现（组码 10/20），检测到不完整的顶点",
            ));
        }
        if let Some(expected) = declared {
            if usize::try_from(expected).ok() != Some(vertices.len()) {
                return Err(DxfError::invalid(format!(
                    "LWPOLYLINE 声明 {expected} 个顶点，实际读取 {} 个",
                    vertices.len()
                )));
            }
        }
        if vertices.is_empty() {
            return Err(DxfError::invalid("LWPOLYLINE 未解析到任何顶点"));
        }

        Ok(Entity::Polyline(Polyline {
            vertices,
            is_closed,
            elevation,
            layer: common.layer(),
        }))
    }

    fn parse_text(&mut self, common: &mut EntityCommon) -> Result<Entity, DxfError> {
        let mut insert_x = None;
        let mut insert_y = None;
        let mut height = None;
        let mut rotation_deg = 0.0;
        let mut content: Option<String> = None;
        self.read_body(common, "TEXT", |code, value| {
            match code {
                10 => assign_coord(&mut insert_x, value, "TEXT 插入点 X（组码 10）")?,
                20 => assign_coord(&mut insert_y, value, "TEXT 插入点 Y（组码 20）")?,
                40 => assign_coord(&mut height, value, "TEXT 高度（组码 40）")?,
                50 => rotation_deg = parse_f64(value, "TEXT 旋转角")?,
                1 => content = Some(value.to_string()),
                _ => {}
            }
            Ok(())
        })?;

        let x = insert_x.ok_or_else(|| DxfError::invalid("TEXT 缺少插入点 X（组码 10）"))?;
        let y = insert_y.ok_or_else(|| DxfError::invalid("TEXT 缺少插入点 Y（组码 20）"))?;
        let height = height.ok_or_else(|| DxfError::invalid("TEXT 缺少文字高度（组码 40）"))?;
        Ok(Entity::Text(Text {
            insert: Point2::new(x, y),
            content: content.unwrap_or_default(),
            height,
            rotation: rotation_deg,
            layer: common.layer(),
        }))
    }

    fn parse_insert(&mut self, common: &mut EntityCommon) -> Result<Entity, DxfError> {
        let mut name = None;
        let mut insert_x = None;
        let mut insert_y = None;
        let mut scale_x: Option<f64> = None;
        let mut scale_y: Option<f64> = None;
        let mut rotation_deg: f64 = 0.0;
        self.read_body(common, "INSERT", |code, value| {
            match code {
                2 => {
                    if name.is_some() {
                        return Err(DxfError::invalid("INSERT 遇到重复的块名（组码 2）"));
                    }
                    name = Some(value.trim().to_string());
                }
                10 => assign_coord(&mut insert_x, value, "INSERT 插入点 X（组码 10）")?,
                20 => assign_coord(&mut insert_y, value, "INSERT 插入点 Y（组码 20）")?,
                41 => scale_x = Some(parse_f64(value, "INSERT 缩放 X")?),
                42 => scale_y = Some(parse_f64(value, "INSERT 缩放 Y")?),
                50 => rotation_deg = parse_f64(value, "INSERT 旋转角")?,
                _ => {}
            }
            Ok(())
        })?;

        let name = name.ok_or_else(|| DxfError::invalid("INSERT 缺少块名（组码 2）"))?;
        let ix = insert_x.ok_or_else(|| DxfError::invalid("INSERT 缺少插入点 X（组码 10）"))?;
        let iy = insert_y.ok_or_else(|| DxfError::invalid("INSERT 缺少插入点 Y（组码 20）"))?;
        let sx = scale_x.unwrap_or(1.0);
        let sy = scale_y.unwrap_or(sx);
        Ok(Entity::Insert(BlockReference {
            name,
            insert: Point2::new(ix, iy),
            scale: Vector2::new(sx, sy),
            rotation: rotation_deg,
            layer: common.layer(),
        }))
    }

    fn parse_3dface(&mut self, common: &mut EntityCommon) -> Result<Entity, DxfError> {
        let mut coords = [[None; 3]; 4];
        self.read_body(common, "3DFACE", |code, value| {
            let (vertex, axis) = match code {
                10..=13 => ((code - 10) as usize, 0),
                20..=23 => ((code - 20) as usize, 1),
                30..=33 => ((code - 30) as usize, 2),
                _ => return Ok(()),
            };
            assign_coord(
                &mut coords[vertex][axis],
                value,
                &format!("3DFACE 顶点 {} 坐标（组码 {code}）", vertex + 1),
            )
        })?;

        let mut vertices = [Point3::new(0.0, 0.0, 0.0); 4];
        for (index, slot) in vertices.iter_mut().enumerate() {
            *slot = build_point(coords[index], &format!("3DFACE 顶点 {}", index + 1))?;
        }
        Ok(Entity::Face3D(ThreeDFace {
            layer: common.layer(),
            vertices,
        }))
    }

    fn skip_entity_body(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }
        Ok(())
    }
}

struct DxfReader<'a> {
    lines: std::str::Lines<'a>,
    buffer: Option<(i32, String)>,
    line_number: usize,
}

impl<'a> DxfReader<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines(),
            buffer: None,
            line_number: 0,
        }
    }

    fn next_pair(&mut self) -> Result<Option<(i32, String)>, DxfError> {
        if let Some(pair) = self.buffer.take() {
            return Ok(Some(pair));
        }

        let code_line = match self.lines.next() {
            Some(line) => {
                self.line_number += 1;
                line
            }
            None => return Ok(None),
        };

        let value_line = match self.lines.next() {
            Some(line) => {
                self.line_number += 1;
                line
            }
            None => {
                return Err(DxfError::invalid(format!(
                    "文件在第 {} 行结束，缺少与组码对应的值行",
                    self.line_number
                )));
            }
        };

        let code = code_line.trim().parse::<i32>().map_err(|_| {
            DxfError::invalid(format!(
                "第 {} 行的组码 \"{}\" 无法解析为整数",
                self.line_number - 1,
                code_line.trim()
            ))
        })?;
        let value = value_line.trim_end_matches('\r').to_string();
        Ok(Some((code, value)))
    }

    /// 回退一个组码对。调用方保证在下一次读取前最多回退一次。
    fn put_back(&mut self, pair: (i32, String)) {
        debug_assert!(self.buffer.is_none(), "内部错误：尝试多次回退 DXF pair");
        self.buffer = Some(pair);
    }
}

fn assign_coord(slot: &mut Option<f64>, raw: &str, context: &str) -> Result<(), DxfError> {
    if slot.is_some() {
        return Err(DxfError::invalid(format!("{context} 出现重复值")));
    }
    *slot = Some(parse_f64(raw, context)?);
    Ok(())
}

fn build_point(coords: [Option<f64>; 3], context: &str) -> Result<Point3, DxfError> {
    match coords {
        [Some(x), Some(y), z] => Ok(Point3::new(x, y, z.unwrap_or(0.0))),
        _ => Err(DxfError::invalid(format!("{context} 缺少完整的 XY 坐标"))),
    }
}

fn parse_f64(raw: &str, context: &str) -> Result<f64, DxfError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i32(raw: &str, context: &str) -> Result<i32, DxfError> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i16(raw: &str, context: &str) -> Result<i16, DxfError> {
    let value = parse_i32(raw, context)?;
    i16::try_from(value)
        .map_err(|_| DxfError::invalid(format!("{context} 超出 i16 范围（值：{value}）")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_rejects_dangling_code_line() {
        let mut reader = DxfReader::new("  0\nSECTION\n  2\n");
        assert!(reader.next_pair().expect("first pair").is_some());
        assert!(matches!(reader.next_pair(), Err(DxfError::Invalid { .. })));
    }

    #[test]
    fn unsupported_entity_is_reported() {
        let source = "  0\nSECTION\n  2\nENTITIES\n  0\nSPLINE\n  8\n0\n  0\nENDSEC\n  0\nEOF\n";
        let result = DxfParser::new(source).parse();
        assert!(matches!(result, Err(DxfError::Unsupported { .. })));
    }

    #[test]
    fn lwpolyline_vertex_count_is_checked() {
        let source = "  0\nSECTION\n  2\nENTITIES\n  0\nLWPOLYLINE\n  8\nA\n 90\n3\n 70\n0\n 10\n0\n 20\n0\n 10\n1\n 20\n1\n  0\nENDSEC\n  0\nEOF\n";
        let result = DxfParser::new(source).parse();
        assert!(matches!(result, Err(DxfError::Invalid { message }) if message.contains("声明 3")));
    }
}
