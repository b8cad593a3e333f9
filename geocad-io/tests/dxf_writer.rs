use geocad_core::{
    document::{
        APPLICATION_NAME, CadDocument, Entity, ExtendedData, Layer, LineType, SymbolKind,
    },
    geometry::{Point2, Point3},
};
use geocad_io::{
    DXF_VERSION, DocumentLoader, DocumentSaver, DxfFacade, DxfWriter, IoError, parse_str,
    parse_with_header,
};
use glam::DVec2;

fn sample_document() -> CadDocument {
    let mut doc = CadDocument::new();
    doc.add_layer(Layer::styled("BLD_RESIDENTIAL", 2, LineType::Continuous));
    doc.add_layer(Layer::styled("ROADS_CURBS", 8, LineType::Dashed));

    let footprint = doc.add_polyline_at_elevation(
        [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 8.0),
            Point2::new(0.0, 8.0),
        ],
        true,
        12.5,
        "BLD_RESIDENTIAL",
    );
    doc.attach_xdata(
        footprint,
        ExtendedData::new(APPLICATION_NAME)
            .with("building", "house")
            .with("name", "Casa\nAzul"),
    );
    doc.add_line(
        Point3::new(0.0, -3.0, 0.0),
        Point3::new(10.0, -3.0, 0.0),
        "ROADS_CURBS",
    );
    doc.add_face3d(
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 3.5),
            Point3::new(0.0, 0.0, 3.5),
        ],
        "BUILDINGS",
    );
    doc.add_text(Point2::new(5.0, 4.0), "3.5m", 0.8, 30.0, "LABELS");
    doc.add_circle(Point2::new(-2.0, -2.0), 0.4, "FURNITURE");
    doc.add_symbol(SymbolKind::Hydrant, Point2::new(12.0, 1.0), 0.0, "INFRA_WATER");
    doc
}

#[test]
fn encoded_document_loads_back_with_layers_blocks_and_xdata() {
    let doc = sample_document();
    let bytes = DxfWriter::new().encode(&doc).expect("编码 DXF 失败");
    let text = String::from_utf8(bytes).expect("DXF 应为 UTF-8 文本");

    let (loaded, header) = parse_with_header(&text).expect("回读 DXF 失败");
    assert_eq!(header.version.as_deref(), Some(DXF_VERSION));
    assert_eq!(loaded.entity_count(), doc.entity_count());

    let original_layers: Vec<_> = doc.layers().map(|layer| layer.name.clone()).collect();
    let loaded_layers: Vec<_> = loaded.layers().map(|layer| layer.name.clone()).collect();
    assert_eq!(original_layers, loaded_layers);

    let curbs = loaded.layer("ROADS_CURBS").expect("缺少 ROADS_CURBS 图层");
    assert_eq!(curbs.color, 8);
    assert_eq!(curbs.line_type, LineType::Dashed);

    let hydrant = loaded
        .block(SymbolKind::Hydrant.block_name())
        .expect("缺少消防栓块定义");
    assert_eq!(hydrant.entities.len(), SymbolKind::Hydrant.definition().entities.len());

    let first = loaded.entities().next().expect("至少一个实体");
    match &first.entity {
        Entity::Polyline(polyline) => {
            assert!(polyline.is_closed);
            assert_eq!(polyline.vertices.len(), 4);
            assert!((polyline.elevation - 12.5).abs() < 1e-9);
            let corner = polyline.vertices[2].as_vec2();
            assert!(corner.distance(DVec2::new(10.0, 8.0)) < 1e-9);
        }
        other => panic!("期望第一个实体为多段线，实际为 {other:?}"),
    }
    let xdata = first.xdata.as_ref().expect("缺少扩展数据");
    assert_eq!(xdata.application, APPLICATION_NAME);
    assert_eq!(xdata.get("building"), Some("house"));
    assert_eq!(xdata.get("name"), Some("Casa Azul"));

    let text_entity = loaded
        .entities_on_layer("LABELS")
        .next()
        .expect("缺少标注文字");
    match text_entity {
        Entity::Text(label) => {
            assert_eq!(label.content, "3.5m");
            assert!((label.rotation - 30.0).abs() < 1e-9);
        }
        other => panic!("期望文字实体，实际为 {other:?}"),
    }

    let face = loaded
        .entities_on_layer("BUILDINGS")
        .next()
        .expect("缺少 3DFACE");
    match face {
        Entity::Face3D(face) => assert!((face.vertices[2].z() - 3.5).abs() < 1e-9),
        other => panic!("期望 3DFACE，实际为 {other:?}"),
    }
}

#[test]
fn encoding_twice_is_byte_identical() {
    let doc = sample_document();
    let writer = DxfWriter::new();
    let first = writer.encode(&doc).expect("第一次编码失败");
    let second = writer.encode(&doc).expect("第二次编码失败");
    assert_eq!(first, second);
}

#[test]
fn every_written_entity_layer_is_in_the_layer_table() {
    let doc = sample_document();
    let text = DxfWriter::new()
        .encode_to_string(&doc)
        .expect("编码 DXF 失败");
    let loaded = parse_str(&text).expect("回读 DXF 失败");
    assert!(loaded.dangling_layer_references().is_empty());
    for record in loaded.entities() {
        assert!(loaded.has_layer(record.entity.layer_name()));
    }
}

#[test]
fn dangling_layer_is_rejected_before_writing() {
    let mut doc = CadDocument::new();
    doc.add_entity(Entity::Circle(geocad_core::document::Circle {
        center: Point2::new(0.0, 0.0),
        radius: 1.0,
        layer: "GHOST".to_string(),
    }));
    let err = DxfWriter::new().encode(&doc).expect_err("悬空图层应当报错");
    assert!(matches!(err, IoError::InvalidDocument(message) if message.contains("GHOST")));
}

#[test]
fn facade_saves_and_loads_files() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let path = dir.path().join("out.dxf");
    let facade = DxfFacade::new();
    facade.save(&sample_document(), &path).expect("写出 DXF 失败");
    let loaded = facade.load(&path).expect("读取 DXF 失败");
    assert_eq!(loaded.entity_count(), sample_document().entity_count());

    let missing = facade.load(&dir.path().join("missing.dxf"));
    assert!(matches!(missing, Err(IoError::ReadError { .. })));
}
