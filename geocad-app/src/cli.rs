use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use geocad_engine::convert;
use tracing::{info, warn};

use crate::request::DxfRequest;

/// 读取 JSON 请求，写出 DXF，并在标准输出打印转换报告。
pub fn run_convert(input: &Path, output: &Path) -> Result<()> {
    let text = fs::read_to_string(input)
        .with_context(|| format!("读取请求文件 {} 失败", input.display()))?;
    let body: DxfRequest = serde_json::from_str(&text)
        .with_context(|| format!("解析请求文件 {} 失败", input.display()))?;
    let request = body.into_conversion()?;
    let output_data = convert(&request)?;

    fs::write(output, &output_data.bytes)
        .with_context(|| format!("写出 {} 失败", output.display()))?;
    for skipped in &output_data.report.skipped {
        warn!(id = %skipped.id, reason = %skipped.reason, "要素已跳过");
    }
    info!(
        path = %output.display(),
        bytes = output_data.bytes.len(),
        entities = output_data.report.entity_count,
        "DXF 已写出"
    );
    println!("{}", serde_json::to_string_pretty(&output_data.report)?);
    Ok(())
}

/// 打印 DXF 文件概览：版本、图层及其实体数、块定义。
pub fn run_inspect(path: &Path) -> Result<()> {
    let text =
        fs::read_to_string(path).with_context(|| format!("读取 {} 失败", path.display()))?;
    let (document, header) = geocad_io::parse_with_header(&text)
        .with_context(|| format!("解析 {} 失败", path.display()))?;

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in document.entities() {
        *counts.entry(record.entity.layer_name()).or_default() += 1;
    }

    println!("文件: {}", path.display());
    println!("版本: {}", header.version.as_deref().unwrap_or("未知"));
    println!("实体总数: {}", document.entity_count());
    if let Some(bounds) = document.bounds() {
        let (min, max) = (bounds.min(), bounds.max());
        println!(
            "范围: ({:.2}, {:.2}) - ({:.2}, {:.2})",
            min.x(),
            min.y(),
            max.x(),
            max.y()
        );
    }
    println!("图层:");
    for layer in document.layers() {
        let count = counts.get(layer.name.as_str()).copied().unwrap_or(0);
        println!("  - {} (颜色 {}, 实体 {})", layer.name, layer.color, count);
    }
    let blocks: Vec<&str> = document.blocks().map(|block| block.name.as_str()).collect();
    if !blocks.is_empty() {
        println!("块: {}", blocks.join(", "));
    }
    Ok(())
}
