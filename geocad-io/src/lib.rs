use std::fs;
use std::path::Path;

use geocad_core::document::CadDocument;
use thiserror::Error;
use tracing::{debug, info};

mod reader;
mod writer;

pub use reader::HeaderInfo;
pub use writer::{encode_document, DxfWriter, DXF_VERSION};

use reader::{DxfError, DxfParser};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
}

impl From<DxfError> for IoError {
    fn from(err: DxfError) -> Self {
        match err {
            DxfError::Unsupported { feature } => IoError::UnsupportedFeature(feature),
            DxfError::Invalid { message } => IoError::InvalidDocument(message),
        }
    }
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<CadDocument, IoError>;
}

pub trait DocumentSaver {
    fn save(&self, document: &CadDocument, path: &Path) -> Result<(), IoError>;
}

/// 从内存中的 DXF 文本解析文档。
pub fn parse_str(source: &str) -> Result<CadDocument, IoError> {
    parse_with_header(source).map(|(document, _)| document)
}

/// 解析文档并返回文件头信息。
pub fn parse_with_header(source: &str) -> Result<(CadDocument, HeaderInfo), IoError> {
    Ok(DxfParser::new(source).parse()?)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DxfFacade;

impl DxfFacade {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentLoader for DxfFacade {
    fn load(&self, path: &Path) -> Result<CadDocument, IoError> {
        let data = fs::read_to_string(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let document = parse_str(&data)?;
        debug!(path = %path.display(), entities = document.entity_count(), "DXF 读取完成");
        Ok(document)
    }
}

impl DocumentSaver for DxfFacade {
    fn save(&self, document: &CadDocument, path: &Path) -> Result<(), IoError> {
        let bytes = DxfWriter::new().encode(document)?;
        fs::write(path, &bytes).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), bytes = bytes.len(), "DXF 已写出");
        Ok(())
    }
}
