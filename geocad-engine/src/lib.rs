pub mod layers;
pub mod pipeline;
pub mod processing;
pub mod progress;
pub mod projection;
pub mod terrain;

pub use pipeline::{ConversionOutput, ConversionReport, ConversionRequest, SkippedFeature, convert};
pub use progress::{NoopProgress, ProgressSink};

pub mod errors {
    use geocad_core::conversion::OptionError;
    use geocad_core::geo::GridError;
    use geocad_io::IoError;
    use thiserror::Error;

    /// 整次转换级别的错误：前置条件不满足或流水线致命失败。
    #[derive(Debug, Error)]
    pub enum ConversionError {
        #[error("转换配置无效: {0}")]
        InvalidConfig(#[from] OptionError),
        #[error("原点坐标无效: ({lat}, {lng})")]
        InvalidOrigin { lat: f64, lng: f64 },
        #[error("高程网格无效: {0}")]
        InvalidElevationGrid(#[from] GridError),
        #[error("要素列表为空")]
        EmptyFeatureSet,
        #[error("DXF 编码失败: {0}")]
        Encoding(#[from] IoError),
        #[error("转换已取消")]
        Cancelled,
    }

    /// 单个要素的可恢复错误，只会导致该要素被跳过。
    #[derive(Debug, Error, Clone, PartialEq)]
    pub enum FeatureError {
        #[error("{kind} 只有 {found} 个有效顶点，至少需要 {required} 个")]
        TooFewPoints {
            kind: &'static str,
            found: usize,
            required: usize,
        },
        #[error("要素缺少几何数据")]
        MissingGeometry,
    }
}
