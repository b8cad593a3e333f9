//! 异步转换任务：任务表、协作式取消与进度订阅。

mod cancel;
mod service;
mod store;

pub use cancel::{CancellationToken, JobProgress};
pub use service::{JobService, JobServiceConfig, ProgressEvent};
pub use store::{JobId, JobSnapshot, JobStatus, JobStore};

pub mod errors {
    use thiserror::Error;

    use crate::store::JobId;

    /// 任务表层面的错误，与转换本身的失败区分开。
    #[derive(Debug, Error, Clone, PartialEq, Eq)]
    pub enum StoreError {
        #[error("任务 {0} 不存在或已过期")]
        NotFound(JobId),
        #[error("任务 {0} 尚未完成")]
        NotReady(JobId),
        #[error("任务 {id} 已失败: {message}")]
        Failed { id: JobId, message: String },
    }
}
