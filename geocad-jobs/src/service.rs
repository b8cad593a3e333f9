//! 任务服务：显式启动/关闭，持有任务表与过期清理调度。

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use geocad_engine::errors::ConversionError;
use geocad_engine::pipeline::convert_with_progress;
use geocad_engine::ConversionRequest;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::cancel::JobProgress;
use crate::errors::StoreError;
use crate::store::{JobId, JobSnapshot, JobStatus, JobStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobServiceConfig {
    pub retention: Duration,
    pub sweep_interval: Duration,
    pub poll_interval: Duration,
}

impl Default for JobServiceConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(15 * 60),
            sweep_interval: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// 推送给订阅方的一条进度。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    /// 任务已被清理或从未存在。
    pub fn expired() -> Self {
        Self {
            status: JobStatus::Failed,
            progress: 0,
            message: "任务不存在".to_string(),
            error: Some("任务不存在或已过期".to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl From<&JobSnapshot> for ProgressEvent {
    fn from(snapshot: &JobSnapshot) -> Self {
        Self {
            status: snapshot.status,
            progress: snapshot.progress,
            message: snapshot.message.clone(),
            error: snapshot.error.clone(),
        }
    }
}

pub struct JobService {
    store: Arc<JobStore>,
    config: JobServiceConfig,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl JobService {
    /// 创建服务但不启动清理调度，适合测试中手动调用 `sweep`。
    pub fn new(config: JobServiceConfig) -> Self {
        Self {
            store: Arc::new(JobStore::new(config.retention)),
            config,
            sweeper: Mutex::new(None),
        }
    }

    /// 创建服务并在当前 tokio 运行时上启动周期清理。
    pub fn start(config: JobServiceConfig) -> Arc<Self> {
        let service = Arc::new(Self::new(config));
        let store = service.store.clone();
        let period = config.sweep_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = store.sweep_expired();
                if removed > 0 {
                    info!(removed, remaining = store.len(), "已清理过期任务");
                }
            }
        });
        *service.sweeper.lock() = Some(handle);
        info!(
            retention_secs = config.retention.as_secs(),
            sweep_secs = period.as_secs(),
            "任务服务已启动"
        );
        service
    }

    /// 停止清理调度。已提交的转换不受影响。
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
            info!("任务服务已停止");
        }
    }

    #[inline]
    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    #[inline]
    pub fn config(&self) -> &JobServiceConfig {
        &self.config
    }

    pub fn sweep(&self) -> usize {
        self.store.sweep_expired()
    }

    /// 校验请求并在后台启动转换，立即返回任务编号。
    pub fn submit(&self, request: ConversionRequest) -> Result<JobId, ConversionError> {
        if request.features.is_empty() {
            return Err(ConversionError::EmptyFeatureSet);
        }
        request.validate()?;

        let store = self.store.clone();
        let id = store.create();
        let token = store.token(id).unwrap_or_default();
        info!(job = %id, features = request.features.len(), "任务已提交");

        tokio::spawn(async move {
            let sink = JobProgress::new(store.clone(), id, token);
            let outcome =
                tokio::task::spawn_blocking(move || convert_with_progress(&request, &sink)).await;
            match outcome {
                Ok(Ok(output)) => {
                    if !output.report.skipped.is_empty() {
                        warn!(job = %id, skipped = output.report.skipped.len(), "部分要素被跳过");
                    }
                    store.complete(id, output.bytes, output.report);
                }
                Ok(Err(err)) => {
                    store.fail(id, err.to_string());
                }
                Err(join) => {
                    error!(job = %id, error = %join, "转换任务异常终止");
                    store.fail(id, format!("转换任务异常终止: {join}"));
                }
            }
        });
        Ok(id)
    }

    pub fn get(&self, id: JobId) -> Option<JobSnapshot> {
        self.store.get(id)
    }

    pub fn result(&self, id: JobId) -> Result<Arc<Vec<u8>>, StoreError> {
        self.store.result(id)
    }

    pub fn cancel(&self, id: JobId) -> Result<JobSnapshot, StoreError> {
        self.store.cancel(id)
    }

    /// 按轮询间隔读取快照，状态变化时产出事件，到达终态后结束。
    pub fn watch(&self, id: JobId) -> impl Stream<Item = ProgressEvent> + Send + use<> {
        let store = self.store.clone();
        let period = self.config.poll_interval;
        async_stream::stream! {
            let mut ticker = tokio::time::interval(period);
            let mut last: Option<ProgressEvent> = None;
            loop {
                ticker.tick().await;
                let Some(snapshot) = store.get(id) else {
                    yield ProgressEvent::expired();
                    break;
                };
                let event = ProgressEvent::from(&snapshot);
                if last.as_ref() == Some(&event) {
                    continue;
                }
                let terminal = event.is_terminal();
                last = Some(event.clone());
                yield event;
                if terminal {
                    break;
                }
            }
        }
    }
}

impl Drop for JobService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
