//! 内存任务表。
//!
//! 状态机：`Pending → Processing → {Completed | Failed}`。终态不再接受任何修改；
//! 过期清理按创建时间移除任务，与状态无关。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use geocad_engine::ConversionReport;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::errors::StoreError;

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// 任务的只读快照。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ConversionReport>,
}

struct JobRecord {
    status: JobStatus,
    progress: u8,
    message: String,
    error: Option<String>,
    result: Option<Arc<Vec<u8>>>,
    report: Option<ConversionReport>,
    created_at: Instant,
    token: CancellationToken,
}

impl JobRecord {
    fn snapshot(&self, id: JobId) -> JobSnapshot {
        JobSnapshot {
            id,
            status: self.status,
            progress: self.progress,
            message: self.message.clone(),
            error: self.error.clone(),
            report: self.report.clone(),
        }
    }
}

pub struct JobStore {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
    retention: Duration,
}

impl JobStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            retention,
        }
    }

    #[inline]
    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn create(&self) -> JobId {
        self.create_at(Instant::now())
    }

    pub fn create_at(&self, now: Instant) -> JobId {
        let id = Uuid::new_v4();
        let record = JobRecord {
            status: JobStatus::Pending,
            progress: 0,
            message: "排队中".to_string(),
            error: None,
            result: None,
            report: None,
            created_at: now,
            token: CancellationToken::new(),
        };
        self.jobs.write().insert(id, record);
        debug!(job = %id, "任务已创建");
        id
    }

    /// 更新进度；任务不存在或已处于终态时忽略并返回 false。
    pub fn update_progress(&self, id: JobId, progress: u8, message: &str) -> bool {
        let mut jobs = self.jobs.write();
        let Some(record) = jobs.get_mut(&id) else {
            return false;
        };
        if record.status.is_terminal() {
            return false;
        }
        record.status = JobStatus::Processing;
        record.progress = progress.min(100);
        record.message = message.to_string();
        true
    }

    pub fn complete(&self, id: JobId, bytes: Vec<u8>, report: ConversionReport) -> bool {
        let mut jobs = self.jobs.write();
        let Some(record) = jobs.get_mut(&id) else {
            return false;
        };
        if record.status.is_terminal() {
            return false;
        }
        record.status = JobStatus::Completed;
        record.progress = 100;
        record.message = "转换完成".to_string();
        record.result = Some(Arc::new(bytes));
        record.report = Some(report);
        info!(job = %id, "任务完成");
        true
    }

    pub fn fail(&self, id: JobId, error: impl Into<String>) -> bool {
        let mut jobs = self.jobs.write();
        let Some(record) = jobs.get_mut(&id) else {
            return false;
        };
        if record.status.is_terminal() {
            return false;
        }
        let error = error.into();
        info!(job = %id, error = %error, "任务失败");
        record.status = JobStatus::Failed;
        record.message = "转换失败".to_string();
        record.error = Some(error);
        true
    }

    pub fn get(&self, id: JobId) -> Option<JobSnapshot> {
        self.jobs.read().get(&id).map(|record| record.snapshot(id))
    }

    /// 已完成任务的 DXF 字节。
    pub fn result(&self, id: JobId) -> Result<Arc<Vec<u8>>, StoreError> {
        let jobs = self.jobs.read();
        let record = jobs.get(&id).ok_or(StoreError::NotFound(id))?;
        match (&record.status, &record.result) {
            (JobStatus::Completed, Some(bytes)) => Ok(bytes.clone()),
            (JobStatus::Failed, _) => Err(StoreError::Failed {
                id,
                message: record.error.clone().unwrap_or_default(),
            }),
            _ => Err(StoreError::NotReady(id)),
        }
    }

    pub fn token(&self, id: JobId) -> Option<CancellationToken> {
        self.jobs.read().get(&id).map(|record| record.token.clone())
    }

    /// 请求取消；终态任务不受影响。
    pub fn cancel(&self, id: JobId) -> Result<JobSnapshot, StoreError> {
        let jobs = self.jobs.read();
        let record = jobs.get(&id).ok_or(StoreError::NotFound(id))?;
        if !record.status.is_terminal() {
            record.token.cancel();
            info!(job = %id, "已请求取消任务");
        }
        Ok(record.snapshot(id))
    }

    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    /// 移除创建时间早于 `now - retention` 的任务，返回移除数量。
    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let mut jobs = self.jobs.write();
        let before = jobs.len();
        let retention = self.retention;
        jobs.retain(|_, record| now.saturating_duration_since(record.created_at) <= retention);
        before - jobs.len()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> JobStore {
        JobStore::new(Duration::from_secs(15 * 60))
    }

    #[test]
    fn job_lifecycle_follows_the_state_machine() {
        let store = store();
        let id = store.create();
        let fresh = store.get(id).expect("任务存在");
        assert_eq!(fresh.status, JobStatus::Pending);
        assert_eq!(fresh.progress, 0);

        assert!(store.update_progress(id, 50, "x"));
        let running = store.get(id).expect("任务存在");
        assert_eq!(running.status, JobStatus::Processing);
        assert_eq!(running.progress, 50);
        assert_eq!(running.message, "x");

        assert!(store.complete(id, b"EOF".to_vec(), ConversionReport::default()));
        assert!(!store.update_progress(id, 10, "迟到的进度"));
        assert!(!store.fail(id, "迟到的失败"));
        let done = store.get(id).expect("任务存在");
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(store.result(id).expect("结果可取").as_slice(), b"EOF");
    }

    #[test]
    fn failed_job_is_terminal_and_reports_its_error() {
        let store = store();
        let id = store.create();
        assert!(store.fail(id, "编码失败"));
        assert!(!store.complete(id, Vec::new(), ConversionReport::default()));
        assert_eq!(
            store.result(id),
            Err(StoreError::Failed {
                id,
                message: "编码失败".to_string()
            })
        );
        assert_eq!(store.get(id).and_then(|job| job.error).as_deref(), Some("编码失败"));
    }

    #[test]
    fn result_distinguishes_missing_and_pending_jobs() {
        let store = store();
        let unknown = Uuid::new_v4();
        assert_eq!(store.result(unknown), Err(StoreError::NotFound(unknown)));
        assert!(!store.update_progress(unknown, 10, "x"));

        let id = store.create();
        assert_eq!(store.result(id), Err(StoreError::NotReady(id)));
    }

    #[test]
    fn sweep_removes_jobs_older_than_retention_regardless_of_status() {
        let store = store();
        let start = Instant::now();
        let old_running = store.create_at(start);
        store.update_progress(old_running, 40, "处理中");
        let old_done = store.create_at(start);
        store.complete(old_done, Vec::new(), ConversionReport::default());
        let young = store.create_at(start + Duration::from_secs(10 * 60));

        let removed = store.sweep_expired_at(start + Duration::from_secs(16 * 60));
        assert_eq!(removed, 2);
        assert!(store.get(old_running).is_none());
        assert!(store.get(old_done).is_none());
        assert!(store.get(young).is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn cancel_flips_the_token_only_for_live_jobs() {
        let store = store();
        let id = store.create();
        let token = store.token(id).expect("取消标志");
        store.cancel(id).expect("任务存在");
        assert!(token.is_cancelled());

        let finished = store.create();
        let finished_token = store.token(finished).expect("取消标志");
        store.complete(finished, Vec::new(), ConversionReport::default());
        store.cancel(finished).expect("任务存在");
        assert!(!finished_token.is_cancelled());

        let unknown = Uuid::new_v4();
        assert_eq!(store.cancel(unknown), Err(StoreError::NotFound(unknown)));
    }

    #[test]
    fn snapshot_serializes_lowercase_status() {
        let store = store();
        let id = store.create();
        let json = serde_json::to_value(store.get(id).expect("任务存在")).expect("序列化");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["progress"], 0);
        assert!(json.get("error").is_none());
    }
}
