use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use geocad_engine::ProgressSink;

use crate::store::{JobId, JobStore};

/// 可克隆的取消标志，由任务表持有一份、流水线持有一份。
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// 把流水线进度写回任务表。
pub struct JobProgress {
    store: Arc<JobStore>,
    id: JobId,
    token: CancellationToken,
}

impl JobProgress {
    pub fn new(store: Arc<JobStore>, id: JobId, token: CancellationToken) -> Self {
        Self { store, id, token }
    }
}

impl ProgressSink for JobProgress {
    fn report(&self, progress: u8, message: &str) {
        self.store.update_progress(self.id, progress, message);
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
