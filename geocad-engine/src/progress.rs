//! 进度上报能力。流水线只依赖这个 trait，观察方式（SSE、轮询、同步调用）由实现决定。

/// 进度接收端。`progress` 为 0–100 的百分比。
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: u8, message: &str);

    /// 协作式取消：流水线在每个让出点查询。
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// 同步调用使用的空实现。
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _progress: u8, _message: &str) {}
}

impl<T: ProgressSink + ?Sized> ProgressSink for &T {
    fn report(&self, progress: u8, message: &str) {
        (**self).report(progress, message);
    }

    fn is_cancelled(&self) -> bool {
        (**self).is_cancelled()
    }
}

/// 流水线阶段在总进度中所占的区间。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phase {
    pub start: u8,
    pub end: u8,
}

impl Phase {
    pub const CONTOURS: Phase = Phase { start: 0, end: 10 };
    pub const FEATURES: Phase = Phase { start: 10, end: 80 };
    pub const GRID: Phase = Phase { start: 80, end: 85 };
    pub const TERRAIN: Phase = Phase { start: 85, end: 95 };
    pub const ASSEMBLY: Phase = Phase { start: 95, end: 100 };

    /// 阶段内完成 `done / total` 时的总进度。
    pub fn at(self, done: usize, total: usize) -> u8 {
        if total == 0 {
            return self.start;
        }
        let span = f64::from(self.end - self.start);
        let fraction = (done.min(total) as f64) / (total as f64);
        self.start + (span * fraction).floor() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<u8>>);

    impl ProgressSink for Recorder {
        fn report(&self, progress: u8, _message: &str) {
            self.0.lock().expect("锁未中毒").push(progress);
        }
    }

    #[test]
    fn phase_maps_fraction_into_its_range() {
        assert_eq!(Phase::FEATURES.at(0, 200), 10);
        assert_eq!(Phase::FEATURES.at(100, 200), 45);
        assert_eq!(Phase::FEATURES.at(200, 200), 80);
        assert_eq!(Phase::FEATURES.at(500, 200), 80);
        assert_eq!(Phase::GRID.at(3, 0), 80);
    }

    #[test]
    fn references_forward_to_the_sink() {
        let recorder = Recorder::default();
        let sink: &dyn ProgressSink = &recorder;
        (&sink).report(42, "测试");
        assert!(!(&sink).is_cancelled());
        assert_eq!(*recorder.0.lock().expect("锁未中毒"), vec![42]);
    }
}
