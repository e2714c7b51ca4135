use chrono::Utc;
use procfs::Current;
use procfs::Meminfo;

use crate::collector::Collector;
use crate::collector::MetricRecorder;
use crate::error::CollectorError;

const METRICS: [&str; 7] = ["total", "used", "free", "cached", "shared", "available", "swap_used"];

/// Physical memory and swap usage from `/proc/meminfo`, in bytes.
pub struct MemoryCollector {
    recorder: MetricRecorder,
}

impl MemoryCollector {
    pub fn new() -> Self {
        let mut recorder = MetricRecorder::new("memory");
        for metric in METRICS {
            recorder.declare(metric);
        }
        Self { recorder }
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for MemoryCollector {
    fn recorder(&self) -> &MetricRecorder {
        &self.recorder
    }

    fn recorder_mut(&mut self) -> &mut MetricRecorder {
        &mut self.recorder
    }

    fn start_sampling(&mut self) -> Result<(), CollectorError> {
        let meminfo = Meminfo::current()?;
        let now = Utc::now();

        if meminfo.mem_total == 0 {
            return Err(CollectorError::Source {
                collector: self.recorder.collector_name().to_string(),
                source_name: "meminfo".to_string(),
                message: "total memory reported as zero".to_string(),
            });
        }

        // used excludes buffers and page cache
        let used = meminfo
            .mem_total
            .saturating_sub(meminfo.mem_free)
            .saturating_sub(meminfo.buffers)
            .saturating_sub(meminfo.cached);

        let recorder = &mut self.recorder;
        recorder.record("total", now, meminfo.mem_total as f64);
        recorder.record("used", now, used as f64);
        recorder.record("free", now, meminfo.mem_free as f64);
        recorder.record("cached", now, meminfo.cached as f64);
        if let Some(shared) = meminfo.shmem {
            recorder.record("shared", now, shared as f64);
        }
        if let Some(available) = meminfo.mem_available {
            recorder.record("available", now, available as f64);
        }
        recorder.record(
            "swap_used",
            now,
            meminfo.swap_total.saturating_sub(meminfo.swap_free) as f64,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn declared_metrics_exist_before_sampling() {
        let collector = MemoryCollector::new();

        assert_eq!(collector.name(), "memory");
        let mut metrics: Vec<&str> = collector.recorder().data().keys().map(String::as_str).collect();
        metrics.sort_unstable();
        assert_eq!(metrics, vec![
            "available",
            "cached",
            "free",
            "shared",
            "swap_used",
            "total",
            "used"
        ]);
        assert!(collector.recorder().data().values().all(|series| series.is_empty()));
    }

    #[test]
    fn used_never_exceeds_total() {
        let mut collector = MemoryCollector::new();
        collector.start_sampling().expect("sample memory");

        let last = |metric: &str| {
            collector
                .recorder()
                .series(metric)
                .and_then(|series| series.last())
                .map(|sample| sample.value)
                .expect("metric recorded")
        };
        assert!(last("total") > 0.0);
        assert!(last("used") <= last("total"));
        assert!(last("free") <= last("total"));
        assert!(last("cached") >= 0.0);
    }
}
