use chrono::Utc;
use procfs::CurrentSI;
use procfs::KernelStats;
use sysinfo::System;

use crate::collector::Collector;
use crate::collector::MetricRecorder;
use crate::error::CollectorError;

/// Cumulative time spent per CPU state since boot, in seconds.
const TIME_METRICS: [&str; 7] = ["user", "system", "nice", "idle", "iowait", "irq", "softirq"];
/// Global utilisation in percent and the load averages.
const LOAD_METRICS: [&str; 4] = ["usage", "load_1", "load_5", "load_15"];

/// CPU time split from `/proc/stat`, plus global utilisation and load.
pub struct CpuCollector {
    system: System,
    recorder: MetricRecorder,
}

impl CpuCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        // usage is computed between two refreshes
        system.refresh_cpu_all();

        let mut recorder = MetricRecorder::new("cpu");
        for metric in TIME_METRICS.into_iter().chain(LOAD_METRICS) {
            recorder.declare(metric);
        }
        Self { system, recorder }
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn seconds(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

impl Collector for CpuCollector {
    fn recorder(&self) -> &MetricRecorder {
        &self.recorder
    }

    fn recorder_mut(&mut self) -> &mut MetricRecorder {
        &mut self.recorder
    }

    fn start_sampling(&mut self) -> Result<(), CollectorError> {
        let times = KernelStats::current()?.total;
        self.system.refresh_cpu_all();
        let load = System::load_average();
        let now = Utc::now();

        let recorder = &mut self.recorder;
        recorder.record("user", now, seconds(times.user_ms()));
        recorder.record("system", now, seconds(times.system_ms()));
        recorder.record("nice", now, seconds(times.nice_ms()));
        recorder.record("idle", now, seconds(times.idle_ms()));
        // absent on old kernels
        for (metric, value) in [
            ("iowait", times.iowait_ms()),
            ("irq", times.irq_ms()),
            ("softirq", times.softirq_ms()),
        ] {
            if let Some(ms) = value {
                recorder.record(metric, now, seconds(ms));
            }
        }

        recorder.record("usage", now, f64::from(self.system.global_cpu_usage()));
        recorder.record("load_1", now, load.one);
        recorder.record("load_5", now, load.five);
        recorder.record("load_15", now, load.fifteen);
        Ok(())
    }
}
