//! Collector contract and the per-instance series storage collectors record into.

use std::collections::HashMap;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;

use crate::error::CollectorError;
use crate::series::MetricSeries;

/// Sampling interval a collector starts with unless configured otherwise.
pub const DEFAULT_SAMPLING_INTERVAL: Duration = Duration::from_secs(5);

/// Series storage owned by one collector instance.
///
/// Only the sampling loop of that instance writes to it.
#[derive(Debug, Clone)]
pub struct MetricRecorder {
    collector_name: String,
    sampling_interval: Duration,
    data: HashMap<String, MetricSeries>,
}

impl MetricRecorder {
    pub fn new(collector_name: impl Into<String>) -> Self {
        Self::with_interval(collector_name, DEFAULT_SAMPLING_INTERVAL)
    }

    pub fn with_interval(collector_name: impl Into<String>, sampling_interval: Duration) -> Self {
        Self {
            collector_name: collector_name.into(),
            sampling_interval,
            data: HashMap::new(),
        }
    }

    pub fn collector_name(&self) -> &str {
        &self.collector_name
    }

    pub fn sampling_interval(&self) -> Duration {
        self.sampling_interval
    }

    pub fn set_sampling_interval(&mut self, sampling_interval: Duration) {
        self.sampling_interval = sampling_interval;
    }

    /// Create an empty series for `metric` so it shows up even without samples.
    pub fn declare(&mut self, metric: &str) {
        self.data.entry(metric.to_string()).or_default();
    }

    pub fn record(&mut self, metric: &str, timestamp: DateTime<Utc>, value: f64) {
        self.data
            .entry(metric.to_string())
            .or_default()
            .push(timestamp, value);
    }

    pub fn record_now(&mut self, metric: &str, value: f64) {
        self.record(metric, Utc::now(), value);
    }

    pub fn series(&self, metric: &str) -> Option<&MetricSeries> {
        self.data.get(metric)
    }

    pub fn data(&self) -> &HashMap<String, MetricSeries> {
        &self.data
    }

    /// Move every series out, leaving the recorder empty.
    pub(crate) fn take_data(&mut self) -> HashMap<String, MetricSeries> {
        std::mem::take(&mut self.data)
    }
}

/// A pluggable source of samples for one metric family.
///
/// Implementations embed a [`MetricRecorder`] and record into it from
/// [`Collector::start_sampling`].
pub trait Collector: Send {
    fn recorder(&self) -> &MetricRecorder;

    fn recorder_mut(&mut self) -> &mut MetricRecorder;

    /// Run exactly one sampling round, recording zero or more samples.
    ///
    /// # Errors
    ///
    /// Returns an error if the round failed; the sampling loop logs it and
    /// keeps going on its next tick.
    fn start_sampling(&mut self) -> Result<(), CollectorError>;

    fn name(&self) -> &str {
        self.recorder().collector_name()
    }

    fn sampling_interval(&self) -> Duration {
        self.recorder().sampling_interval()
    }

    fn set_sampling_interval(&mut self, sampling_interval: Duration) {
        self.recorder_mut().set_sampling_interval(sampling_interval);
    }
}
