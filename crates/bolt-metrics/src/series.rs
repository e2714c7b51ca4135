//! Sample containers: one series per metric, one snapshot per sampling run.

use std::collections::HashMap;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

/// One recorded (timestamp, value) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Samples of one metric, in recording order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSeries(Vec<Sample>);

impl MetricSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, timestamp: DateTime<Utc>, value: f64) {
        self.0.push(Sample { timestamp, value });
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.0
    }

    pub fn last(&self) -> Option<&Sample> {
        self.0.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.0.iter()
    }

    /// Fold `other` in, keeping samples ordered by timestamp.
    fn merge(&mut self, other: MetricSeries) {
        self.0.extend(other.0);
        self.0.sort_by_key(|sample| sample.timestamp);
    }
}

/// Snapshot key of `metric` recorded by `collector`.
pub fn snapshot_key(collector: &str, metric: &str) -> String {
    format!("{collector}.{metric}")
}

/// Every series of every collector, keyed `"{collector}.{metric}"`.
///
/// Built once after all sampling loops have ended; read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSnapshot(HashMap<String, MetricSeries>);

impl MetricSnapshot {
    /// Move the series recorded under `collector` into the snapshot.
    ///
    /// A key that is already present is never overwritten: both series are
    /// merged and the collision is logged.
    pub(crate) fn absorb(&mut self, collector: &str, data: HashMap<String, MetricSeries>) {
        for (metric, series) in data {
            let key = snapshot_key(collector, &metric);
            match self.0.get_mut(&key) {
                Some(existing) => {
                    warn!(key = %key, "Series recorded by more than one collector, merging");
                    existing.merge(series);
                }
                None => {
                    self.0.insert(key, series);
                }
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetricSeries> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Keys in unspecified order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricSeries)> {
        self.0.iter().map(|(key, series)| (key.as_str(), series))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of samples across all series.
    pub fn sample_count(&self) -> usize {
        self.0.values().map(MetricSeries::len).sum()
    }
}
