//! Runs one sampling loop per eligible collector and aggregates their series.
//!
//! Every loop owns its collector instance outright and runs each sampling
//! round on the blocking pool, so a slow collector delays only itself. On
//! [`MetricSamplingService::stop`] the loops are cancelled and joined; each
//! join hands the collector back, and only then are the series moved into the
//! [`MetricSnapshot`]. No series is ever read while its loop can still write
//! to it.

use std::collections::HashMap;
use std::collections::HashSet;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::collector::Collector;
use crate::registry::CollectorRegistry;
use crate::registry::EligibleCollector;
use crate::series::MetricSnapshot;

/// Shortest pause between two rounds of the same collector.
const MIN_SAMPLING_INTERVAL: Duration = Duration::from_millis(1);

type SamplingLoop = JoinHandle<Option<Box<dyn Collector>>>;

/// Background sampling over a fixed set of collector types.
pub struct MetricSamplingService {
    collectors: Vec<EligibleCollector>,
    interval_overrides: HashMap<String, Duration>,
    running: Option<Running>,
}

struct Running {
    cancellation_token: CancellationToken,
    loops: Vec<(String, SamplingLoop)>,
}

impl MetricSamplingService {
    pub fn new(collectors: Vec<EligibleCollector>) -> Self {
        Self {
            collectors,
            interval_overrides: HashMap::new(),
            running: None,
        }
    }

    /// Service over everything `registry` discovers.
    pub fn from_registry(registry: &CollectorRegistry) -> Self {
        Self::new(registry.discover())
    }

    /// Sample collector `name` every `interval` instead of its default.
    ///
    /// `name` is matched against the collector's own name first, then against
    /// the name it was registered under.
    pub fn with_sampling_interval(mut self, name: impl Into<String>, interval: Duration) -> Self {
        self.interval_overrides.insert(name.into(), interval);
        self
    }

    pub fn collectors(&self) -> &[EligibleCollector] {
        &self.collectors
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Instantiate every collector and launch one sampling loop per instance.
    ///
    /// Snapshot keys are scoped by collector name, so an instance whose name is
    /// already taken by an earlier collector is dropped with an error log.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if the service is already running. Calling `start` twice
    /// without a `stop` in between is a caller bug.
    pub fn start(&mut self) {
        assert!(
            self.running.is_none(),
            "sampling service started while already running"
        );

        let cancellation_token = CancellationToken::new();
        let mut names = HashSet::new();
        let mut loops = Vec::with_capacity(self.collectors.len());

        for eligible in &self.collectors {
            let mut collector = eligible.instantiate();
            let name = collector.name().to_string();
            if name != eligible.name() {
                warn!(
                    collector = %name,
                    registered_as = %eligible.name(),
                    "Collector reports a different name than it was registered under"
                );
            }
            if !names.insert(name.clone()) {
                error!(
                    collector = %name,
                    registered_as = %eligible.name(),
                    "Another collector already samples under this name, skipping"
                );
                continue;
            }

            let interval = self
                .interval_overrides
                .get(&name)
                .or_else(|| self.interval_overrides.get(eligible.name()));
            if let Some(interval) = interval {
                collector.set_sampling_interval(*interval);
            }

            info!(
                collector = %name,
                interval_sec = collector.sampling_interval().as_secs_f32(),
                "Starting sampling loop"
            );
            let handle = tokio::spawn(run_sampling_loop(collector, cancellation_token.clone()));
            loops.push((name, handle));
        }

        for configured in self.interval_overrides.keys() {
            let known = names.contains(configured)
                || self.collectors.iter().any(|eligible| eligible.name() == configured);
            if !known {
                warn!(collector = %configured, "Sampling interval configured for unknown collector");
            }
        }

        self.running = Some(Running {
            cancellation_token,
            loops,
        });
    }

    /// Stop every loop, wait for all of them, and aggregate their series.
    ///
    /// Returns promptly: loops observe the stop signal during their interval
    /// sleep. A round already in progress finishes first.
    ///
    /// # Panics
    ///
    /// Panics if the service is not running, i.e. `stop` without a matching
    /// `start`, or a second `stop`.
    pub async fn stop(&mut self) -> MetricSnapshot {
        let running = self
            .running
            .take()
            .expect("sampling service stopped while not running");
        running.cancellation_token.cancel();

        let mut finished = Vec::with_capacity(running.loops.len());
        for (name, handle) in running.loops {
            match handle.await {
                Ok(Some(collector)) => finished.push(collector),
                Ok(None) => error!(collector = %name, "Collector was lost mid-round, its series are lost"),
                Err(e) => error!(collector = %name, error = %e, "Sampling loop aborted, its series are lost"),
            }
        }

        // every loop has been joined, the series have a single owner again
        let mut snapshot = MetricSnapshot::default();
        for mut collector in finished {
            let name = collector.name().to_string();
            let data = collector.recorder_mut().take_data();
            snapshot.absorb(&name, data);
        }

        info!(
            series = snapshot.len(),
            samples = snapshot.sample_count(),
            "Sampling stopped"
        );
        snapshot
    }
}

/// Returns the collector once cancelled, `None` if it could not be recovered
/// from the blocking pool.
async fn run_sampling_loop(
    mut collector: Box<dyn Collector>,
    cancellation_token: CancellationToken,
) -> Option<Box<dyn Collector>> {
    let name = collector.name().to_string();

    while !cancellation_token.is_cancelled() {
        let round = tokio::task::spawn_blocking(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| collector.start_sampling()));
            (collector, outcome)
        })
        .await;

        let outcome = match round {
            Ok((returned, outcome)) => {
                collector = returned;
                outcome
            }
            Err(e) => {
                error!(collector = %name, error = %e, "Sampling round did not complete");
                return None;
            }
        };

        match outcome {
            Ok(Ok(())) => trace!(collector = %name, "Sampling round complete"),
            Ok(Err(e)) => warn!(collector = %name, error = %e, "Sampling round failed"),
            Err(_) => {
                error!(collector = %name, "Collector panicked, its sampling loop ends");
                break;
            }
        }

        let interval = collector.sampling_interval().max(MIN_SAMPLING_INTERVAL);
        tokio::select! {
            _ = cancellation_token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    Some(collector)
}
