//! Periodic metric sampling for the bolt client.
//!
//! A [`CollectorRegistry`] lists collector candidates; discovery keeps those
//! able to sample. [`MetricSamplingService`] runs one independent loop per
//! eligible collector and, on stop, merges every series into a
//! [`MetricSnapshot`] keyed `"{collector}.{metric}"`.

pub mod collector;
pub mod collectors;
pub mod error;
pub mod registry;
pub mod series;
pub mod service;

pub use collector::Collector;
pub use collector::MetricRecorder;
pub use collector::DEFAULT_SAMPLING_INTERVAL;
pub use error::CollectorError;
pub use registry::CollectorDefinition;
pub use registry::CollectorRegistry;
pub use registry::EligibleCollector;
pub use series::MetricSeries;
pub use series::MetricSnapshot;
pub use series::Sample;
pub use service::MetricSamplingService;
