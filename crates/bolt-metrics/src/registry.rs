//! Explicit table of collector candidates and the eligibility filter over it.

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use tracing::warn;

use crate::collector::Collector;
use crate::collectors::CpuCollector;
use crate::collectors::MemoryCollector;

type CollectorBuilder = Arc<dyn Fn() -> Box<dyn Collector> + Send + Sync>;

/// One candidate known to the registry.
#[derive(Clone)]
pub struct CollectorDefinition {
    name: String,
    builder: Option<CollectorBuilder>,
}

impl CollectorDefinition {
    /// Candidate that can sample: `build` creates one fresh instance per start.
    pub fn sampler<F, C>(name: impl Into<String>, build: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: Collector + 'static,
    {
        Self {
            name: name.into(),
            builder: Some(Arc::new(move || Box::new(build()) as Box<dyn Collector>)),
        }
    }

    /// Candidate without sampling capability, never eligible.
    pub fn passive(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            builder: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn can_sample(&self) -> bool {
        self.builder.is_some()
    }
}

impl fmt::Debug for CollectorDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorDefinition")
            .field("name", &self.name)
            .field("can_sample", &self.can_sample())
            .finish()
    }
}

/// A collector type that passed discovery.
#[derive(Clone)]
pub struct EligibleCollector {
    name: String,
    builder: CollectorBuilder,
}

impl EligibleCollector {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// New instance with its own default interval and empty series.
    pub fn instantiate(&self) -> Box<dyn Collector> {
        (self.builder)()
    }
}

impl fmt::Debug for EligibleCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EligibleCollector")
            .field("name", &self.name)
            .finish()
    }
}

/// Registration table of collector candidates.
#[derive(Debug, Clone, Default)]
pub struct CollectorRegistry {
    candidates: Vec<CollectorDefinition>,
}

impl CollectorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the collectors shipped in this crate.
    pub fn builtin() -> Self {
        Self::new()
            .with(CollectorDefinition::sampler("cpu", CpuCollector::new))
            .with(CollectorDefinition::sampler("memory", MemoryCollector::new))
    }

    /// Add a candidate, returning the one it replaced under the same name.
    ///
    /// The replaced candidate keeps its position in registration order.
    pub fn register(&mut self, definition: CollectorDefinition) -> Option<CollectorDefinition> {
        debug!(
            collector = %definition.name,
            can_sample = definition.can_sample(),
            "Registering collector"
        );
        match self
            .candidates
            .iter_mut()
            .find(|candidate| candidate.name == definition.name)
        {
            Some(existing) => {
                warn!(collector = %definition.name, "Collector registered twice, replacing the earlier one");
                Some(std::mem::replace(existing, definition))
            }
            None => {
                self.candidates.push(definition);
                None
            }
        }
    }

    pub fn with(mut self, definition: CollectorDefinition) -> Self {
        self.register(definition);
        self
    }

    /// Drop every candidate whose name is not in `enabled`.
    ///
    /// Returns the names in `enabled` that match no candidate; each is also
    /// logged.
    pub fn retain_enabled<S: AsRef<str>>(&mut self, enabled: &[S]) -> Vec<String> {
        let unknown: Vec<String> = enabled
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| !self.candidates.iter().any(|candidate| candidate.name() == *name))
            .map(str::to_string)
            .collect();
        for name in &unknown {
            warn!(collector = %name, "Enabled collector is not registered");
        }

        self.candidates
            .retain(|candidate| enabled.iter().any(|name| name.as_ref() == candidate.name()));
        if self.candidates.is_empty() {
            warn!("No registered collector is enabled");
        }
        unknown
    }

    pub fn candidates(&self) -> &[CollectorDefinition] {
        &self.candidates
    }

    /// Candidates that can sample, in registration order.
    pub fn discover(&self) -> Vec<EligibleCollector> {
        self.candidates
            .iter()
            .filter_map(|candidate| match &candidate.builder {
                Some(builder) => Some(EligibleCollector {
                    name: candidate.name.clone(),
                    builder: builder.clone(),
                }),
                None => {
                    debug!(collector = %candidate.name, "Skipping collector without sampling capability");
                    None
                }
            })
            .collect()
    }
}
