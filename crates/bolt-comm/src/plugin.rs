//! Plugin executor contract and the name → factory registration table.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use error_stack::Report;

use crate::error::DispatchError;
use crate::error::DispatchResult;
use crate::types::Payload;

/// Consumes the payload of one task.
pub trait PluginExecutor: Send {
    /// Handle a payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the plugin fails; the router logs it and moves on.
    fn handle_payload(
        &mut self,
        payload: &Payload,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

type ExecutorBuilder = Arc<dyn Fn() -> Box<dyn PluginExecutor> + Send + Sync>;

/// Registration entry for one plugin.
///
/// Whether a plugin can handle payloads is declared here, once, when the
/// plugin is registered.
#[derive(Clone)]
pub struct PluginFactory {
    name: String,
    builder: Option<ExecutorBuilder>,
}

impl PluginFactory {
    /// Plugin whose executor is built by `build` for every dispatched task.
    pub fn with_executor<F, E>(name: impl Into<String>, build: F) -> Self
    where
        F: Fn() -> E + Send + Sync + 'static,
        E: PluginExecutor + 'static,
    {
        Self {
            name: name.into(),
            builder: Some(Arc::new(move || Box::new(build()) as Box<dyn PluginExecutor>)),
        }
    }

    /// Plugin known to the registry that does not consume payloads.
    pub fn without_executor(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            builder: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handles_payloads(&self) -> bool {
        self.builder.is_some()
    }

    /// Build a fresh executor, `None` if the plugin cannot handle payloads.
    pub fn instantiate(&self) -> Option<Box<dyn PluginExecutor>> {
        self.builder.as_ref().map(|build| build())
    }
}

impl fmt::Debug for PluginFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginFactory")
            .field("name", &self.name)
            .field("handles_payloads", &self.handles_payloads())
            .finish()
    }
}

/// Resolves a plugin name to its factory.
pub trait PluginRegistry: Send + Sync {
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownPlugin`] if `name` is not registered.
    fn resolve(&self, name: &str) -> DispatchResult<PluginFactory>;
}

impl<T> PluginRegistry for Arc<T>
where T: PluginRegistry
{
    fn resolve(&self, name: &str) -> DispatchResult<PluginFactory> {
        (**self).resolve(name)
    }
}

/// Registration table populated at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticPluginRegistry {
    plugins: HashMap<String, PluginFactory>,
}

impl StaticPluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin, returning the factory it replaced.
    pub fn register(&mut self, factory: PluginFactory) -> Option<PluginFactory> {
        tracing::debug!(
            plugin = factory.name(),
            handles_payloads = factory.handles_payloads(),
            "Registering plugin"
        );
        self.plugins.insert(factory.name().to_string(), factory)
    }

    /// Builder form of [`Self::register`].
    pub fn with(mut self, factory: PluginFactory) -> Self {
        self.register(factory);
        self
    }

    /// Registered plugin names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl PluginRegistry for StaticPluginRegistry {
    fn resolve(&self, name: &str) -> DispatchResult<PluginFactory> {
        self.plugins.get(name).cloned().ok_or_else(|| {
            Report::new(DispatchError::UnknownPlugin {
                name: name.to_string(),
            })
        })
    }
}
