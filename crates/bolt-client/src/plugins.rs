//! Plugins compiled into the client.

use std::error::Error;

use bolt_comm::Payload;
use bolt_comm::PluginExecutor;
use bolt_comm::PluginFactory;
use bolt_comm::StaticPluginRegistry;

/// Logs every payload it receives.
#[derive(Debug, Default)]
pub struct EchoPlugin {
    handled: u64,
}

impl PluginExecutor for EchoPlugin {
    fn handle_payload(&mut self, payload: &Payload) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.handled += 1;
        let body = serde_json::to_string(payload)?;
        tracing::info!(plugin = "echo", count = self.handled, %body, "echo");
        Ok(())
    }
}

/// Registry holding every built-in plugin.
pub fn builtin_registry() -> StaticPluginRegistry {
    StaticPluginRegistry::new().with(PluginFactory::with_executor("echo", EchoPlugin::default))
}
