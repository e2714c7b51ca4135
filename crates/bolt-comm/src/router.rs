//! Decodes inbound frames and hands their payload to the matching plugin.

use error_stack::Report;
use tracing::debug;
use tracing::instrument;
use tracing::warn;

use crate::error::DispatchError;
use crate::error::DispatchResult;
use crate::handler::FrameHandler;
use crate::plugin::PluginRegistry;
use crate::types::TaskMessage;

/// Synchronous frame → plugin executor dispatcher.
pub struct MessageRouter<R> {
    registry: R,
}

impl<R> MessageRouter<R>
where R: PluginRegistry
{
    pub fn new(registry: R) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Decode `frame` and route it.
    ///
    /// Returns `Ok(true)` once the executor has run, `Ok(false)` if the plugin
    /// is unknown or cannot handle payloads. Blocks until the executor returns.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Decode`] if the frame is not a valid envelope.
    pub fn dispatch(&self, frame: &[u8]) -> DispatchResult<bool> {
        let message = TaskMessage::decode(frame)?;
        Ok(self.route(&message))
    }

    /// Route an already decoded message.
    #[instrument(skip_all, fields(message_id = %message.id(), plugin = %message.plugin_name()))]
    pub fn route(&self, message: &TaskMessage) -> bool {
        let factory = match self.registry.resolve(message.plugin_name()) {
            Ok(factory) => factory,
            Err(report) => {
                warn!(error = ?report, "Dropping task for unresolved plugin");
                return false;
            }
        };

        let Some(mut executor) = factory.instantiate() else {
            let report = Report::new(DispatchError::UnsupportedExecutor {
                name: factory.name().to_string(),
            });
            warn!(error = ?report, "Dropping task for plugin without payload handler");
            return false;
        };

        debug!("Handing payload to plugin executor");
        if let Err(e) = executor.handle_payload(message.payload()) {
            warn!(error = %e, "Plugin executor reported a failure");
        }
        true
    }
}

impl<R> FrameHandler for MessageRouter<R>
where R: PluginRegistry
{
    fn handle_frame(&self, frame: &[u8]) {
        if let Err(report) = self.dispatch(frame) {
            warn!(bytes = frame.len(), error = ?report, "Dropping undecodable frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::sync::Mutex;

    use serde_json::json;
    use serde_json::Value;
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::plugin::PluginExecutor;
    use crate::plugin::PluginFactory;
    use crate::plugin::StaticPluginRegistry;
    use crate::types::Payload;

    type Received = Arc<Mutex<Vec<Payload>>>;

    struct RecordingExecutor {
        received: Received,
    }

    impl PluginExecutor for RecordingExecutor {
        fn handle_payload(
            &mut self,
            payload: &Payload,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.received.lock().expect("poisoned").push(payload.clone());
            Ok(())
        }
    }

    struct FailingExecutor;

    impl PluginExecutor for FailingExecutor {
        fn handle_payload(
            &mut self,
            _payload: &Payload,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err("boom".into())
        }
    }

    /// Registry stub counting lookups and executor instantiations.
    #[derive(Default)]
    struct CountingRegistry {
        inner: StaticPluginRegistry,
        resolved: AtomicUsize,
        instantiated: Arc<AtomicUsize>,
    }

    impl CountingRegistry {
        fn with_recorder(name: &str, received: Received) -> Self {
            let instantiated = Arc::new(AtomicUsize::new(0));
            let counter = instantiated.clone();
            let inner = StaticPluginRegistry::new().with(PluginFactory::with_executor(name, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                RecordingExecutor {
                    received: received.clone(),
                }
            }));
            Self {
                inner,
                resolved: AtomicUsize::new(0),
                instantiated,
            }
        }
    }

    impl PluginRegistry for CountingRegistry {
        fn resolve(&self, name: &str) -> DispatchResult<PluginFactory> {
            self.resolved.fetch_add(1, Ordering::SeqCst);
            self.inner.resolve(name)
        }
    }

    #[test]
    fn dispatches_to_known_plugin() {
        let received = Received::default();
        let router = MessageRouter::new(CountingRegistry::with_recorder("X", received.clone()));

        let dispatched = router
            .dispatch(br#"{"id":"1","payload":{"plugin_name":"X","a":1}}"#)
            .expect("valid frame");

        assert!(dispatched);
        assert_eq!(router.registry().instantiated.load(Ordering::SeqCst), 1);
        let received = received.lock().expect("poisoned");
        assert_eq!(received.len(), 1);
        assert_eq!(Value::Object(received[0].clone()), json!({"plugin_name": "X", "a": 1}));
    }

    #[test]
    fn unknown_plugin_instantiates_nothing() {
        let received = Received::default();
        let router = MessageRouter::new(CountingRegistry::with_recorder("X", received.clone()));

        let dispatched = router
            .dispatch(br#"{"id":"2","payload":{"plugin_name":"Y"}}"#)
            .expect("valid frame");

        assert!(!dispatched);
        assert_eq!(router.registry().resolved.load(Ordering::SeqCst), 1);
        assert_eq!(router.registry().instantiated.load(Ordering::SeqCst), 0);
        assert!(received.lock().expect("poisoned").is_empty());
    }

    #[test]
    fn plugin_without_payload_handler_is_not_invoked() {
        let router =
            MessageRouter::new(StaticPluginRegistry::new().with(PluginFactory::without_executor("meta")));

        let dispatched = router
            .dispatch(br#"{"id":"3","payload":{"plugin_name":"meta"}}"#)
            .expect("valid frame");

        assert!(!dispatched);
    }

    #[test]
    fn nested_payload_reaches_executor_unmodified() {
        let received = Received::default();
        let router = MessageRouter::new(CountingRegistry::with_recorder("deep", received.clone()));
        let payload = json!({
            "plugin_name": "deep",
            "args": {"list": [1, 2, {"k": null}], "flag": true, "ratio": 0.5},
            "tags": ["a", "b"]
        });
        let frame = serde_json::to_vec(&json!({"id": "4", "payload": payload})).expect("encode");

        assert!(router.dispatch(&frame).expect("valid frame"));

        let received = received.lock().expect("poisoned");
        assert_eq!(Value::Object(received[0].clone()), payload);
    }

    #[test]
    fn executor_failure_still_counts_as_dispatched() {
        let router = MessageRouter::new(
            StaticPluginRegistry::new().with(PluginFactory::with_executor("bad", || FailingExecutor)),
        );

        assert!(router
            .dispatch(br#"{"id":"5","payload":{"plugin_name":"bad"}}"#)
            .expect("valid frame"));
    }

    #[test]
    fn decode_error_is_reported_not_masked() {
        let router = MessageRouter::new(StaticPluginRegistry::new());

        let err = router.dispatch(b"{not json").expect_err("malformed frame");
        assert!(matches!(err.current_context(), DispatchError::Decode { .. }));

        // as a frame handler the router swallows the error and keeps going
        router.handle_frame(b"{not json");
    }

    #[test]
    fn frames_are_independent() {
        let received = Received::default();
        let router = MessageRouter::new(CountingRegistry::with_recorder("X", received.clone()));

        router.handle_frame(b"garbage");
        router.handle_frame(br#"{"id":"6","payload":{"plugin_name":"nope"}}"#);
        router.handle_frame(br#"{"id":"7","payload":{"plugin_name":"X","n":7}}"#);

        let received = received.lock().expect("poisoned");
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].get("n"), Some(&json!(7)));
    }
}
