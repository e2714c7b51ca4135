//! Task envelope decoding.

use error_stack::Report;
use error_stack::ResultExt;
use serde::Deserialize;
use serde_json::Map;
use serde_json::Value;

use crate::error::DispatchError;
use crate::error::DispatchResult;

/// Largest number of bytes taken from the stream in a single read.
pub const MAX_FRAME_SIZE: usize = 32_000;

/// Payload handed to plugin executors, always containing `plugin_name`.
pub type Payload = Map<String, Value>;

/// Wire shape: `{ "id": <string>, "payload": { "plugin_name": <string>, .. } }`
#[derive(Deserialize)]
struct Envelope {
    id: String,
    payload: Payload,
}

/// One decoded inbound task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskMessage {
    id: String,
    plugin_name: String,
    payload: Payload,
}

impl TaskMessage {
    /// Decode one raw frame.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Decode`] if the frame is not a JSON envelope,
    /// lacks `id` or `payload`, or the payload has no string `plugin_name`.
    pub fn decode(frame: &[u8]) -> DispatchResult<Self> {
        let envelope: Envelope =
            serde_json::from_slice(frame).change_context(DispatchError::Decode {
                message: "frame is not a valid task envelope".into(),
            })?;

        let plugin_name = envelope
            .payload
            .get("plugin_name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Report::new(DispatchError::Decode {
                    message: format!("payload of message `{}` has no plugin_name", envelope.id),
                })
            })?
            .to_string();

        Ok(Self {
            id: envelope.id,
            plugin_name,
            payload: envelope.payload,
        })
    }

    /// Server assigned message id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    /// Full payload, including `plugin_name`.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}
