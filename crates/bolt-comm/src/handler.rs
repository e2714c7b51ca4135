//! Callbacks invoked by the listener for every inbound frame.

/// Receives raw frames, in arrival order, on the listener worker.
pub trait FrameHandler: Send + Sync {
    fn handle_frame(&self, frame: &[u8]);
}

impl<F> FrameHandler for F
where F: Fn(&[u8]) + Send + Sync
{
    fn handle_frame(&self, frame: &[u8]) {
        self(frame)
    }
}

/// Default handler: logs every frame and does nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFrameHandler;

impl FrameHandler for LogFrameHandler {
    fn handle_frame(&self, frame: &[u8]) {
        tracing::info!(
            bytes = frame.len(),
            frame = %String::from_utf8_lossy(frame),
            "Received frame"
        );
    }
}
