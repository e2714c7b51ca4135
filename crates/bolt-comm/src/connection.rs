//! Long-lived connections to the bolt server (listener) and bolt sink (publisher).
//!
//! Each role runs as its own tokio task. The listener subscribes with a
//! one-time handshake and then hands every frame it reads, in arrival order, to
//! the currently registered [`FrameHandler`]. Handlers run on the blocking pool
//! and the listener waits for each one before reading on. Connect failures
//! and peer disconnects are retried with exponential backoff; exhausting the
//! retry budget ends the worker with an error that surfaces from
//! [`ConnectionManager::stop`].

use std::future::Future;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use error_stack::Report;
use error_stack::ResultExt;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::config::ConnectionConfig;
use crate::error::CommError;
use crate::error::CommResult;
use crate::handler::FrameHandler;
use crate::handler::LogFrameHandler;
use crate::types::MAX_FRAME_SIZE;

type SharedHandler = Arc<RwLock<Arc<dyn FrameHandler>>>;

const PUBLISHER_QUEUE_DEPTH: usize = 64;

/// Owns the listener and publisher workers.
pub struct ConnectionManager {
    config: ConnectionConfig,
    handler: SharedHandler,
    workers: Option<Workers>,
}

struct Workers {
    cancellation_token: CancellationToken,
    listener_exited: CancellationToken,
    listener: JoinHandle<CommResult<()>>,
    publisher: Option<(JoinHandle<CommResult<()>>, Publisher)>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        let handler: Arc<dyn FrameHandler> = Arc::new(LogFrameHandler);
        Self {
            config,
            handler: Arc::new(RwLock::new(handler)),
            workers: None,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Replace the callback invoked for each inbound frame.
    ///
    /// Takes effect from the next frame; a frame being handled finishes with
    /// the previous handler.
    pub fn register_handler(&self, handler: Arc<dyn FrameHandler>) {
        *self.handler.write().expect("poisoned") = handler;
    }

    pub fn is_running(&self) -> bool {
        self.workers.is_some()
    }

    /// Launch the listener worker and, if requested, the publisher worker.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::AlreadyRunning`] if the workers are already live.
    pub fn start(&mut self, enable_publisher: bool) -> CommResult<()> {
        if self.workers.is_some() {
            return Err(Report::new(CommError::AlreadyRunning));
        }

        let cancellation_token = CancellationToken::new();
        let listener_exited = CancellationToken::new();

        let listener = {
            let config = self.config.clone();
            let handler = self.handler.clone();
            let token = cancellation_token.clone();
            let exited = listener_exited.clone();
            tokio::spawn(async move {
                let _exited = exited.drop_guard();
                info!(server = %config.server_addr(), "Starting bolt listener");
                let result = run_listener(&config, &handler, &token).await;
                info!("Bolt listener stopped");
                result
            })
        };

        let publisher = enable_publisher.then(|| {
            let (sender, outbox) = mpsc::channel(PUBLISHER_QUEUE_DEPTH);
            let config = self.config.clone();
            let token = cancellation_token.clone();
            let handle = tokio::spawn(async move {
                info!(sink = %config.sink_addr(), "Starting bolt publisher");
                let result = run_publisher(&config, outbox, &token).await;
                info!("Bolt publisher stopped");
                result
            });
            (handle, Publisher { sender })
        });

        self.workers = Some(Workers {
            cancellation_token,
            listener_exited,
            listener,
            publisher,
        });
        Ok(())
    }

    /// Handle for queueing outbound bytes to the sink, if the publisher runs.
    pub fn publisher(&self) -> Option<Publisher> {
        self.workers
            .as_ref()
            .and_then(|workers| workers.publisher.as_ref())
            .map(|(_, publisher)| publisher.clone())
    }

    /// Resolves once the listener worker has exited, whether through
    /// [`ConnectionManager::stop`] or because its reconnect budget ran out.
    ///
    /// Never resolves if the manager is not running. The outcome of the
    /// listener is reported by the following `stop()`.
    pub fn listener_exited(&self) -> impl Future<Output = ()> + Send + 'static {
        let exited = self
            .workers
            .as_ref()
            .map(|workers| workers.listener_exited.clone());
        async move {
            match exited {
                Some(exited) => exited.cancelled().await,
                None => std::future::pending().await,
            }
        }
    }

    /// Signal both workers to terminate and wait for them.
    ///
    /// A no-op when the manager is not running.
    ///
    /// # Errors
    ///
    /// Returns the first worker failure, e.g. a connection that could not be
    /// (re)established within the retry budget.
    pub async fn stop(&mut self) -> CommResult<()> {
        let Some(workers) = self.workers.take() else {
            return Ok(());
        };
        workers.cancellation_token.cancel();

        let mut outcome = join_worker("listener", workers.listener).await;
        if let Some((handle, publisher)) = workers.publisher {
            drop(publisher);
            let publisher_outcome = join_worker("publisher", handle).await;
            outcome = match (outcome, publisher_outcome) {
                (Err(first), Err(second)) => {
                    warn!(error = ?second, "Publisher also failed");
                    Err(first)
                }
                (Ok(()), second) => second,
                (first, Ok(())) => first,
            };
        }
        outcome
    }
}

async fn join_worker(role: &str, handle: JoinHandle<CommResult<()>>) -> CommResult<()> {
    match handle.await {
        Ok(result) => result,
        Err(e) => Err(Report::new(CommError::Worker {
            role: role.to_string(),
            message: e.to_string(),
        })),
    }
}

/// Cloneable sender side of the publisher worker.
#[derive(Debug, Clone)]
pub struct Publisher {
    sender: mpsc::Sender<Vec<u8>>,
}

impl Publisher {
    /// Queue `bytes` for the sink.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::PublisherClosed`] once the publisher worker ended.
    pub async fn publish(&self, bytes: impl Into<Vec<u8>>) -> CommResult<()> {
        self.sender
            .send(bytes.into())
            .await
            .map_err(|_| Report::new(CommError::PublisherClosed))
    }
}

async fn run_listener(
    config: &ConnectionConfig,
    handler: &SharedHandler,
    token: &CancellationToken,
) -> CommResult<()> {
    let peer = config.server_addr();
    let handshake = config.handshake();
    let mut buffer = vec![0u8; MAX_FRAME_SIZE];

    loop {
        let Some(mut stream) = connect_with_backoff(config, &peer, token).await? else {
            return Ok(());
        };

        if let Err(e) = stream.write_all(handshake.as_bytes()).await {
            warn!(peer = %peer, error = %e, "Handshake failed, reconnecting");
            continue;
        }
        info!(peer = %peer, handshake = %handshake, "Subscribed to bolt server");

        loop {
            let read = tokio::select! {
                _ = token.cancelled() => return Ok(()),
                read = stream.read(&mut buffer) => read,
            };

            match read {
                Ok(0) => {
                    warn!(peer = %peer, "Bolt server closed the connection, reconnecting");
                    break;
                }
                Ok(n) => deliver(handler, &buffer[..n]).await,
                Err(e) => {
                    warn!(peer = %peer, error = %e, "Read failed, reconnecting");
                    break;
                }
            }
        }
    }
}

/// Hand one frame to the current handler and wait for it to return.
///
/// The handler runs on the blocking pool so a slow plugin never holds up the
/// other tasks of the runtime.
async fn deliver(handler: &SharedHandler, frame: &[u8]) {
    let handler = handler.read().expect("poisoned").clone();
    let frame = frame.to_vec();
    let bytes = frame.len();
    debug!(bytes, "Dispatching frame");

    if let Err(e) = tokio::task::spawn_blocking(move || handler.handle_frame(&frame)).await {
        if e.is_panic() {
            error!(bytes, "Frame handler panicked, frame dropped");
        } else {
            error!(bytes, error = %e, "Frame handler did not complete");
        }
    }
}

async fn run_publisher(
    config: &ConnectionConfig,
    mut outbox: mpsc::Receiver<Vec<u8>>,
    token: &CancellationToken,
) -> CommResult<()> {
    let peer = config.sink_addr();
    let Some(mut stream) = connect_with_backoff(config, &peer, token).await? else {
        return flush_on_stop(config, &peer, outbox).await;
    };
    info!(peer = %peer, "Connected to bolt sink");

    loop {
        let message = tokio::select! {
            _ = token.cancelled() => break,
            message = outbox.recv() => message,
        };
        let Some(bytes) = message else {
            break;
        };
        write_to(&mut stream, &peer, &bytes).await?;
    }

    // flush whatever was queued before the stop signal
    outbox.close();
    while let Ok(bytes) = outbox.try_recv() {
        write_to(&mut stream, &peer, &bytes).await?;
    }
    if let Err(e) = stream.shutdown().await {
        debug!(peer = %peer, error = %e, "Sink stream shutdown failed");
    }
    Ok(())
}

/// Stop arrived before the sink was reached: make one last bounded attempt
/// to deliver what is already queued.
async fn flush_on_stop(
    config: &ConnectionConfig,
    peer: &str,
    mut outbox: mpsc::Receiver<Vec<u8>>,
) -> CommResult<()> {
    outbox.close();
    let mut pending = Vec::new();
    while let Ok(bytes) = outbox.try_recv() {
        pending.push(bytes);
    }
    if pending.is_empty() {
        return Ok(());
    }

    info!(peer = %peer, messages = pending.len(), "Stopping before sink connected, flushing queue");
    let message = match tokio::time::timeout(config.connect_timeout, TcpStream::connect(peer)).await {
        Ok(Ok(mut stream)) => {
            for bytes in &pending {
                write_to(&mut stream, peer, bytes).await?;
            }
            if let Err(e) = stream.shutdown().await {
                debug!(peer = %peer, error = %e, "Sink stream shutdown failed");
            }
            return Ok(());
        }
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("timed out after {:?}", config.connect_timeout),
    };

    let discarded = pending.len();
    error!(peer = %peer, discarded, error = %message, "Queued messages discarded");
    Err(Report::new(CommError::Connection {
        peer: peer.to_string(),
        message,
    })
    .attach_printable(format!("{discarded} queued messages discarded on stop")))
}

async fn write_to(stream: &mut TcpStream, peer: &str, bytes: &[u8]) -> CommResult<()> {
    stream
        .write_all(bytes)
        .await
        .change_context(CommError::Write {
            peer: peer.to_string(),
            message: format!("failed to write {} bytes", bytes.len()),
        })?;
    debug!(peer = %peer, bytes = bytes.len(), "Published to bolt sink");
    Ok(())
}

/// Connect to `peer`, retrying with exponential backoff.
///
/// Returns `Ok(None)` if cancelled while connecting or waiting to retry.
async fn connect_with_backoff(
    config: &ConnectionConfig,
    peer: &str,
    token: &CancellationToken,
) -> CommResult<Option<TcpStream>> {
    let mut delay = config.retry_delay;
    let mut attempt = 0u32;

    loop {
        let outcome = tokio::select! {
            _ = token.cancelled() => return Ok(None),
            outcome = tokio::time::timeout(config.connect_timeout, TcpStream::connect(peer)) => outcome,
        };

        let message = match outcome {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                }
                return Ok(Some(stream));
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", config.connect_timeout),
        };

        if attempt >= config.max_retries {
            return Err(Report::new(CommError::Connection {
                peer: peer.to_string(),
                message,
            })
            .attach_printable(format!("gave up after {} attempts", attempt + 1)));
        }
        attempt += 1;

        warn!(
            peer = %peer,
            attempt,
            delay_sec = delay.as_secs_f32(),
            error = %message,
            "Connect failed, retrying after delay"
        );
        tokio::select! {
            _ = token.cancelled() => return Ok(None),
            _ = tokio::time::sleep(delay) => {}
        }
        delay = next_delay(delay, config.max_retry_delay);
    }
}

fn next_delay(delay: Duration, max: Duration) -> Duration {
    std::cmp::min(delay * 2, max)
}
