use crate::config::{RpcConfig, ServerConfig, DEFAULT_READ_BUFFER};
use crate::core::codec::PacketCodec;
use crate::core::message::MessageRegistry;
use crate::core::reader::PacketReader;
use crate::core::writer::PacketWriter;
use crate::error::{ProtocolError, Result};
use crate::protocol::dispatcher::{CallContext, HandlerMap};
use crate::protocol::rpc::{Request, Response};
use crate::transport::{Listener, Stream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Responses queued per connection before handler tasks wait on the writer
const RESPONSE_QUEUE: usize = 256;

const DRAIN_POLL: Duration = Duration::from_millis(50);

/// Accepts connections and dispatches their requests to a frozen [`HandlerMap`].
///
/// Every request runs on its own task, so a slow handler never blocks the other calls on
/// the same connection. Responses go back through one writer task per connection.
#[derive(Debug, Clone)]
pub struct Server {
    handlers: HandlerMap,
    codec: Arc<dyn PacketCodec>,
    config: ServerConfig,
    read_buffer: usize,
}

impl Server {
    pub fn new(handlers: HandlerMap, codec: Arc<dyn PacketCodec>, config: ServerConfig) -> Self {
        Self {
            handlers,
            codec,
            config,
            read_buffer: DEFAULT_READ_BUFFER,
        }
    }

    /// Server using the configured wire format and the default message registry
    pub fn from_config(handlers: HandlerMap, config: &RpcConfig) -> Self {
        let codec = config.transport.format.codec(
            Arc::new(MessageRegistry::with_defaults()),
            config.transport.max_payload_size,
        );
        Self {
            read_buffer: config.transport.read_buffer_capacity,
            ..Self::new(handlers, codec, config.server.clone())
        }
    }

    pub fn handlers(&self) -> &HandlerMap {
        &self.handlers
    }

    /// Run the accept loop until `shutdown` fires, then wait up to `shutdown_timeout` for
    /// open connections to finish.
    #[instrument(skip_all)]
    pub async fn serve(&self, listener: Listener, shutdown: CancellationToken) -> Result<()> {
        let active_connections = Arc::new(AtomicUsize::new(0));
        // cancelled only when the drain deadline passes
        let connections_root = CancellationToken::new();

        if let Ok(local) = listener.local_address() {
            info!(address = %local, methods = self.handlers.len(), "Server started");
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutting down server. Waiting for connections to close...");
                    drop(listener);
                    self.drain(&active_connections).await;
                    connections_root.cancel();
                    return Ok(());
                }

                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let current = active_connections.load(Ordering::Acquire);
                            if current >= self.config.max_connections {
                                warn!(peer = %peer, current, "Connection limit reached, rejecting");
                                continue;
                            }
                            active_connections.fetch_add(1, Ordering::AcqRel);
                            debug!(peer = %peer, "New connection established");

                            let server = self.clone();
                            let active_connections = active_connections.clone();
                            let cancel = connections_root.child_token();
                            tokio::spawn(async move {
                                if let Err(e) = server.serve_connection(stream, cancel).await {
                                    debug!(peer = %peer, error = %e, "Connection ended with error");
                                }
                                active_connections.fetch_sub(1, Ordering::AcqRel);
                                debug!(peer = %peer, "Connection closed");
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Error accepting connection");
                        }
                    }
                }
            }
        }
    }

    async fn drain(&self, active_connections: &AtomicUsize) {
        let timeout = tokio::time::sleep(self.config.shutdown_timeout);
        tokio::pin!(timeout);

        loop {
            let connections = active_connections.load(Ordering::Acquire);
            if connections == 0 {
                info!("All connections closed, shutting down");
                return;
            }
            tokio::select! {
                _ = &mut timeout => {
                    warn!(connections, "Shutdown timeout reached, forcing exit");
                    return;
                }
                _ = tokio::time::sleep(DRAIN_POLL) => {
                    debug!(connections, "Waiting for connections to close");
                }
            }
        }
    }

    /// Serve one already-accepted stream until the peer goes away, a framing error occurs,
    /// or `cancel` fires.
    ///
    /// A clean close returns `Ok(())` after every in-flight response has been written.
    pub async fn serve_connection<S: Stream>(&self, stream: S, cancel: CancellationToken) -> Result<()> {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = PacketReader::with_capacity(read_half, self.codec.clone(), self.read_buffer);
        let (tx, mut rx) = mpsc::channel::<Response>(RESPONSE_QUEUE);

        let mut writer = PacketWriter::new(write_half, self.codec.clone());
        let writer_task = tokio::spawn(async move {
            while let Some(response) = rx.recv().await {
                if let Err(e) = writer.write(&response).await {
                    warn!(error = %e, call_id = response.call_id, "Failed to write response");
                    return;
                }
            }
            writer.shutdown().await.ok();
        });

        let outcome = loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => break Err(ProtocolError::Cancelled),
                frame = reader.read_frame() => frame,
            };

            let frame = match frame {
                Ok(frame) => frame,
                Err(ProtocolError::ConnectionClosed) => break Ok(()),
                Err(e) => {
                    warn!(error = %e, "Closing connection after read error");
                    break Err(e);
                }
            };

            let message_type = frame.message_type;
            let Some(request) = frame.message.downcast::<Request>() else {
                warn!(%message_type, "Expected a request");
                break Err(ProtocolError::UnexpectedMessage(message_type.0));
            };
            self.spawn_call(*request, &cancel, tx.clone());
        };

        drop(tx);
        if outcome.is_err() {
            cancel.cancel();
            writer_task.abort();
        }
        writer_task.await.ok();
        outcome
    }

    fn spawn_call(&self, request: Request, cancel: &CancellationToken, tx: mpsc::Sender<Response>) {
        let handlers = self.handlers.clone();
        let cx = CallContext {
            method: request.method,
            trace: request
                .trace
                .map_or_else(opentelemetry::Context::new, |t| t.to_context()),
            cancel: cancel.child_token(),
        };
        let call_id = request.call_id;

        tokio::spawn(async move {
            let method = cx.method;
            let response = match handlers.dispatch(cx, request.payload).await {
                Ok(payload) => Response::ok(call_id, payload),
                Err(e) => {
                    debug!(call_id, %method, error = %e, "Call failed");
                    Response::from_error(call_id, &e)
                }
            };
            // receiver gone means the connection is already closing
            tx.send(response).await.ok();
        });
    }
}
