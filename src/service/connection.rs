use crate::balancer::{Balancer, RoundRobinBalancer};
use crate::config::{ClientConfig, RpcConfig, DEFAULT_READ_BUFFER};
use crate::core::codec::PacketCodec;
use crate::core::message::MessageRegistry;
use crate::core::reader::PacketReader;
use crate::core::writer::PacketWriter;
use crate::error::{ProtocolError, Result};
use crate::protocol::method::{make_method_key, MethodKey};
use crate::protocol::rpc::{Request, Response};
use crate::protocol::trace::TraceHeader;
use crate::resolver::{self, Endpoint, Resolver, Version};
use crate::transport::{self, BoxStream};
use bytes::Bytes;
use opentelemetry::Context;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::{oneshot, watch, Mutex};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// One logical RPC channel to a service.
///
/// Keeps the resolved endpoint set current in the background, dials lazily through the
/// balancer, and multiplexes concurrent calls over a single stream by call id. When the
/// stream fails every in-flight call gets [`ProtocolError::ConnectionClosed`] and the next
/// call dials again. There is no retry or backoff.
///
/// Dropping the connection stops its watch task and closes the stream.
#[derive(Debug)]
pub struct Connection {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    resolver: Arc<dyn Resolver>,
    balancer: Arc<dyn Balancer>,
    codec: Arc<dyn PacketCodec>,
    config: ClientConfig,
    read_buffer: usize,
    endpoints: watch::Sender<Vec<Endpoint>>,
    link: Mutex<Option<Arc<Link>>>,
    next_call: AtomicU64,
    watching: AtomicBool,
    cancel: CancellationToken,
}

/// A dialed stream plus the calls waiting on it
struct Link {
    endpoint: Endpoint,
    writer: Mutex<PacketWriter<WriteHalf<BoxStream>>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Response>>>,
    closed: CancellationToken,
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("endpoint", &self.endpoint)
            .field("closed", &self.closed.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Link {
    /// Wrap a dialed stream. The returned reader belongs to [`Link::read_loop`].
    fn open(
        endpoint: Endpoint,
        stream: BoxStream,
        codec: Arc<dyn PacketCodec>,
        read_buffer: usize,
        closed: CancellationToken,
    ) -> (Arc<Self>, PacketReader<ReadHalf<BoxStream>>) {
        let (read_half, write_half) = tokio::io::split(stream);
        let link = Arc::new(Link {
            endpoint,
            writer: Mutex::new(PacketWriter::new(write_half, codec.clone())),
            pending: Mutex::new(HashMap::new()),
            closed,
        });
        (link, PacketReader::with_capacity(read_half, codec, read_buffer))
    }

    /// Wait slot for `call_id`, refused once the link has failed
    async fn register(&self, call_id: u64) -> Result<oneshot::Receiver<Response>> {
        let mut pending = self.pending.lock().await;
        if self.closed.is_cancelled() {
            return Err(ProtocolError::ConnectionClosed);
        }
        let (tx, rx) = oneshot::channel();
        pending.insert(call_id, tx);
        Ok(rx)
    }

    /// Mark the link dead and release every waiter.
    ///
    /// `closed` flips under the `pending` lock so no call can register after the sweep.
    async fn fail(&self) {
        let dropped = {
            let mut pending = self.pending.lock().await;
            self.closed.cancel();
            let n = pending.len();
            pending.clear();
            n
        };
        if dropped > 0 {
            debug!(endpoint = %self.endpoint, calls = dropped, "Failed in-flight calls");
        }
    }

    async fn read_loop(self: Arc<Self>, mut reader: PacketReader<ReadHalf<BoxStream>>) {
        loop {
            let frame = tokio::select! {
                _ = self.closed.cancelled() => break,
                frame = reader.read_frame() => frame,
            };

            match frame {
                Ok(frame) => {
                    let message_type = frame.message_type;
                    let Some(response) = frame.message.downcast::<Response>() else {
                        warn!(endpoint = %self.endpoint, %message_type, "Expected a response");
                        break;
                    };
                    let waiter = self.pending.lock().await.remove(&response.call_id);
                    match waiter {
                        Some(tx) => {
                            tx.send(*response).ok();
                        }
                        None => debug!(call_id = response.call_id, "Response for abandoned call"),
                    }
                }
                Err(ProtocolError::ConnectionClosed) => {
                    debug!(endpoint = %self.endpoint, "Peer closed connection");
                    break;
                }
                Err(e) => {
                    warn!(endpoint = %self.endpoint, error = %e, "Dropping link after read error");
                    break;
                }
            }
        }
        self.fail().await;
    }
}

impl Connection {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        balancer: Arc<dyn Balancer>,
        codec: Arc<dyn PacketCodec>,
        config: ClientConfig,
    ) -> Self {
        Self::build(resolver, balancer, codec, config, DEFAULT_READ_BUFFER)
    }

    fn build(
        resolver: Arc<dyn Resolver>,
        balancer: Arc<dyn Balancer>,
        codec: Arc<dyn PacketCodec>,
        config: ClientConfig,
        read_buffer: usize,
    ) -> Self {
        let (endpoints, _) = watch::channel(Vec::new());
        Self {
            shared: Arc::new(Shared {
                resolver,
                balancer,
                codec,
                config,
                read_buffer,
                endpoints,
                link: Mutex::new(None),
                next_call: AtomicU64::new(1),
                watching: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Connection built from `config`: its resolver, round-robin balancing and the
    /// configured wire format
    pub fn from_config(config: &RpcConfig) -> Result<Self> {
        let resolver = resolver::from_config(&config.resolver)?;
        let codec = config.transport.format.codec(
            Arc::new(MessageRegistry::with_defaults()),
            config.transport.max_payload_size,
        );
        Ok(Self::build(
            resolver,
            Arc::new(RoundRobinBalancer::new()),
            codec,
            config.client.clone(),
            config.transport.read_buffer_capacity,
        ))
    }

    /// Resolve once and, for resolvers that can change, keep watching in the background.
    ///
    /// Calling it again refreshes the endpoint set; the watch task is only spawned once.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        let shared = &self.shared;
        let first = shared.resolver.resolve(&shared.cancel, None).await?;
        info!(endpoints = first.endpoints.len(), version = ?first.version, "Initial resolution");
        shared.endpoints.send_replace(first.endpoints);

        if !shared.resolver.is_constant() && !shared.watching.swap(true, Ordering::AcqRel) {
            tokio::spawn(watch_endpoints(shared.clone(), first.version));
        }
        Ok(())
    }

    /// Snapshot of the current endpoint set
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.shared.endpoints.borrow().clone()
    }

    /// Stream yielding the current set, then every change
    pub fn endpoint_updates(&self) -> WatchStream<Vec<Endpoint>> {
        WatchStream::new(self.shared.endpoints.subscribe())
    }

    /// Endpoint of the live link, if one is open
    pub async fn connected_to(&self) -> Option<Endpoint> {
        let link = self.shared.link.lock().await;
        link.as_ref()
            .filter(|l| !l.closed.is_cancelled())
            .map(|l| l.endpoint.clone())
    }

    /// Call `component.method` with `payload`, continuing the span active in `cx`
    pub async fn call(
        &self,
        cx: &Context,
        component: &str,
        method: &str,
        payload: impl Into<Bytes>,
    ) -> Result<Bytes> {
        self.call_key(cx, make_method_key(component, method), payload.into())
            .await
    }

    #[instrument(skip_all, fields(method = %method))]
    pub async fn call_key(&self, cx: &Context, method: MethodKey, payload: Bytes) -> Result<Bytes> {
        if self.shared.cancel.is_cancelled() {
            return Err(ProtocolError::Cancelled);
        }
        let link = self.link().await?;
        let call_id = self.shared.next_call.fetch_add(1, Ordering::Relaxed);
        let request = Request::new(call_id, method, payload).with_trace(TraceHeader::from_context(cx));

        let rx = link.register(call_id).await?;

        let exchange = async {
            let sent = link.writer.lock().await.write(&request).await;
            if let Err(e) = sent {
                warn!(endpoint = %link.endpoint, error = %e, "Write failed, dropping link");
                link.fail().await;
                return Err(e);
            }
            rx.await.map_err(|_| ProtocolError::ConnectionClosed)
        };

        match tokio::time::timeout(self.shared.config.request_timeout, exchange).await {
            Ok(response) => response?.into_result(),
            Err(_) => {
                link.pending.lock().await.remove(&call_id);
                Err(ProtocolError::Timeout)
            }
        }
    }

    /// Stop watching and close the stream. In-flight calls fail with `ConnectionClosed`.
    pub async fn close(&self) {
        self.shared.cancel.cancel();
        let link = self.shared.link.lock().await.take();
        if let Some(link) = link {
            link.fail().await;
        }
    }

    /// The live link, dialing a new one when there is none or the last one failed
    async fn link(&self) -> Result<Arc<Link>> {
        let shared = &self.shared;
        let mut slot = shared.link.lock().await;
        if let Some(link) = slot.as_ref() {
            if !link.closed.is_cancelled() {
                return Ok(link.clone());
            }
            debug!(endpoint = %link.endpoint, "Replacing failed link");
        }

        let mut endpoints = self.endpoints();
        if endpoints.is_empty() {
            let fresh = shared.resolver.resolve(&shared.cancel, None).await?;
            shared.endpoints.send_replace(fresh.endpoints.clone());
            endpoints = fresh.endpoints;
        }
        let endpoint = shared
            .balancer
            .pick(&endpoints)
            .cloned()
            .ok_or(ProtocolError::NoEndpoints)?;

        let stream = tokio::time::timeout(shared.config.connect_timeout, transport::dial(&endpoint))
            .await
            .map_err(|_| ProtocolError::Timeout)??;
        let (link, reader) = Link::open(
            endpoint.clone(),
            stream,
            shared.codec.clone(),
            shared.read_buffer,
            shared.cancel.child_token(),
        );
        tokio::spawn(link.clone().read_loop(reader));

        info!(endpoint = %endpoint, "Connected");
        *slot = Some(link.clone());
        Ok(link)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

/// Long-poll the resolver and publish each new endpoint set.
///
/// An unchanged version or a failed resolve waits one poll interval before asking again.
async fn watch_endpoints(shared: Arc<Shared>, mut version: Option<Version>) {
    loop {
        let backoff = match shared.resolver.resolve(&shared.cancel, version.as_ref()).await {
            Ok(resolution) => {
                let unchanged = resolution.version == version;
                let endpoints = resolution.endpoints;
                shared.endpoints.send_if_modified(|current| {
                    if *current == endpoints {
                        return false;
                    }
                    debug!(endpoints = endpoints.len(), "Endpoint set changed");
                    *current = endpoints;
                    true
                });
                version = resolution.version;
                unchanged
            }
            Err(ProtocolError::Cancelled) => break,
            Err(e) => {
                warn!(error = %e, "Resolve failed");
                true
            }
        };

        if backoff {
            tokio::select! {
                _ = shared.cancel.cancelled() => break,
                _ = tokio::time::sleep(shared.config.resolve_poll_interval) => {}
            }
        }
        if shared.cancel.is_cancelled() {
            break;
        }
    }
    debug!("Endpoint watch stopped");
}
