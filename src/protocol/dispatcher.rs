use crate::error::{ProtocolError, Result};
use crate::protocol::method::{make_method_key, MethodKey};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Per-call state handed to a handler
#[derive(Debug, Clone)]
pub struct CallContext {
    pub method: MethodKey,
    /// Remote parent span, or an empty context when the caller sent none
    pub trace: opentelemetry::Context,
    /// Cancelled when the connection that carried the call goes away
    pub cancel: CancellationToken,
}

impl CallContext {
    pub fn new(method: MethodKey) -> Self {
        Self {
            method,
            trace: opentelemetry::Context::new(),
            cancel: CancellationToken::new(),
        }
    }
}

type HandlerFn = dyn Fn(CallContext, Bytes) -> BoxFuture<'static, Result<Bytes>> + Send + Sync + 'static;

/// Collects handlers during startup. [`HandlerMapBuilder::freeze`] turns it into the
/// read-only [`HandlerMap`] used for dispatch.
#[derive(Default)]
pub struct HandlerMapBuilder {
    handlers: HashMap<MethodKey, Arc<HandlerFn>>,
    names: HashMap<MethodKey, String>,
}

impl HandlerMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `component.method`. Registering the same pair again replaces
    /// the previous handler.
    ///
    /// Handlers return the response bytes. An `Err` is a transport failure; application
    /// errors belong inside the returned bytes.
    pub fn register<F, Fut>(&mut self, component: &str, method: &str, handler: F) -> &mut Self
    where
        F: Fn(CallContext, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Bytes>> + Send + 'static,
    {
        let key = make_method_key(component, method);
        let name = format!("{component}.{method}");

        match self.names.get(&key) {
            Some(existing) if *existing != name => {
                warn!(%key, existing = %existing, new = %name, "Method key collision; replacing handler");
            }
            Some(_) => debug!(method = %name, "Replacing handler"),
            None => debug!(method = %name, %key, "Registered handler"),
        }

        let boxed: Arc<HandlerFn> = Arc::new(move |cx, request| handler(cx, request).boxed());
        self.handlers.insert(key, boxed);
        self.names.insert(key, name);
        self
    }

    pub fn freeze(self) -> HandlerMap {
        HandlerMap {
            inner: Arc::new(Inner {
                handlers: self.handlers,
                names: self.names,
            }),
        }
    }
}

struct Inner {
    handlers: HashMap<MethodKey, Arc<HandlerFn>>,
    names: HashMap<MethodKey, String>,
}

/// Immutable `MethodKey -> handler` table. Clones share the same table and lookups take
/// no locks.
#[derive(Clone)]
pub struct HandlerMap {
    inner: Arc<Inner>,
}

impl HandlerMap {
    pub fn builder() -> HandlerMapBuilder {
        HandlerMapBuilder::new()
    }

    /// Run the handler registered for `cx.method`
    pub async fn dispatch(&self, cx: CallContext, request: Bytes) -> Result<Bytes> {
        let handler = self
            .inner
            .handlers
            .get(&cx.method)
            .cloned()
            .ok_or(ProtocolError::MethodNotFound(cx.method))?;
        handler(cx, request).await
    }

    pub fn contains(&self, key: &MethodKey) -> bool {
        self.inner.handlers.contains_key(key)
    }

    /// Registered `component.method` name, for diagnostics only
    pub fn name(&self, key: &MethodKey) -> Option<&str> {
        self.inner.names.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.inner.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.inner.names.values().collect();
        names.sort();
        f.debug_struct("HandlerMap").field("methods", &names).finish()
    }
}
