use super::{Endpoint, Resolution, Resolver, Version};
use crate::error::{ProtocolError, Result};
use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
struct Snapshot {
    generation: u64,
    endpoints: Vec<Endpoint>,
}

/// Endpoint set owned by the local process and pushed with [`WatchResolver::update`].
///
/// Versions are `Opaque(generation)`. Resolving with the current generation parks until the
/// next update or cancellation.
#[derive(Debug)]
pub struct WatchResolver {
    tx: watch::Sender<Snapshot>,
}

impl WatchResolver {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        let (tx, _rx) = watch::channel(Snapshot {
            generation: 0,
            endpoints,
        });
        Self { tx }
    }

    /// Replace the endpoint set and wake every parked resolve
    pub fn update(&self, endpoints: Vec<Endpoint>) {
        self.tx.send_modify(|snapshot| {
            snapshot.generation += 1;
            snapshot.endpoints = endpoints;
        });
    }

    fn current(&self) -> Resolution {
        let snapshot = self.tx.borrow();
        Resolution {
            endpoints: snapshot.endpoints.clone(),
            version: Some(Version::Opaque(snapshot.generation)),
        }
    }
}

impl Default for WatchResolver {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl Resolver for WatchResolver {
    fn is_constant(&self) -> bool {
        false
    }

    async fn resolve(
        &self,
        cancel: &CancellationToken,
        version: Option<&Version>,
    ) -> Result<Resolution> {
        let seen = match version {
            None => return Ok(self.current()),
            Some(Version::Opaque(generation)) => *generation,
            Some(other) => {
                return Err(ProtocolError::UnknownVersion(format!(
                    "watch resolver cannot resume from {other}"
                )))
            }
        };

        let mut rx = self.tx.subscribe();
        loop {
            if rx.borrow_and_update().generation != seen {
                return Ok(self.current());
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(ProtocolError::Cancelled),
                changed = rx.changed() => {
                    // the sender lives in self, so this cannot fail while we hold &self
                    changed.map_err(|_| ProtocolError::Cancelled)?;
                }
            }
        }
    }
}
