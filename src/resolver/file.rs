use super::{Endpoint, Resolution, Resolver, TriggerState, Version};
use crate::error::{ProtocolError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Publishes a configured endpoint set once a trigger path exists.
///
/// Only the existence of the path matters, never its content. Once the path has been seen
/// the resolver stays `Present`: resolving from `Present` parks until cancellation, even if
/// the file is later removed. The signal fires once and never re-arms.
#[derive(Debug, Clone)]
pub struct FileResolver {
    path: PathBuf,
    endpoints: Vec<Endpoint>,
}

impl FileResolver {
    pub fn new(path: impl Into<PathBuf>, endpoints: Vec<Endpoint>) -> Self {
        Self {
            path: path.into(),
            endpoints,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn probe(&self) -> Resolution {
        // stat failures of any kind count as absent
        match tokio::fs::metadata(&self.path).await {
            Ok(_) => Resolution {
                endpoints: self.endpoints.clone(),
                version: Some(Version::PRESENT),
            },
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Trigger path absent");
                Resolution {
                    endpoints: Vec::new(),
                    version: Some(Version::ABSENT),
                }
            }
        }
    }
}

#[async_trait]
impl Resolver for FileResolver {
    fn is_constant(&self) -> bool {
        false
    }

    #[instrument(skip(self, cancel), fields(path = %self.path.display()))]
    async fn resolve(
        &self,
        cancel: &CancellationToken,
        version: Option<&Version>,
    ) -> Result<Resolution> {
        match version {
            None | Some(Version::Trigger(TriggerState::Absent)) => Ok(self.probe().await),
            Some(Version::Trigger(TriggerState::Present)) => {
                cancel.cancelled().await;
                Err(ProtocolError::Cancelled)
            }
            Some(other) => Err(ProtocolError::UnknownVersion(format!(
                "file resolver cannot resume from {other}"
            ))),
        }
    }
}
