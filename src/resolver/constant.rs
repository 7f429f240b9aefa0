use super::{Endpoint, Resolution, Resolver, Version};
use crate::error::{ProtocolError, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Returns the same endpoints forever.
///
/// It has a single state, so any non-`None` version is a caller bug.
#[derive(Debug, Clone)]
pub struct ConstantResolver {
    endpoints: Vec<Endpoint>,
}

impl ConstantResolver {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self { endpoints }
    }
}

#[async_trait]
impl Resolver for ConstantResolver {
    fn is_constant(&self) -> bool {
        true
    }

    async fn resolve(
        &self,
        _cancel: &CancellationToken,
        version: Option<&Version>,
    ) -> Result<Resolution> {
        match version {
            None => Ok(Resolution {
                endpoints: self.endpoints.clone(),
                version: None,
            }),
            Some(v) => Err(ProtocolError::UnknownVersion(format!(
                "constant resolver has no version, got {v}"
            ))),
        }
    }
}
