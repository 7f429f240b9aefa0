//! # Endpoint Resolution
//!
//! A [`Resolver`] maps a logical service to its current endpoint set. Each answer carries an
//! opaque [`Version`]; handing that version back asks the resolver to block until the set
//! differs from what the version describes, which gives watch semantics without a separate
//! streaming API.
//!
//! ## Implementations
//! - **ConstantResolver**: a fixed set, never changes
//! - **FileResolver**: a fixed set that becomes available once a trigger file exists
//! - **WatchResolver**: an in-process set pushed by the owner, with genuine long-poll
//!
//! Blocking resolves should run on a dedicated task per subscription so callers keep
//! using their cached set while a resolve is parked. Cancellation goes through the
//! `CancellationToken` passed to `resolve`.

mod address;
mod constant;
mod file;
mod watch;

pub use address::NetworkAddress;
pub use constant::ConstantResolver;
pub use file::FileResolver;
pub use watch::WatchResolver;

use crate::config::{ResolverConfig, ResolverKind};
use crate::error::{ProtocolError, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A concrete network location for a service instance
pub type Endpoint = NetworkAddress;

/// State of a trigger-based resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerState {
    Absent,
    Present,
}

/// Opaque token describing one resolution result. Only equality is meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Version {
    Trigger(TriggerState),
    /// Content-free token such as a generation counter or a hash
    Opaque(u64),
}

impl Version {
    pub const ABSENT: Version = Version::Trigger(TriggerState::Absent);
    pub const PRESENT: Version = Version::Trigger(TriggerState::Present);
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Trigger(TriggerState::Absent) => f.write_str("absent"),
            Version::Trigger(TriggerState::Present) => f.write_str("present"),
            Version::Opaque(token) => write!(f, "{token:#x}"),
        }
    }
}

/// Endpoints plus the version that describes them
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolution {
    pub endpoints: Vec<Endpoint>,
    pub version: Option<Version>,
}

#[async_trait]
pub trait Resolver: fmt::Debug + Send + Sync {
    /// `true` when the first answer is final and may be cached forever
    fn is_constant(&self) -> bool;

    /// With `version == None`, return the current set immediately. Otherwise block until the
    /// set differs from what `version` describes, or until `cancel` fires.
    async fn resolve(
        &self,
        cancel: &CancellationToken,
        version: Option<&Version>,
    ) -> Result<Resolution>;
}

/// Build the resolver described by `config`
pub fn from_config(config: &ResolverConfig) -> Result<Arc<dyn Resolver>> {
    let endpoints = config
        .endpoints
        .iter()
        .map(|e| e.parse::<Endpoint>())
        .collect::<Result<Vec<_>>>()?;

    match config.kind {
        ResolverKind::Constant => Ok(Arc::new(ConstantResolver::new(endpoints))),
        ResolverKind::File => {
            let path = config.trigger_path.clone().ok_or_else(|| {
                ProtocolError::ConfigError("file resolver requires trigger_path".to_string())
            })?;
            Ok(Arc::new(FileResolver::new(path, endpoints)))
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_versions_compare_by_value() {
        assert_eq!(Version::ABSENT, Version::Trigger(TriggerState::Absent));
        assert_ne!(Version::ABSENT, Version::PRESENT);
        assert_ne!(Version::Opaque(0), Version::ABSENT);
        assert_eq!(Version::Opaque(3), Version::Opaque(3));
    }

    #[test]
    fn test_from_config() {
        let config = ResolverConfig {
            kind: ResolverKind::Constant,
            endpoints: vec!["tcp://127.0.0.1:1".into()],
            trigger_path: None,
        };
        assert!(from_config(&config).unwrap().is_constant());

        let config = ResolverConfig {
            kind: ResolverKind::File,
            endpoints: vec![],
            trigger_path: None,
        };
        assert!(from_config(&config).is_err());

        let config = ResolverConfig {
            kind: ResolverKind::Constant,
            endpoints: vec!["nope".into()],
            trigger_path: None,
        };
        assert!(matches!(
            from_config(&config),
            Err(ProtocolError::InvalidAddress(_))
        ));
    }
}
