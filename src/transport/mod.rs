//! # Transport Layer
//!
//! Byte-stream plumbing underneath the codec. Addresses use the `network://address` form
//! from [`crate::resolver::NetworkAddress`].
//!
//! ## Networks
//! - `tcp`, `tcp4`, `tcp6`: TCP with `TCP_NODELAY`
//! - `unix`: Unix domain sockets (Unix platforms only)
//!
//! Anything else fails with [`ProtocolError::UnsupportedNetwork`].

pub mod listener;

pub use listener::Listener;

use crate::error::{ProtocolError, Result};
use crate::resolver::NetworkAddress;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, instrument};

/// Any duplex byte stream a connection can run over
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxStream = Box<dyn Stream>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Any,
    V4,
    V6,
}

impl Family {
    fn of(network: &str) -> Option<Self> {
        match network {
            "tcp" => Some(Family::Any),
            "tcp4" => Some(Family::V4),
            "tcp6" => Some(Family::V6),
            _ => None,
        }
    }

    fn admits(self, addr: &SocketAddr) -> bool {
        match self {
            Family::Any => true,
            Family::V4 => addr.is_ipv4(),
            Family::V6 => addr.is_ipv6(),
        }
    }
}

async fn resolve_tcp(addr: &NetworkAddress, family: Family) -> Result<Vec<SocketAddr>> {
    let candidates: Vec<SocketAddr> = tokio::net::lookup_host(addr.address())
        .await?
        .filter(|a| family.admits(a))
        .collect();
    if candidates.is_empty() {
        return Err(ProtocolError::InvalidAddress(format!(
            "{addr} has no {} address",
            addr.network()
        )));
    }
    Ok(candidates)
}

/// Open a stream to `addr`
#[instrument(skip_all, fields(addr = %addr))]
pub async fn dial(addr: &NetworkAddress) -> Result<BoxStream> {
    if let Some(family) = Family::of(addr.network()) {
        let mut last_err = None;
        for candidate in resolve_tcp(addr, family).await? {
            match TcpStream::connect(candidate).await {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    debug!(peer = %candidate, "Dialed tcp endpoint");
                    return Ok(Box::new(stream));
                }
                Err(e) => last_err = Some(e),
            }
        }
        return Err(last_err.map_or(ProtocolError::ConnectionClosed, ProtocolError::Io));
    }

    match addr.network() {
        #[cfg(unix)]
        "unix" => {
            let stream = tokio::net::UnixStream::connect(addr.address()).await?;
            debug!("Dialed unix endpoint");
            Ok(Box::new(stream))
        }
        other => Err(ProtocolError::UnsupportedNetwork(other.to_string())),
    }
}

pub(crate) fn tcp_bind_addr(addr: &NetworkAddress) -> Option<&str> {
    Family::of(addr.network()).map(|_| addr.address())
}
