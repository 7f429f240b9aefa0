use super::{tcp_bind_addr, BoxStream};
use crate::error::{ProtocolError, Result};
use crate::resolver::NetworkAddress;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

#[cfg(unix)]
use std::path::{Path, PathBuf};
#[cfg(unix)]
use tokio::net::UnixListener;

/// Accepting side of a transport.
///
/// A unix listener removes a stale socket file before binding and removes its own file
/// when dropped.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener, PathBuf),
}

impl Listener {
    pub async fn bind(addr: &NetworkAddress) -> Result<Self> {
        if let Some(bind_addr) = tcp_bind_addr(addr) {
            let listener = TcpListener::bind(bind_addr).await?;
            info!(address = %listener.local_addr()?, "Listening on tcp");
            return Ok(Listener::Tcp(listener));
        }

        match addr.network() {
            #[cfg(unix)]
            "unix" => {
                let path = PathBuf::from(addr.address());
                if path.exists() {
                    tokio::fs::remove_file(&path).await.ok();
                }
                let listener = UnixListener::bind(&path)?;
                info!(path = %path.display(), "Listening on unix socket");
                Ok(Listener::Unix(listener, path))
            }
            other => Err(ProtocolError::UnsupportedNetwork(other.to_string())),
        }
    }

    /// Wait for the next peer. Returns the stream and a printable peer label.
    pub async fn accept(&self) -> Result<(BoxStream, String)> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                stream.set_nodelay(true)?;
                Ok((Box::new(stream), peer.to_string()))
            }
            #[cfg(unix)]
            Listener::Unix(listener, path) => {
                let (stream, _) = listener.accept().await?;
                Ok((Box::new(stream), path.display().to_string()))
            }
        }
    }

    /// The bound address; for `tcp://host:0` this carries the port the OS picked
    pub fn local_address(&self) -> Result<NetworkAddress> {
        match self {
            Listener::Tcp(listener) => Ok(NetworkAddress::new(
                "tcp",
                listener.local_addr()?.to_string(),
            )),
            #[cfg(unix)]
            Listener::Unix(_, path) => Ok(NetworkAddress::new(
                "unix",
                path.display().to_string(),
            )),
        }
    }

    #[cfg(unix)]
    fn socket_path(&self) -> Option<&Path> {
        match self {
            Listener::Unix(_, path) => Some(path),
            Listener::Tcp(_) => None,
        }
    }
}

#[cfg(unix)]
impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(path) = self.socket_path() {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "Removed socket file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(error = %e, path = %path.display(), "Failed to remove socket file"),
            }
        }
    }
}
