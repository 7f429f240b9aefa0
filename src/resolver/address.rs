use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SEPARATOR: &str = "://";

/// A network location in `"<network>://<address>"` form, e.g. `tcp://host:9000` or
/// `unix:///tmp/game.sock`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NetworkAddress {
    network: String,
    address: String,
}

impl NetworkAddress {
    pub fn new(network: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            address: address.into(),
        }
    }

    /// Split on the first `"://"`. Later occurrences stay in the address.
    pub fn split(s: &str) -> Result<(&str, &str)> {
        s.split_once(SEPARATOR)
            .ok_or_else(|| ProtocolError::InvalidAddress(format!("missing '{SEPARATOR}' in '{s}'")))
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl FromStr for NetworkAddress {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let (network, address) = Self::split(s)?;
        Ok(Self::new(network, address))
    }
}

impl TryFrom<String> for NetworkAddress {
    type Error = ProtocolError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<NetworkAddress> for String {
    fn from(addr: NetworkAddress) -> Self {
        addr.to_string()
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.network, self.address)
    }
}
