//! # Configuration
//!
//! Settings for both sides of an RPC channel: where a server listens, how long a client
//! waits, what the wire looks like, how endpoints are discovered and how logs are emitted.
//!
//! A config comes from TOML (`from_file`, `from_toml`), from `RPC_TRANSPORT_*` environment
//! variables layered over the defaults (`from_env`), or from code. Every section has
//! defaults, so a file only needs the keys it changes. Durations are written as
//! milliseconds.

use crate::core::serialization::SerializationFormat;
use crate::error::{ProtocolError, Result};
use crate::resolver::NetworkAddress;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Wire protocol version written into every binary header
pub const PROTOCOL_VERSION: u16 = 1;

/// Leading bytes of every binary frame ("GSRP")
pub const MAGIC_BYTES: [u8; 4] = [0x47, 0x53, 0x52, 0x50];

/// Largest payload accepted by default (16 MiB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Starting size of a packet reader's buffer
pub const DEFAULT_READ_BUFFER: usize = 4096;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub transport: TransportConfig,
    pub resolver: ResolverConfig,
    pub logging: LoggingConfig,
}

impl RpcConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ProtocolError::ConfigError(format!("Cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ProtocolError::ConfigError(format!("Bad TOML: {e}")))
    }

    /// Defaults overridden by `RPC_TRANSPORT_*` variables.
    ///
    /// Numeric variables that fail to parse are ignored; an unknown format name is an error.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(address) = env_var("SERVER_ADDRESS") {
            config.server.address = address;
        }
        if let Some(ms) = env_parse::<u64>("REQUEST_TIMEOUT_MS") {
            config.client.request_timeout = Duration::from_millis(ms);
        }
        if let Some(size) = env_parse::<usize>("MAX_PAYLOAD_SIZE") {
            config.transport.max_payload_size = size;
        }
        if let Some(format) = env_var("FORMAT") {
            config.transport.format = format.parse()?;
        }
        if let Some(path) = env_var("TRIGGER_PATH") {
            config.resolver.kind = ResolverKind::File;
            config.resolver.trigger_path = Some(PathBuf::from(path));
        }

        Ok(config)
    }

    /// Defaults with `edit` applied, handy in tests.
    pub fn default_with_overrides(edit: impl FnOnce(&mut Self)) -> Self {
        let mut config = Self::default();
        edit(&mut config);
        config
    }

    /// The default config rendered as TOML.
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }

    /// Every problem found, as readable sentences. Empty means usable.
    pub fn validate(&self) -> Vec<String> {
        self.server
            .validate()
            .into_iter()
            .chain(self.client.validate())
            .chain(self.transport.validate())
            .chain(self.resolver.validate())
            .chain(self.logging.validate())
            .collect()
    }

    pub fn validate_strict(&self) -> Result<()> {
        let problems = self.validate();
        if problems.is_empty() {
            return Ok(());
        }
        Err(ProtocolError::ConfigError(format!(
            "Configuration validation failed:\n  - {}",
            problems.join("\n  - ")
        )))
    }
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("RPC_TRANSPORT_{suffix}")).ok()
}

fn env_parse<T: FromStr>(suffix: &str) -> Option<T> {
    env_var(suffix).and_then(|v| v.trim().parse().ok())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, `tcp://host:port` or `unix:///path`
    pub address: String,

    /// Connections beyond this are dropped on accept
    pub max_connections: usize,

    /// How long in-flight connections may drain after shutdown starts
    #[serde(with = "millis")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "tcp://127.0.0.1:9000".into(),
            max_connections: 1000,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.address.is_empty() {
            problems.push("Server address cannot be empty".into());
        } else if self.address.parse::<NetworkAddress>().is_err() {
            problems.push(format!(
                "Invalid server address '{}', expected e.g. 'tcp://0.0.0.0:9000'",
                self.address
            ));
        }

        if self.max_connections == 0 {
            problems.push("Max connections must be at least 1".into());
        }

        match self.shutdown_timeout.as_secs() {
            0 => problems.push("Shutdown timeout too short (at least 1s)".into()),
            s if s > 60 => problems.push("Shutdown timeout too long (at most 60s)".into()),
            _ => {}
        }

        problems
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Limit on dialing one endpoint
    #[serde(with = "millis")]
    pub connect_timeout: Duration,

    /// Limit on waiting for one call's response
    #[serde(with = "millis")]
    pub request_timeout: Duration,

    /// Pause before re-resolving after an unchanged result or a resolver error
    #[serde(with = "millis")]
    pub resolve_poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            resolve_poll_interval: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    const FLOOR: Duration = Duration::from_millis(10);

    pub fn validate(&self) -> Vec<String> {
        [
            ("Connect timeout", self.connect_timeout),
            ("Request timeout", self.request_timeout),
            ("Resolve poll interval", self.resolve_poll_interval),
        ]
        .into_iter()
        .filter(|(_, d)| *d < Self::FLOOR)
        .map(|(name, _)| format!("{name} is under the 10ms floor"))
        .collect()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    pub format: SerializationFormat,

    /// Payloads above this are rejected from the header alone
    pub max_payload_size: usize,

    pub read_buffer_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            format: SerializationFormat::default(),
            max_payload_size: MAX_PAYLOAD_SIZE,
            read_buffer_capacity: DEFAULT_READ_BUFFER,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.max_payload_size == 0 {
            problems.push("Max payload size cannot be 0".into());
        } else if u32::try_from(self.max_payload_size).is_err() {
            problems.push(format!(
                "Max payload size {} does not fit the 32 bits length field",
                self.max_payload_size
            ));
        }

        if self.read_buffer_capacity == 0 {
            problems.push("Read buffer capacity cannot be 0".into());
        }

        problems
    }
}

/// Which resolver `resolver::from_config` builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    #[default]
    Constant,
    File,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub kind: ResolverKind,

    /// `network://address` strings
    pub endpoints: Vec<String>,

    /// Only read by the file resolver
    pub trigger_path: Option<PathBuf>,
}

impl ResolverConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut problems: Vec<String> = self
            .endpoints
            .iter()
            .filter(|e| e.parse::<NetworkAddress>().is_err())
            .map(|e| format!("Endpoint '{e}' is not a network://address"))
            .collect();

        if self.kind == ResolverKind::File && self.trigger_path.is_none() {
            problems.push("The file resolver needs a trigger_path".into());
        }

        problems
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub app_name: String,

    /// Used when `RUST_LOG` is unset
    #[serde(with = "level")]
    pub log_level: Level,

    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: "rpc-transport".into(),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    const MAX_APP_NAME: usize = 64;

    pub fn validate(&self) -> Vec<String> {
        if self.app_name.is_empty() {
            vec!["Application name cannot be empty".into()]
        } else if self.app_name.len() > Self::MAX_APP_NAME {
            vec![format!(
                "Application name is {} bytes, limit is {}",
                self.app_name.len(),
                Self::MAX_APP_NAME
            )]
        } else {
            Vec::new()
        }
    }
}

/// `Duration` as whole milliseconds
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// `tracing::Level` as a lowercase name
mod level {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use tracing::Level;

    pub fn serialize<S: Serializer>(level: &Level, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&level.as_str().to_ascii_lowercase())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Level, D::Error> {
        let name = String::deserialize(d)?;
        name.parse()
            .map_err(|_| D::Error::custom(format!("unknown log level '{name}'")))
    }
}
