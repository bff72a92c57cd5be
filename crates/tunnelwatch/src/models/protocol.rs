use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Seconds a client process gets to print its readiness line by default
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Kind of tunnel a protocol entry represents
///
/// Parsing never fails: unrecognised values land in [`ProtocolKind::Other`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProtocolKind {
    OpenVpn,
    WireGuard,
    Shadowsocks,
    V2Ray,
    Reality,
    #[default]
    Other,
}

impl ProtocolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolKind::OpenVpn => "openvpn",
            ProtocolKind::WireGuard => "wireguard",
            ProtocolKind::Shadowsocks => "shadowsocks",
            ProtocolKind::V2Ray => "v2ray",
            ProtocolKind::Reality => "reality",
            ProtocolKind::Other => "other",
        }
    }
}

impl From<&str> for ProtocolKind {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "openvpn" => ProtocolKind::OpenVpn,
            "wireguard" => ProtocolKind::WireGuard,
            "shadowsocks" => ProtocolKind::Shadowsocks,
            "v2ray" => ProtocolKind::V2Ray,
            "reality" => ProtocolKind::Reality,
            _ => ProtocolKind::Other,
        }
    }
}

impl From<String> for ProtocolKind {
    fn from(value: String) -> Self {
        ProtocolKind::from(value.as_str())
    }
}

impl From<ProtocolKind> for String {
    fn from(kind: ProtocolKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport used by the direct probe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Transport {
    #[default]
    Tcp,
    Udp,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transport: {0}")]
pub struct UnknownTransport(pub String);

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Udp => "udp",
        }
    }
}

impl TryFrom<String> for Transport {
    type Error = UnknownTransport;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Transport::Tcp),
            "udp" => Ok(Transport::Udp),
            _ => Err(UnknownTransport(value)),
        }
    }
}

impl From<Transport> for String {
    fn from(transport: Transport) -> Self {
        transport.as_str().to_string()
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local client program used for proxied probes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientCommand {
    /// Shell command line that starts the client
    pub start_command: String,

    /// Local SOCKS5 port the client listens on once running
    #[serde(default)]
    pub socks_port: Option<u16>,

    /// Pattern matched against the client's output to detect readiness
    #[serde(default)]
    pub ready_regex: Option<String>,

    /// Seconds to wait for readiness before giving up
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_sec: u64,
}

fn default_startup_timeout() -> u64 {
    DEFAULT_STARTUP_TIMEOUT_SECS
}

impl ClientCommand {
    pub fn new(start_command: impl Into<String>) -> Self {
        Self {
            start_command: start_command.into(),
            socks_port: None,
            ready_regex: None,
            startup_timeout_sec: DEFAULT_STARTUP_TIMEOUT_SECS,
        }
    }

    pub fn with_socks_port(mut self, port: u16) -> Self {
        self.socks_port = Some(port);
        self
    }

    pub fn with_ready_regex(mut self, pattern: impl Into<String>) -> Self {
        self.ready_regex = Some(pattern.into());
        self
    }

    pub fn with_startup_timeout(mut self, seconds: u64) -> Self {
        self.startup_timeout_sec = seconds;
        self
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_sec)
    }

    /// SOCKS port, ignoring an unset or zero value
    pub fn proxy_port(&self) -> Option<u16> {
        self.socks_port.filter(|port| *port != 0)
    }
}

/// A monitored endpoint
///
/// `id` is the stable key; replacing a protocol means storing a new value
/// with the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawProtocolConfig")]
pub struct ProtocolConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProtocolKind,
    pub host: String,
    pub port: u16,
    pub transport: Transport,
    pub client: Option<ClientCommand>,
    /// Free-form protocol notes, carried along untouched
    pub meta: BTreeMap<String, Value>,
}

/// Wire shape accepted from storage and the management surface
#[derive(Deserialize)]
struct RawProtocolConfig {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type", default)]
    kind: ProtocolKind,
    host: String,
    port: u16,
    #[serde(default)]
    transport: Transport,
    #[serde(default)]
    client: Option<ClientCommand>,
    #[serde(default)]
    meta: BTreeMap<String, Value>,
}

impl From<RawProtocolConfig> for ProtocolConfig {
    fn from(raw: RawProtocolConfig) -> Self {
        let name = match raw.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => raw.id.clone(),
        };

        Self {
            id: raw.id,
            name,
            kind: raw.kind,
            host: raw.host,
            port: raw.port,
            transport: raw.transport,
            client: raw.client,
            meta: raw.meta,
        }
    }
}

impl ProtocolConfig {
    pub fn new(id: impl Into<String>, kind: ProtocolKind, host: impl Into<String>, port: u16) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind,
            host: host.into(),
            port,
            transport: Transport::Tcp,
            client: None,
            meta: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_client(mut self, client: ClientCommand) -> Self {
        self.client = Some(client);
        self
    }

    /// Parse a JSON descriptor as typed by an operator
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// `host:port/transport`, as shown to users
    pub fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.transport)
    }

    /// Client descriptor when a proxied probe is possible
    pub fn proxy_client(&self) -> Option<(&ClientCommand, u16)> {
        self.client
            .as_ref()
            .and_then(|client| client.proxy_port().map(|port| (client, port)))
    }
}
