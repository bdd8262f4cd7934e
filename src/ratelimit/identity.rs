//! Caller identification and key redaction.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SlidegateError};

/// Placeholder printed instead of an identity key when redaction is on.
pub const REDACTED: &str = "[redacted]";

/// The parts of an inbound request the limiter may identify a caller by.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    /// Network address of the peer
    pub remote_addr: Option<IpAddr>,
    /// Request headers, names lowercased
    headers: HashMap<String, String>,
}

impl Caller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_addr(addr: IpAddr) -> Self {
        Self {
            remote_addr: Some(addr),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

type ExtractFn = dyn Fn(&Caller) -> Result<String> + Send + Sync;

/// How the identity key is derived from a [`Caller`].
#[derive(Clone, Default)]
pub enum IdentitySource {
    /// The peer's network address
    #[default]
    RemoteAddr,
    /// The value of a request header, e.g. an API key
    Header(String),
    /// Any other derivation
    Custom(Arc<ExtractFn>),
}

impl IdentitySource {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Caller) -> Result<String> + Send + Sync + 'static,
    {
        IdentitySource::Custom(Arc::new(f))
    }

    /// Resolve the identity key for `caller`.
    pub fn extract(&self, caller: &Caller) -> Result<String> {
        match self {
            IdentitySource::RemoteAddr => caller
                .remote_addr
                .map(|addr| addr.to_string())
                .ok_or_else(|| SlidegateError::Identity("no remote address".to_string())),
            IdentitySource::Header(name) => match caller.header(name) {
                Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
                _ => Err(SlidegateError::Identity(format!("missing header {name}"))),
            },
            IdentitySource::Custom(f) => f(caller),
        }
    }
}

impl fmt::Debug for IdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentitySource::RemoteAddr => write!(f, "RemoteAddr"),
            IdentitySource::Header(name) => f.debug_tuple("Header").field(name).finish(),
            IdentitySource::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Serializable form of [`IdentitySource`] used in configuration files.
///
/// Written as `identity: remote_addr` or `identity: { header: x-api-key }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "IdentityRepr", into = "IdentityRepr")]
pub enum IdentityConfig {
    #[default]
    RemoteAddr,
    Header(String),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum IdentityRepr {
    Named(String),
    Header { header: String },
}

impl TryFrom<IdentityRepr> for IdentityConfig {
    type Error = String;

    fn try_from(repr: IdentityRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            IdentityRepr::Named(name) if name == "remote_addr" => Ok(IdentityConfig::RemoteAddr),
            IdentityRepr::Named(name) => Err(format!("unknown identity source `{name}`")),
            IdentityRepr::Header { header } if header.trim().is_empty() => {
                Err("identity header name is empty".to_string())
            }
            IdentityRepr::Header { header } => Ok(IdentityConfig::Header(header)),
        }
    }
}

impl From<IdentityConfig> for IdentityRepr {
    fn from(config: IdentityConfig) -> Self {
        match config {
            IdentityConfig::RemoteAddr => IdentityRepr::Named("remote_addr".to_string()),
            IdentityConfig::Header(header) => IdentityRepr::Header { header },
        }
    }
}

impl From<IdentityConfig> for IdentitySource {
    fn from(config: IdentityConfig) -> Self {
        match config {
            IdentityConfig::RemoteAddr => IdentitySource::RemoteAddr,
            IdentityConfig::Header(name) => IdentitySource::Header(name),
        }
    }
}

/// Displays an identity key, or [`REDACTED`] when redaction is on.
#[derive(Clone, Copy)]
pub struct Redacted<'a> {
    key: &'a str,
    redact: bool,
}

impl<'a> Redacted<'a> {
    pub fn new(key: &'a str, redact: bool) -> Self {
        Self { key, redact }
    }
}

impl fmt::Display for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.redact {
            f.write_str(REDACTED)
        } else {
            f.write_str(self.key)
        }
    }
}
