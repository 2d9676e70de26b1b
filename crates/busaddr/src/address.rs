//! # Endpoint addresses
//!
//! The textual form is `<scheme>://<host>[:<port>]/<queue>`. Rendering an
//! address and parsing the result gives back the same address.

use std::fmt;
use std::str::FromStr;

use crate::name::TypeName;
use crate::name::make_queue_name_safe;
use crate::protocol::Protocol;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// The text has no `://` separator.
    MissingScheme(String),
    UnknownScheme(String),
    EmptyHost(String),
    EmptyQueue(String),
    InvalidPort { text: String, port: String },
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingScheme(text) => write!(f, "Missing '<scheme>://' in endpoint '{}'", text),
            Self::UnknownScheme(scheme) => write!(f, "Unknown queue protocol scheme: '{}'", scheme),
            Self::EmptyHost(text) => write!(f, "Endpoint '{}' has no host", text),
            Self::EmptyQueue(text) => write!(f, "Endpoint '{}' has no queue name", text),
            Self::InvalidPort { text, port } => {
                write!(f, "Invalid port '{}' in endpoint '{}'", port, text)
            }
        }
    }
}

impl std::error::Error for AddressError {}

pub type Result<T> = std::result::Result<T, AddressError>;

/// A queue endpoint: protocol, host, safe queue name and an optional port.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EndpointAddress {
    protocol: Protocol,
    host: String,
    queue_name: String,
    port: Option<u16>,
}

impl EndpointAddress {
    /// Builds an address from parts. The queue name is made safe for
    /// `protocol` so an address can never carry a disallowed character.
    pub fn new(protocol: Protocol, host: impl Into<String>, queue_name: &str) -> Self {
        Self {
            protocol,
            host: host.into(),
            queue_name: make_queue_name_safe(queue_name, protocol),
            port: None,
        }
    }

    /// The port-less address whose queue is named after `type_name`.
    pub fn for_type(protocol: Protocol, host: impl Into<String>, type_name: &TypeName) -> Self {
        Self::new(protocol, host, type_name.as_str())
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// The same address with the port stripped. Port tables are keyed by
    /// this form.
    pub fn without_port(&self) -> Self {
        Self {
            port: None,
            ..self.clone()
        }
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol.scheme(), self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        write!(f, "/{}", self.queue_name)
    }
}

impl FromStr for EndpointAddress {
    type Err = AddressError;

    fn from_str(text: &str) -> Result<Self> {
        let (scheme, rest) = text
            .split_once("://")
            .ok_or_else(|| AddressError::MissingScheme(text.to_string()))?;

        let protocol: Protocol = scheme
            .parse()
            .map_err(|_| AddressError::UnknownScheme(scheme.to_string()))?;

        let (authority, queue) = rest.split_once('/').unwrap_or((rest, ""));
        let queue = queue.trim_end_matches('/');
        if queue.is_empty() {
            return Err(AddressError::EmptyQueue(text.to_string()));
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| AddressError::InvalidPort {
                    text: text.to_string(),
                    port: port.to_string(),
                })?;
                (host, Some(port))
            }
            None => (authority, None),
        };

        if host.is_empty() {
            return Err(AddressError::EmptyHost(text.to_string()));
        }

        let mut address = EndpointAddress::new(protocol, host, queue);
        address.port = port;
        Ok(address)
    }
}
