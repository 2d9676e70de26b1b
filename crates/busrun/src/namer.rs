//! # Endpoint Namer
//!
//! Derives a consumer's queue address from its type name by convention:
//! `<scheme>://<host>/<safe fully-qualified name>`, plus a port from the
//! shared allocator when the protocol needs one.

use busaddr::EndpointAddress;
use busaddr::Protocol;
use busaddr::TypeName;

use crate::ports::PortAllocator;
use crate::ports::PortError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamerError {
    /// The type name is empty or blank.
    InvalidIdentifier(String),
    Ports(PortError),
}

impl std::fmt::Display for NamerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIdentifier(name) => write!(f, "Invalid type identifier: '{}'", name),
            Self::Ports(e) => write!(f, "Port assignment failed: {}", e),
        }
    }
}

impl std::error::Error for NamerError {}

impl From<PortError> for NamerError {
    fn from(e: PortError) -> Self {
        Self::Ports(e)
    }
}

pub type Result<T> = std::result::Result<T, NamerError>;

#[derive(Clone, Debug)]
pub struct EndpointNamer {
    protocol: Protocol,
    host: String,
    ports: Option<PortAllocator>,
}

impl EndpointNamer {
    pub fn new(protocol: Protocol, host: impl Into<String>) -> Self {
        Self {
            protocol,
            host: host.into(),
            ports: None,
        }
    }

    /// Attaches the shared port allocator. Required for protocols that
    /// listen on explicit ports.
    pub fn with_ports(mut self, ports: PortAllocator) -> Self {
        self.ports = Some(ports);
        self
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// The port-less address for `type_name`. Never touches the port table.
    pub fn base_endpoint(&self, type_name: &TypeName) -> Result<EndpointAddress> {
        if type_name.is_empty() {
            return Err(NamerError::InvalidIdentifier(type_name.to_string()));
        }
        Ok(EndpointAddress::for_type(self.protocol, self.host.as_str(), type_name))
    }

    /// Derives the endpoint for a single type.
    pub fn derive(&self, type_name: &TypeName) -> Result<EndpointAddress> {
        let mut derived = self.derive_all(std::slice::from_ref(type_name))?;
        Ok(derived.remove(0))
    }

    /// Derives the endpoints for every type in `type_names`, in order.
    ///
    /// All port assignments happen inside one allocator session, so the
    /// whole set is claimed atomically with respect to other services.
    pub fn derive_all(&self, type_names: &[TypeName]) -> Result<Vec<EndpointAddress>> {
        let bases = type_names
            .iter()
            .map(|name| self.base_endpoint(name))
            .collect::<Result<Vec<_>>>()?;

        if !self.protocol.requires_port() {
            return Ok(bases);
        }

        let ports = self.ports.as_ref().ok_or(NamerError::Ports(PortError::Unavailable))?;
        let mut session = ports.session();
        bases
            .iter()
            .map(|base| session.assign(base).map_err(NamerError::from))
            .collect()
    }
}
